use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use super::{StoreError, TodoStore, UserStore};
use crate::config::DatabaseConfig;
use crate::models::{NewTodo, NewUser, Todo, TodoChanges, User};

/// Tables are created on connect, like an auto-migration.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS todos (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        date TIMESTAMPTZ NULL,
        user_id BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS todos_user_id_idx ON todos (user_id)",
];

const TODO_COLUMNS: &str = "id, name, description, date, user_id, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, password, created_at, updated_at";

#[derive(FromRow)]
struct TodoRow {
    id: i64,
    name: String,
    description: String,
    date: Option<DateTime<Utc>>,
    user_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TodoRow> for Todo {
    fn from(row: TodoRow) -> Self {
        Todo {
            id: row.id,
            name: row.name,
            description: row.description,
            date: row.date,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    password: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, todos: Vec<Todo>) -> User {
        User {
            id: self.id,
            name: self.name,
            password: self.password,
            todos,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Maps a unique-constraint violation on `users.name` to a conflict.
fn user_write_error(e: sqlx::Error, name: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("User {} already exists", name))
        }
        _ => backend(e),
    }
}

/// A `TodoStore` and `UserStore` over a PostgreSQL connection pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{} as {}",
            config.host, config.port, config.name, config.user
        );
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = PostgresStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        debug!("PostgreSQL schema is up to date.");
        Ok(())
    }

    async fn todos_of(&self, user_id: i64) -> Result<Vec<Todo>, StoreError> {
        let rows = sqlx::query_as::<_, TodoRow>(&format!(
            "SELECT {} FROM todos WHERE user_id = $1 ORDER BY id",
            TODO_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(Todo::from).collect())
    }

    async fn load_user(&self, row: Option<UserRow>) -> Result<User, StoreError> {
        let row = row.ok_or(StoreError::NotFound)?;
        let todos = self.todos_of(row.id).await?;
        Ok(row.into_user(todos))
    }
}

#[async_trait]
impl TodoStore for PostgresStore {
    async fn create_todo(&self, todo: NewTodo) -> Result<Todo, StoreError> {
        let row = sqlx::query_as::<_, TodoRow>(&format!(
            "INSERT INTO todos (name, description, date, user_id) VALUES ($1, $2, $3, $4) RETURNING {}",
            TODO_COLUMNS
        ))
        .bind(&todo.name)
        .bind(&todo.description)
        .bind(todo.date)
        .bind(todo.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.into())
    }

    async fn get_todos(&self) -> Result<Vec<Todo>, StoreError> {
        let rows = sqlx::query_as::<_, TodoRow>(&format!(
            "SELECT {} FROM todos ORDER BY id",
            TODO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(Todo::from).collect())
    }

    async fn get_todo_by_id(&self, id: i64) -> Result<Todo, StoreError> {
        sqlx::query_as::<_, TodoRow>(&format!("SELECT {} FROM todos WHERE id = $1", TODO_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Todo::from)
            .ok_or(StoreError::NotFound)
    }

    async fn delete_todo_by_id(&self, id: i64) -> Result<Todo, StoreError> {
        sqlx::query_as::<_, TodoRow>(&format!(
            "DELETE FROM todos WHERE id = $1 RETURNING {}",
            TODO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(Todo::from)
        .ok_or(StoreError::NotFound)
    }

    async fn update_todo(&self, id: i64, changes: &TodoChanges) -> Result<Todo, StoreError> {
        sqlx::query_as::<_, TodoRow>(&format!(
            "UPDATE todos SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                date = CASE WHEN $4 THEN $5 ELSE date END, \
                updated_at = now() \
             WHERE id = $1 RETURNING {}",
            TODO_COLUMNS
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.date.is_some())
        .bind(changes.date.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(Todo::from)
        .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (name, password) VALUES ($1, $2) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| user_write_error(e, &user.name))?;
        Ok(row.into_user(Vec::new()))
    }

    async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY id",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let todos: Vec<Todo> = sqlx::query_as::<_, TodoRow>(&format!(
            "SELECT {} FROM todos WHERE user_id = ANY($1) ORDER BY id",
            TODO_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(Todo::from)
        .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let owned = todos
                    .iter()
                    .filter(|todo| todo.user_id == row.id)
                    .cloned()
                    .collect();
                row.into_user(owned)
            })
            .collect())
    }

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        self.load_user(row).await
    }

    async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE name = $1",
            USER_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        self.load_user(row).await
    }

    async fn delete_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        self.load_user(row).await
    }

    async fn update_user(
        &self,
        id: i64,
        name: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                password = COALESCE($3, password), \
                updated_at = now() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| user_write_error(e, name.unwrap_or_default()))?;
        self.load_user(row).await
    }
}
