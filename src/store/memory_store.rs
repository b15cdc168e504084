use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{StoreError, TodoStore, UserStore};
use crate::models::{NewTodo, NewUser, Todo, TodoChanges, User};

#[derive(Default)]
struct Tables {
    todos: BTreeMap<i64, Todo>,
    /// Stored without todos; they are attached on read.
    users: BTreeMap<i64, User>,
    last_todo_id: i64,
    last_user_id: i64,
}

impl Tables {
    fn with_todos(&self, mut user: User) -> User {
        user.todos = self
            .todos
            .values()
            .filter(|todo| todo.user_id == user.id)
            .cloned()
            .collect();
        user
    }
}

/// Process-local tables behind one lock. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn create_todo(&self, todo: NewTodo) -> Result<Todo, StoreError> {
        let mut tables = self.tables.write().await;
        tables.last_todo_id += 1;
        let now = Utc::now();
        let todo = Todo {
            id: tables.last_todo_id,
            name: todo.name,
            description: todo.description,
            date: todo.date,
            user_id: todo.user_id,
            created_at: now,
            updated_at: now,
        };
        debug!("Created todo {}", todo.id);
        tables.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn get_todos(&self) -> Result<Vec<Todo>, StoreError> {
        Ok(self.tables.read().await.todos.values().cloned().collect())
    }

    async fn get_todo_by_id(&self, id: i64) -> Result<Todo, StoreError> {
        self.tables
            .read()
            .await
            .todos
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_todo_by_id(&self, id: i64) -> Result<Todo, StoreError> {
        self.tables
            .write()
            .await
            .todos
            .remove(&id)
            .ok_or(StoreError::NotFound)
    }

    async fn update_todo(&self, id: i64, changes: &TodoChanges) -> Result<Todo, StoreError> {
        let mut tables = self.tables.write().await;
        let todo = tables.todos.get_mut(&id).ok_or(StoreError::NotFound)?;
        todo.apply(changes, Utc::now());
        Ok(todo.clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.name == user.name) {
            return Err(StoreError::Conflict(format!(
                "User {} already exists",
                user.name
            )));
        }
        tables.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.last_user_id,
            name: user.name,
            password: user.password_hash,
            todos: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        debug!("Created user {}", user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .map(|user| tables.with_todos(user.clone()))
            .collect())
    }

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        let user = tables.users.get(&id).cloned().ok_or(StoreError::NotFound)?;
        Ok(tables.with_todos(user))
    }

    async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        let user = tables
            .users
            .values()
            .find(|user| user.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        Ok(tables.with_todos(user))
    }

    async fn delete_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.remove(&id).ok_or(StoreError::NotFound)?;
        Ok(tables.with_todos(user))
    }

    async fn update_user(
        &self,
        id: i64,
        name: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(name) = name {
            if tables.users.values().any(|u| u.name == name && u.id != id) {
                return Err(StoreError::Conflict(format!("User {} already exists", name)));
            }
        }
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = name {
            user.name = name.to_string();
        }
        if let Some(hash) = password_hash {
            user.password = hash.to_string();
        }
        user.updated_at = Utc::now();
        let user = user.clone();
        Ok(tables.with_todos(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_todo(name: &str, user_id: i64) -> NewTodo {
        NewTodo {
            name: name.to_string(),
            user_id,
            ..NewTodo::default()
        }
    }

    #[tokio::test]
    async fn test_todo_lifecycle() {
        let store = MemoryStore::new();
        let created = store.create_todo(new_todo("first", 1)).await.unwrap();
        assert_eq!(created.id, 1);

        let changes = TodoChanges {
            name: Some("renamed".into()),
            ..TodoChanges::default()
        };
        let updated = store.update_todo(created.id, &changes).await.unwrap();
        assert_eq!(updated.name, "renamed");

        let deleted = store.delete_todo_by_id(created.id).await.unwrap();
        assert_eq!(deleted.name, "renamed");
        assert_eq!(
            store.get_todo_by_id(created.id).await,
            Err(StoreError::NotFound)
        );

        // Ids are not reused after a delete.
        let next = store.create_todo(new_todo("second", 1)).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_users_come_with_their_todos() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                name: "Guts".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        store.create_todo(new_todo("mine", user.id)).await.unwrap();
        store.create_todo(new_todo("not mine", user.id + 1)).await.unwrap();

        let loaded = store.get_user_by_name("Guts").await.unwrap();
        assert_eq!(loaded.todos.len(), 1);
        assert_eq!(loaded.todos[0].name, "mine");
        assert_eq!(loaded.password, "hash");
    }

    #[tokio::test]
    async fn test_duplicate_user_name_conflicts() {
        let store = MemoryStore::new();
        let new_user = || NewUser {
            name: "Casca".into(),
            password_hash: "hash".into(),
        };
        store.create_user(new_user()).await.unwrap();
        assert!(matches!(
            store.create_user(new_user()).await,
            Err(StoreError::Conflict(_))
        ));
    }
}
