use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use super::{memory_store::MemoryStore, postgres_store::PostgresStore};
use crate::config::{DatabaseConfig, StoreBackend, StoreConfig};
use crate::models::{NewTodo, NewUser, Todo, TodoChanges, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Persistence for the todo service.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create_todo(&self, todo: NewTodo) -> Result<Todo, StoreError>;
    async fn get_todos(&self) -> Result<Vec<Todo>, StoreError>;
    async fn get_todo_by_id(&self, id: i64) -> Result<Todo, StoreError>;
    async fn delete_todo_by_id(&self, id: i64) -> Result<Todo, StoreError>;
    async fn update_todo(&self, id: i64, changes: &TodoChanges) -> Result<Todo, StoreError>;
}

/// Persistence for the user service and the auth service's lookups.
///
/// Users are returned with their todos loaded.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_users(&self) -> Result<Vec<User>, StoreError>;
    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError>;
    async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError>;
    async fn delete_user_by_id(&self, id: i64) -> Result<User, StoreError>;
    /// `password_hash` replaces the stored hash when present.
    async fn update_user(
        &self,
        id: i64,
        name: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User, StoreError>;
}

/// Both capabilities, backed by the same storage.
#[derive(Clone)]
pub struct Stores {
    pub todos: Arc<dyn TodoStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// Fresh process-local tables.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Stores {
            todos: store.clone(),
            users: store,
        }
    }
}

/// Creates the configured backend. PostgreSQL connects and migrates eagerly,
/// so a bad database fails startup instead of the first request.
pub async fn create_stores(
    config: &StoreConfig,
    database: &DatabaseConfig,
) -> Result<Stores, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store.");
            Ok(Stores::memory())
        }
        StoreBackend::Postgres => match PostgresStore::connect(database).await {
            Ok(store) => {
                info!("Successfully created PostgreSQL store.");
                let store = Arc::new(store);
                Ok(Stores {
                    todos: store.clone(),
                    users: store,
                })
            }
            Err(e) => {
                error!("Failed to create PostgreSQL store: {}", e);
                Err(e)
            }
        },
    }
}
