pub mod base;
pub mod memory_store;
pub mod postgres_store;

// Re-export the primary Store items so code outside can do
// "use crate::store::{TodoStore, UserStore, create_stores};"
pub use base::{create_stores, StoreError, Stores, TodoStore, UserStore};
