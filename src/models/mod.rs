pub mod todo;
pub mod user;

pub use todo::{NewTodo, Todo, TodoChanges};
pub use user::{Credential, NewUser, User, UserChanges, UserSummary, MIN_PASSWORD_LENGTH};
