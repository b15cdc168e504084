use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::todo::Todo;
use crate::utils::fields::only_allowed_keys;

/// Passwords shorter than this are refused on create and update.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// The User struct represents a stored account together with its todos.
///
/// `password` holds the salted hash and is never serialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub todos: Vec<Todo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The identity embedded in tokens and returned by login.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

/// A name/password pair, as posted to login and to user creation.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Credential {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

/// What the store needs to create a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
}

/// A partial update that passed the allow-list. `password` is still plain text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub password: Option<String>,
}

impl UserChanges {
    /// Fields a client may change with `PUT /{id}`.
    pub const ALLOWED: &'static [&'static str] = &["name", "password"];

    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, String> {
        if !only_allowed_keys(fields, Self::ALLOWED) {
            return Err("update contains fields outside name, password".to_string());
        }

        let mut changes = UserChanges::default();
        for (key, value) in fields {
            match (key.as_str(), value) {
                ("name", Value::String(name)) if !name.is_empty() => {
                    changes.name = Some(name.clone())
                }
                ("password", Value::String(password)) => {
                    changes.password = Some(password.clone())
                }
                (key, value) => return Err(format!("invalid value for '{}': {}", key, value)),
            }
        }
        Ok(changes)
    }
}
