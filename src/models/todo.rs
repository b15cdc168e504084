use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::fields::only_allowed_keys;

/// A todo as the todo service stores and returns it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Todo {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "userid")]
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The body of `POST /`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewTodo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "userid", default)]
    pub user_id: i64,
}

/// A partial update that passed the allow-list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the date.
    pub date: Option<Option<DateTime<Utc>>>,
}

impl TodoChanges {
    /// Fields a client may change with `PUT /{id}`.
    pub const ALLOWED: &'static [&'static str] = &["name", "date", "description"];

    /// Builds a change set, rejecting unknown keys and mistyped values.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, String> {
        if !only_allowed_keys(fields, Self::ALLOWED) {
            return Err("update contains fields outside name, date, description".to_string());
        }

        let mut changes = TodoChanges::default();
        for (key, value) in fields {
            match (key.as_str(), value) {
                ("name", Value::String(name)) if !name.is_empty() => {
                    changes.name = Some(name.clone())
                }
                ("description", Value::String(description)) => {
                    changes.description = Some(description.clone())
                }
                ("date", Value::Null) => changes.date = Some(None),
                ("date", Value::String(date)) => {
                    let parsed = DateTime::parse_from_rfc3339(date)
                        .map_err(|e| format!("invalid date '{}': {}", date, e))?;
                    changes.date = Some(Some(parsed.with_timezone(&Utc)));
                }
                (key, value) => return Err(format!("invalid value for '{}': {}", key, value)),
            }
        }
        Ok(changes)
    }
}

impl Todo {
    /// Applies a change set and bumps `updated_at`.
    pub fn apply(&mut self, changes: &TodoChanges, now: DateTime<Utc>) {
        if let Some(name) = &changes.name {
            self.name = name.clone();
        }
        if let Some(description) = &changes.description {
            self.description = description.clone();
        }
        if let Some(date) = changes.date {
            self.date = date;
        }
        self.updated_at = now;
    }
}
