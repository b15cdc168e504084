//! CRUD handlers of the user service.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::error;

use super::todo_routes::{parse_id, update_fields};
use crate::auth::hash_blocking;
use crate::middleware::Deadline;
use crate::models::{Credential, NewUser, User, UserChanges, MIN_PASSWORD_LENGTH};
use crate::state::UserState;
use crate::store::StoreError;
use crate::utils::http_helpers::{HTTPError, ServiceError};

/// Registers user routes, relative to the service's mount path.
pub fn routes() -> Router<UserState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:key", get(get_user).put(update_user).delete(delete_user))
}

fn invalid_payload() -> HTTPError {
    HTTPError::new(StatusCode::BAD_REQUEST, "Invalid request payload")
}

fn check_password(password: &str) -> Result<(), HTTPError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(HTTPError::new(
            StatusCode::BAD_REQUEST,
            format!(
                "Password must contain at least {} characters",
                MIN_PASSWORD_LENGTH
            ),
        ));
    }
    Ok(())
}

async fn hash(state: &UserState, password: String) -> Result<String, HTTPError> {
    hash_blocking(state.hasher.clone(), password)
        .await
        .map_err(|e| {
            error!("{}", e);
            HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        })
}

fn user_not_found(id: i64, err: StoreError) -> HTTPError {
    match err {
        StoreError::NotFound => {
            HTTPError::new(StatusCode::NOT_FOUND, format!("User with ID {} not found", id))
        }
        other => ServiceError::from(other).into(),
    }
}

/// How `GET /{key}` reads its path segment.
#[derive(Debug, PartialEq, Eq)]
enum UserKey {
    Id(String),
    Name(String),
    Unknown,
}

impl UserKey {
    /// Digits select by id. A letter followed by letters or dashes selects by
    /// name, with dashes standing for spaces.
    fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            return UserKey::Id(raw.to_string());
        }
        let mut chars = raw.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest: Vec<char> = chars.collect();
        if starts_with_letter
            && !rest.is_empty()
            && rest.iter().all(|c| c.is_ascii_alphabetic() || *c == '-')
        {
            return UserKey::Name(raw.replace('-', " "));
        }
        UserKey::Unknown
    }
}

async fn list_users(
    State(state): State<UserState>,
    deadline: Deadline,
) -> Result<Json<Vec<User>>, HTTPError> {
    let users = deadline
        .guard(state.users.get_users())
        .await?
        .map_err(ServiceError::from)?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<UserState>,
    deadline: Deadline,
    body: Bytes,
) -> Result<Json<User>, HTTPError> {
    let credential: Credential = serde_json::from_slice(&body).map_err(|_| invalid_payload())?;
    if credential.name.is_empty() {
        return Err(invalid_payload());
    }
    check_password(&credential.password)?;

    let password_hash = hash(&state, credential.password).await?;
    let user = deadline
        .guard(state.users.create_user(NewUser {
            name: credential.name,
            password_hash,
        }))
        .await?
        .map_err(ServiceError::from)?;
    Ok(Json(user))
}

async fn get_user(
    State(state): State<UserState>,
    deadline: Deadline,
    Path(key): Path<String>,
) -> Result<Json<User>, HTTPError> {
    match UserKey::parse(&key) {
        UserKey::Id(raw) => {
            let id = parse_id(&raw)?;
            let user = deadline
                .guard(state.users.get_user_by_id(id))
                .await?
                .map_err(|e| user_not_found(id, e))?;
            Ok(Json(user))
        }
        UserKey::Name(name) => {
            let user = deadline
                .guard(state.users.get_user_by_name(&name))
                .await?
                .map_err(|e| match e {
                    StoreError::NotFound => {
                        HTTPError::new(StatusCode::NOT_FOUND, format!("{} not found", name))
                    }
                    other => ServiceError::from(other).into(),
                })?;
            Ok(Json(user))
        }
        UserKey::Unknown => Err(HTTPError::new(StatusCode::NOT_FOUND, "Not Found")),
    }
}

async fn delete_user(
    State(state): State<UserState>,
    deadline: Deadline,
    Path(id): Path<String>,
) -> Result<Json<User>, HTTPError> {
    let id = parse_id(&id)?;
    let user = deadline
        .guard(state.users.delete_user_by_id(id))
        .await?
        .map_err(|e| user_not_found(id, e))?;
    Ok(Json(user))
}

/// Applies a partial update of `name` and/or `password`; a new password is
/// length-checked and hashed before it is stored.
async fn update_user(
    State(state): State<UserState>,
    deadline: Deadline,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<User>, HTTPError> {
    let id = parse_id(&id)?;
    deadline
        .guard(state.users.get_user_by_id(id))
        .await?
        .map_err(|e| user_not_found(id, e))?;

    let fields = update_fields(&body)?;
    let changes = UserChanges::from_fields(&fields).map_err(|_| invalid_payload())?;
    let password_hash = match changes.password {
        Some(password) => {
            check_password(&password)?;
            Some(hash(&state, password).await?)
        }
        None => None,
    };

    let user = deadline
        .guard(state.users.update_user(
            id,
            changes.name.as_deref(),
            password_hash.as_deref(),
        ))
        .await?
        .map_err(|e| user_not_found(id, e))?;
    Ok(Json(user))
}
