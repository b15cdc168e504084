//! CRUD handlers of the todo service.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};

use crate::middleware::Deadline;
use crate::models::{NewTodo, Todo, TodoChanges};
use crate::state::TodoState;
use crate::store::StoreError;
use crate::utils::http_helpers::{HTTPError, ServiceError};

/// Registers todo routes, relative to the service's mount path.
pub fn routes() -> Router<TodoState> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/:id", get(get_todo).put(update_todo).delete(delete_todo))
}

const INVALID_PAYLOAD: &str = "Invalid request payload";

fn invalid_payload() -> HTTPError {
    HTTPError::new(StatusCode::BAD_REQUEST, INVALID_PAYLOAD)
}

/// Parses a path id; anything but a positive integer is a 400.
pub(crate) fn parse_id(raw: &str) -> Result<i64, HTTPError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(HTTPError::new(StatusCode::BAD_REQUEST, "Invalid ID")),
    }
}

/// Decodes a partial-update body into a JSON object.
pub(crate) fn update_fields(body: &[u8]) -> Result<Map<String, Value>, HTTPError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        _ => Err(invalid_payload()),
    }
}

fn todo_not_found(id: i64, err: StoreError) -> HTTPError {
    match err {
        StoreError::NotFound => {
            HTTPError::new(StatusCode::NOT_FOUND, format!("Todo with ID {} not found", id))
        }
        other => ServiceError::from(other).into(),
    }
}

async fn list_todos(
    State(state): State<TodoState>,
    deadline: Deadline,
) -> Result<Json<Vec<Todo>>, HTTPError> {
    let todos = deadline
        .guard(state.todos.get_todos())
        .await?
        .map_err(ServiceError::from)?;
    Ok(Json(todos))
}

async fn create_todo(
    State(state): State<TodoState>,
    deadline: Deadline,
    body: Bytes,
) -> Result<Json<Todo>, HTTPError> {
    let todo: NewTodo = serde_json::from_slice(&body).map_err(|_| invalid_payload())?;
    if todo.name.is_empty() {
        return Err(invalid_payload());
    }
    let created = deadline
        .guard(state.todos.create_todo(todo))
        .await?
        .map_err(ServiceError::from)?;
    Ok(Json(created))
}

async fn get_todo(
    State(state): State<TodoState>,
    deadline: Deadline,
    Path(id): Path<String>,
) -> Result<Json<Todo>, HTTPError> {
    let id = parse_id(&id)?;
    let todo = deadline
        .guard(state.todos.get_todo_by_id(id))
        .await?
        .map_err(|e| todo_not_found(id, e))?;
    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<TodoState>,
    deadline: Deadline,
    Path(id): Path<String>,
) -> Result<Json<Todo>, HTTPError> {
    let id = parse_id(&id)?;
    let todo = deadline
        .guard(state.todos.delete_todo_by_id(id))
        .await?
        .map_err(|e| todo_not_found(id, e))?;
    Ok(Json(todo))
}

/// Applies a partial update. Every key must be one of `name`, `date`,
/// `description`; one stray key rejects the whole body.
async fn update_todo(
    State(state): State<TodoState>,
    deadline: Deadline,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Todo>, HTTPError> {
    let id = parse_id(&id)?;
    // A missing todo is reported before a bad payload.
    deadline
        .guard(state.todos.get_todo_by_id(id))
        .await?
        .map_err(|e| todo_not_found(id, e))?;

    let fields = update_fields(&body)?;
    let changes = TodoChanges::from_fields(&fields).map_err(|_| invalid_payload())?;
    let todo = deadline
        .guard(state.todos.update_todo(id, &changes))
        .await?
        .map_err(|e| todo_not_found(id, e))?;
    Ok(Json(todo))
}
