#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, Response};
use axum::Router;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde_json::Value;
use taskgate::auth::{BcryptHasher, PasswordHasher};
use taskgate::config::{extract_config, ConfigV1};
use taskgate::metrics::Metrics;
use taskgate::models::{NewUser, User};
use taskgate::routes::{auth_router, gateway_router, todo_router, user_router};
use taskgate::state::{AuthState, GatewayState, TodoState, UserState};
use taskgate::store::Stores;

pub const TEST_SECRET: &str = "test-secret";

/// Backend config with a cheap bcrypt cost and the test signing key.
pub const BACKEND_CONFIG: &str = r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "json"
jwt:
  secret: test-secret
  exp: 10800
password:
  cost: 4
timeout:
  handler_in_ms: 2000
"#;

pub fn load_test_config(yaml: &str) -> ConfigV1 {
    extract_config(Figment::new().merge(Yaml::string(yaml)))
        .expect("Failed to parse test config YAML")
}

/// Gateway config pointing every route at the given upstreams.
pub fn gateway_config(auth: &str, todos: &str, users: &str) -> ConfigV1 {
    load_test_config(&format!(
        r#"
services:
  auth: "{}"
  todos: "{}"
  users: "{}"
"#,
        auth, todos, users
    ))
}

pub fn build_gateway(config: ConfigV1) -> (Router, Metrics) {
    let metrics = Metrics::new();
    let state = GatewayState::new(Arc::new(config), metrics.clone())
        .expect("Failed to build gateway clients");
    (gateway_router(state), metrics)
}

pub fn build_auth(config: ConfigV1, stores: &Stores) -> Router {
    auth_router(AuthState::new(
        Arc::new(config),
        stores.users.clone(),
        Metrics::new(),
    ))
}

pub fn build_todo(config: ConfigV1, stores: &Stores) -> Router {
    todo_router(TodoState::new(
        Arc::new(config),
        stores.todos.clone(),
        Metrics::new(),
    ))
}

pub fn build_user(config: ConfigV1, stores: &Stores) -> Router {
    user_router(UserState::new(
        Arc::new(config),
        stores.users.clone(),
        Metrics::new(),
    ))
}

/// Stores a user with a real (cheap) bcrypt hash.
pub async fn seed_user(stores: &Stores, name: &str, password: &str) -> User {
    let password_hash = BcryptHasher::new(4)
        .hash(password)
        .expect("hashing should succeed");
    stores
        .users
        .create_user(NewUser {
            name: name.to_string(),
            password_hash,
        })
        .await
        .expect("seeding a user should succeed")
}

pub fn json_request(method: Method, path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

pub fn empty_request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request")
}

pub fn request_with_authorization(method: Method, path: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("Authorization", authorization)
        .body(Body::empty())
        .expect("failed to build request")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// The `message` of an error body.
pub async fn error_message(response: Response<Body>) -> String {
    body_json(response).await["message"]
        .as_str()
        .expect("error body should carry a message")
        .to_string()
}
