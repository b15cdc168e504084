//! HTTP route definitions and handlers.
//!
//! One router per service, each built from that service's state. Every router
//! gets `/health`, `/metrics`, request tracing, and a panic guard; the backend
//! routers also run their handlers under a deadline.

mod auth_routes;
mod gateway_routes;
mod health_routes;
mod metrics;
mod todo_routes;
mod user_routes;

pub use auth_routes::LoginResponse;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

use crate::gateway::RouteKey;
use crate::middleware::enforce_deadline;
use crate::state::{handler_timeout, AuthState, GatewayState, TodoState, UserState};
use crate::utils::http_helpers::HTTPError;

/// Mount path of a backend: the `api_endpoint` override, or the route's default.
fn mount_path(api_endpoint: Option<&str>, key: RouteKey) -> String {
    let raw = api_endpoint
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .unwrap_or(key.prefix());
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Nests `service` under `path`; the root is merged since it cannot be nested.
fn mount<S>(path: &str, service: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if path == "/" {
        Router::new().merge(service)
    } else {
        Router::new().nest(path, service)
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);
    HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Adds the endpoints and layers every service shares.
fn finish<S>(router: Router<S>, state: S) -> Router
where
    S: Clone + Send + Sync + 'static,
    crate::metrics::Metrics: axum::extract::FromRef<S>,
{
    router
        .merge(health_routes::routes())
        .merge(metrics::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

/// The gateway: gated proxies for todos and users, an open proxy for auth.
pub fn gateway_router(state: GatewayState) -> Router {
    finish(gateway_routes::routes(state.clone()), state)
}

/// The auth service, mounted at `api_endpoint` or `/auth`.
pub fn auth_router(state: AuthState) -> Router {
    let timeout = handler_timeout(&state.config, "auth", &state.metrics);
    let service = auth_routes::routes().layer(from_fn_with_state(timeout, enforce_deadline));
    let path = mount_path(state.config.api_endpoint.as_deref(), RouteKey::Auth);
    finish(mount(&path, service), state)
}

/// The todo service, mounted at `api_endpoint` or `/api/todos`.
pub fn todo_router(state: TodoState) -> Router {
    let timeout = handler_timeout(&state.config, "todo", &state.metrics);
    let service = todo_routes::routes().layer(from_fn_with_state(timeout, enforce_deadline));
    let path = mount_path(state.config.api_endpoint.as_deref(), RouteKey::Todos);
    finish(mount(&path, service), state)
}

/// The user service, mounted at `api_endpoint` or `/api/users`.
pub fn user_router(state: UserState) -> Router {
    let timeout = handler_timeout(&state.config, "user", &state.metrics);
    let service = user_routes::routes().layer(from_fn_with_state(timeout, enforce_deadline));
    let path = mount_path(state.config.api_endpoint.as_deref(), RouteKey::Users);
    finish(mount(&path, service), state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_path() {
        assert_eq!(mount_path(None, RouteKey::Todos), "/api/todos");
        assert_eq!(mount_path(Some(""), RouteKey::Users), "/api/users");
        assert_eq!(mount_path(Some("/v2/todos/"), RouteKey::Todos), "/v2/todos");
        assert_eq!(mount_path(Some("auth"), RouteKey::Auth), "/auth");
        assert_eq!(mount_path(Some("/"), RouteKey::Auth), "/");
    }
}
