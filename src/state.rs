//! Per-service application state.
//!
//! Every service builds its own state explicitly from the loaded config and
//! the stores it needs; nothing is process-global, so several services (or
//! several copies of one) can live in the same process.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{BcryptHasher, PasswordHasher, TokenIssuer};
use crate::config::ConfigV1;
use crate::gateway::{proxy_client, UpstreamResolver};
use crate::metrics::Metrics;
use crate::middleware::HandlerTimeout;
use crate::store::{TodoStore, UserStore};

/// State of the gateway: where to send requests and the client to send them with.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<ConfigV1>,
    pub resolver: UpstreamResolver,
    /// Client for the auth gate's validation calls.
    pub client: reqwest::Client,
    /// Client for proxied traffic; never follows redirects.
    pub proxy_client: reqwest::Client,
    pub metrics: Metrics,
}

impl GatewayState {
    pub fn new(config: Arc<ConfigV1>, metrics: Metrics) -> Result<Self, reqwest::Error> {
        Ok(GatewayState {
            resolver: UpstreamResolver::new(config.clone()),
            client: reqwest::Client::builder().build()?,
            proxy_client: proxy_client()?,
            config,
            metrics,
        })
    }
}

/// State of the auth service: login and token validation.
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<ConfigV1>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenIssuer>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub metrics: Metrics,
}

impl AuthState {
    pub fn new(config: Arc<ConfigV1>, users: Arc<dyn UserStore>, metrics: Metrics) -> Self {
        AuthState {
            tokens: Arc::new(TokenIssuer::new(&config.jwt)),
            hasher: Arc::new(BcryptHasher::new(config.password.cost)),
            config,
            users,
            metrics,
        }
    }
}

/// State of the todo service.
#[derive(Clone)]
pub struct TodoState {
    pub config: Arc<ConfigV1>,
    pub todos: Arc<dyn TodoStore>,
    pub metrics: Metrics,
}

impl TodoState {
    pub fn new(config: Arc<ConfigV1>, todos: Arc<dyn TodoStore>, metrics: Metrics) -> Self {
        TodoState {
            config,
            todos,
            metrics,
        }
    }
}

/// State of the user service.
#[derive(Clone)]
pub struct UserState {
    pub config: Arc<ConfigV1>,
    pub users: Arc<dyn UserStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub metrics: Metrics,
}

impl UserState {
    pub fn new(config: Arc<ConfigV1>, users: Arc<dyn UserStore>, metrics: Metrics) -> Self {
        UserState {
            hasher: Arc::new(BcryptHasher::new(config.password.cost)),
            config,
            users,
            metrics,
        }
    }
}

macro_rules! metrics_from_state {
    ($($state:ty),+) => {
        $(
            impl FromRef<$state> for Metrics {
                fn from_ref(state: &$state) -> Metrics {
                    state.metrics.clone()
                }
            }
        )+
    };
}

metrics_from_state!(GatewayState, AuthState, TodoState, UserState);

/// The deadline wrapper for a backend service, named after it in logs and metrics.
pub fn handler_timeout(config: &ConfigV1, service: &'static str, metrics: &Metrics) -> HandlerTimeout {
    HandlerTimeout::new(config.timeout.handler(), service, metrics.clone())
}
