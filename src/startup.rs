//! Service startup and server initialization.
//!
//! Builds the state and router of the selected service, binds its listener,
//! and serves until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::ValueEnum;
use futures::future::try_join_all;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ConfigV1;
use crate::gateway::{RouteKey, UpstreamResolver};
use crate::metrics::Metrics;
use crate::routes;
use crate::state::{AuthState, GatewayState, TodoState, UserState};
use crate::store::{create_stores, StoreError, Stores};

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    Gateway,
    Auth,
    Todo,
    User,
    /// All four in one process, sharing one store.
    All,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Gateway => "gateway",
            ServiceKind::Auth => "auth",
            ServiceKind::Todo => "todo",
            ServiceKind::User => "user",
            ServiceKind::All => "all",
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Refuses configurations a service could not run with.
pub fn validate(config: &ConfigV1, kind: ServiceKind) -> Result<(), StartupError> {
    if matches!(kind, ServiceKind::Gateway | ServiceKind::All) {
        UpstreamResolver::new(Arc::new(config.clone()))
            .validate_all()
            .map_err(|e| StartupError::Config(e.to_string()))?;
        if config.timeout.upstream_in_ms == Some(0) {
            return Err(StartupError::Config(
                "timeout.upstream_in_ms must be greater than zero when set".to_string(),
            ));
        }
    }
    if kind != ServiceKind::Gateway && config.timeout.handler_in_ms == 0 {
        return Err(StartupError::Config(
            "timeout.handler_in_ms must be greater than zero".to_string(),
        ));
    }
    if matches!(kind, ServiceKind::Auth | ServiceKind::All) && config.jwt.secret.is_empty() {
        return Err(StartupError::Config(
            "jwt.secret (JWT_SK) must be set for the auth service".to_string(),
        ));
    }
    Ok(())
}

/// Router of one backend service over already created stores.
pub fn backend_router(
    kind: ServiceKind,
    config: Arc<ConfigV1>,
    stores: &Stores,
    metrics: Metrics,
) -> Option<Router> {
    match kind {
        ServiceKind::Auth => Some(routes::auth_router(AuthState::new(
            config,
            stores.users.clone(),
            metrics,
        ))),
        ServiceKind::Todo => Some(routes::todo_router(TodoState::new(
            config,
            stores.todos.clone(),
            metrics,
        ))),
        ServiceKind::User => Some(routes::user_router(UserState::new(
            config,
            stores.users.clone(),
            metrics,
        ))),
        ServiceKind::Gateway | ServiceKind::All => None,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received. Shutting down...");
}

async fn serve(name: &'static str, router: Router, address: String) -> Result<(), StartupError> {
    let listener = TcpListener::bind(&address).await?;
    info!("Starting {} on {}", name, address);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("{} shut down.", name);
    Ok(())
}

/// Initializes and runs the selected service.
///
/// # Errors
///
/// Returns an error if the configuration is unusable, the store cannot be
/// reached, or a listener fails to bind.
pub async fn run(kind: ServiceKind, config: Arc<ConfigV1>) -> Result<(), StartupError> {
    validate(&config, kind)?;
    let metrics = Metrics::new();
    let address = config.bind_address(config.app_port);

    match kind {
        ServiceKind::All => run_all(config, metrics).await,
        ServiceKind::Gateway => {
            let router = routes::gateway_router(GatewayState::new(config, metrics)?);
            serve(kind.as_str(), router, address).await
        }
        backend => {
            let stores = create_stores(&config.store, &config.database).await?;
            match backend_router(backend, config, &stores, metrics) {
                Some(router) => serve(backend.as_str(), router, address).await,
                None => Ok(()),
            }
        }
    }
}

/// Gateway on `app_port`; each backend on the port of its configured upstream.
async fn run_all(config: Arc<ConfigV1>, metrics: Metrics) -> Result<(), StartupError> {
    let backend_config = if config.api_endpoint.is_some() {
        warn!("api_endpoint is ignored in 'all' mode; backends use their default paths");
        let mut cleared = (*config).clone();
        cleared.api_endpoint = None;
        Arc::new(cleared)
    } else {
        config.clone()
    };

    let stores = create_stores(&config.store, &config.database).await?;
    let resolver = UpstreamResolver::new(config.clone());

    let mut servers = vec![serve(
        ServiceKind::Gateway.as_str(),
        routes::gateway_router(GatewayState::new(config.clone(), metrics.clone())?),
        config.bind_address(config.app_port),
    )];
    for (kind, key) in [
        (ServiceKind::Auth, RouteKey::Auth),
        (ServiceKind::Todo, RouteKey::Todos),
        (ServiceKind::User, RouteKey::Users),
    ] {
        let upstream = resolver
            .resolve(key)
            .map_err(|e| StartupError::Config(e.to_string()))?;
        let port = upstream.port_or_known_default().ok_or_else(|| {
            StartupError::Config(format!("upstream for '{}' has no port", key))
        })?;
        if let Some(router) = backend_router(kind, backend_config.clone(), &stores, metrics.clone())
        {
            servers.push(serve(kind.as_str(), router, config.bind_address(port)));
        }
    }

    try_join_all(servers).await?;
    Ok(())
}
