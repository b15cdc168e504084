use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, AUTHORIZATION};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

use super::proxy::upstream_url;
use super::resolver::RouteKey;
use crate::metrics::MetricsRecorder;
use crate::state::GatewayState;
use crate::utils::http_helpers::{HTTPError, ServiceError};

/// Path of the auth service's validation endpoint, relative to its upstream.
pub const VALIDATE_PATH: &str = "/auth/valid";

/// Outcome of one gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Authorized,
    Denied,
    Error,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Authorized => "authorized",
            GateDecision::Denied => "denied",
            GateDecision::Error => "error",
        }
    }
}

/// Asks the auth service whether `authorization` is good.
///
/// The header travels verbatim; the gate never parses it. Only the status of
/// the answer matters: 200 lets the request through, anything else is a 401.
pub async fn authorize(
    state: &GatewayState,
    authorization: Option<&HeaderValue>,
) -> Result<(), ServiceError> {
    let request_error = || ServiceError::AuthTransport("Error creating request".to_string());

    let base = state.resolver.resolve(RouteKey::Auth).map_err(|e| {
        error!("Cannot resolve the auth service: {}", e);
        request_error()
    })?;

    let mut outbound = state.client.post(upstream_url(&base, VALIDATE_PATH, None));
    if let Some(value) = authorization {
        outbound = outbound.header(AUTHORIZATION, value.clone());
    }
    if let Some(timeout) = state.config.timeout.upstream() {
        outbound = outbound.timeout(timeout);
    }
    let outbound = outbound.build().map_err(|e| {
        error!("Failed to build the validation request: {}", e);
        request_error()
    })?;

    let response = state.client.execute(outbound).await.map_err(|e| {
        warn!("Auth service unreachable: {}", e);
        ServiceError::AuthTransport("Error sending request".to_string())
    })?;

    // Dropping the response releases the connection whatever the outcome.
    let status = response.status();
    drop(response);

    if status == StatusCode::OK {
        Ok(())
    } else {
        debug!("Auth service answered {}", status);
        Err(ServiceError::AuthDenied("Unauthorized".to_string()))
    }
}

/// Middleware guarding the gated routes.
pub async fn auth_gate(State(state): State<GatewayState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let outcome = authorize(&state, req.headers().get(AUTHORIZATION)).await;

    let decision = match &outcome {
        Ok(()) => GateDecision::Authorized,
        Err(ServiceError::AuthDenied(_)) => GateDecision::Denied,
        Err(_) => GateDecision::Error,
    };
    state
        .metrics
        .record_gate_decision(decision.as_str(), started.elapsed().as_secs_f64());

    match outcome {
        Ok(()) => next.run(req).await,
        Err(e) => HTTPError::from(e).into_response(),
    }
}
