//! The gateway's public surface: every request under a route prefix is
//! forwarded to that route's upstream, behind the auth gate unless the route
//! is `/auth`.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, MethodRouter},
    Router,
};
use tracing::{error, warn};

use crate::gateway::{auth_gate, forward, RouteKey};
use crate::metrics::MetricsRecorder;
use crate::state::GatewayState;
use crate::utils::http_helpers::HTTPError;

/// Registers the proxied routes; `state` is needed up front for the gate.
pub fn routes(state: GatewayState) -> Router<GatewayState> {
    let mut gated = Router::new();
    let mut open = Router::new();
    for key in RouteKey::ALL {
        let prefix = key.prefix();
        let routes = Router::new()
            .route(prefix, proxy_to(key))
            .route(&format!("{}/", prefix), proxy_to(key))
            .route(&format!("{}/*rest", prefix), proxy_to(key));
        if key.is_gated() {
            gated = gated.merge(routes);
        } else {
            open = open.merge(routes);
        }
    }

    gated
        .route_layer(from_fn_with_state(state, auth_gate))
        .merge(open)
}

fn proxy_to(key: RouteKey) -> MethodRouter<GatewayState> {
    any(move |State(state): State<GatewayState>, req: Request| async move {
        dispatch(&state, key, req).await
    })
}

/// Resolves `key` and forwards `req` to it.
pub async fn dispatch(state: &GatewayState, key: RouteKey, req: Request) -> Response {
    let response = match state.resolver.resolve(key) {
        Err(e) => {
            error!("{}", e);
            HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong").into_response()
        }
        Ok(upstream) => {
            match forward(&state.proxy_client, &upstream, req, state.config.timeout.upstream()).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Upstream '{}' at {} failed: {}", key, upstream, e);
                    HTTPError::new(StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
                }
            }
        }
    };

    state
        .metrics
        .record_gateway_request(key.as_str(), response.status().as_u16());
    response
}
