//! The edge: resolves a route to its upstream, checks the caller's token with
//! the auth service, and forwards the request.

pub mod auth_gate;
pub mod proxy;
pub mod resolver;

pub use auth_gate::{auth_gate, authorize, GateDecision, VALIDATE_PATH};
pub use proxy::{forward, proxy_client, upstream_url};
pub use resolver::{RouteKey, UpstreamResolver};
