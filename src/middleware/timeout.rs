//! Per-request deadline for backend handlers.
//!
//! The handler runs in its own task. The wrapper waits on whichever finishes
//! first, the task or the deadline. On timeout the caller gets a 408, the
//! request's `Deadline` is cancelled, and the task is left to wind down on its
//! own; whatever response it produces later is dropped.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::metrics::{Metrics, MetricsRecorder};
use crate::utils::http_helpers::{HTTPError, ServiceError};

/// Deadline applied to backend handlers unless configured otherwise.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline used by the slow-handler scenario in the test suite.
pub const ERROR_PATH_TIMEOUT: Duration = Duration::from_secs(3);

/// Cancellation handle for one request.
///
/// Handlers extract it and pass their I/O through [`Deadline::guard`] so that
/// work stops once the caller has already been told the request timed out.
#[derive(Clone, Debug)]
pub struct Deadline {
    token: CancellationToken,
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn new(after: Duration) -> Self {
        Deadline {
            token: CancellationToken::new(),
            expires_at: Some(Instant::now() + after),
        }
    }

    /// A deadline that never fires unless cancelled by hand.
    pub fn unbounded() -> Self {
        Deadline {
            token: CancellationToken::new(),
            expires_at: None,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Runs `fut` unless the deadline is cancelled first.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ServiceError::Timeout),
            value = fut => Ok(value),
        }
    }
}

/// Handlers outside [`enforce_deadline`] get an unbounded deadline.
#[async_trait]
impl<S> FromRequestParts<S> for Deadline
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Deadline>()
            .cloned()
            .unwrap_or_else(Deadline::unbounded))
    }
}

/// State for [`enforce_deadline`]: how long handlers may run and whom to blame.
#[derive(Clone)]
pub struct HandlerTimeout {
    pub duration: Duration,
    pub service: &'static str,
    pub metrics: Metrics,
}

impl HandlerTimeout {
    pub fn new(duration: Duration, service: &'static str, metrics: Metrics) -> Self {
        HandlerTimeout {
            duration,
            service,
            metrics,
        }
    }
}

/// Middleware racing the rest of the stack against `timeout.duration`.
pub async fn enforce_deadline(
    State(timeout): State<HandlerTimeout>,
    mut req: Request,
    next: Next,
) -> Response {
    let deadline = Deadline::new(timeout.duration);
    req.extensions_mut().insert(deadline.clone());
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut handler = tokio::spawn(next.run(req));

    tokio::select! {
        joined = &mut handler => match joined {
            Ok(response) => response,
            Err(e) => {
                error!("Handler for {} {} failed: {}", method, path, e);
                HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response()
            }
        },
        _ = tokio::time::sleep(timeout.duration) => {
            deadline.cancel();
            timeout.metrics.record_handler_timeout(timeout.service);
            warn!(
                "{} {} exceeded {:?} on the {} service",
                method, path, timeout.duration, timeout.service
            );
            // The task keeps running; only its eventual response is discarded.
            tokio::spawn(async move {
                if let Ok(late) = handler.await {
                    debug!("Dropped late response for {} {}: {}", method, path, late.status());
                }
            });
            ServiceError::Timeout.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use crate::utils::http_helpers::ErrorResponse;

    fn app(duration: Duration, route: Router) -> Router {
        route.layer(from_fn_with_state(
            HandlerTimeout::new(duration, "test", Metrics::new()),
            enforce_deadline,
        ))
    }

    async fn call(app: Router) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_fast_handler_response_stands() {
        let route = Router::new().route("/", get(|| async { (StatusCode::CREATED, "done") }));
        let (status, body) = call(app(Duration::from_millis(500), route)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, b"done");
    }

    #[tokio::test]
    async fn test_slow_handler_gets_408_and_observes_cancellation() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();
        let route = Router::new().route(
            "/",
            get(move |deadline: Deadline| async move {
                let slept = deadline
                    .guard(tokio::time::sleep(Duration::from_secs(5)))
                    .await;
                if slept.is_err() {
                    flag.store(true, Ordering::SeqCst);
                }
                "too late"
            }),
        );

        let (status, body) = call(app(Duration::from_millis(50), route)).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.message, "Request timeout");

        // The detached handler sees the cancellation shortly after.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_path_timeout() {
        let route = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(ERROR_PATH_TIMEOUT + Duration::from_secs(2)).await;
                "unreachable"
            }),
        );
        let started = Instant::now();
        let (status, _) = call(app(ERROR_PATH_TIMEOUT, route)).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert!(started.elapsed() < ERROR_PATH_TIMEOUT + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_500() {
        let route = Router::new().route(
            "/",
            get(|| async {
                if true {
                    panic!("boom");
                }
                "never"
            }),
        );
        let (status, body) = call(app(Duration::from_millis(500), route)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.message, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_deadline_defaults_to_unbounded() {
        let route = Router::new().route(
            "/",
            get(|deadline: Deadline| async move {
                assert!(deadline.expires_at().is_none());
                "ok"
            }),
        );
        let response = route
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_guard_after_cancel() {
        let deadline = Deadline::new(DEFAULT_HANDLER_TIMEOUT);
        assert_eq!(deadline.guard(async { 7 }).await.unwrap(), 7);
        deadline.cancel();
        assert!(deadline.is_cancelled());
        assert!(matches!(
            deadline.guard(async { 7 }).await,
            Err(ServiceError::Timeout)
        ));
    }
}
