//! Authentication endpoint handlers: login and token validation.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::auth::{bearer_token, verify_blocking};
use crate::metrics::MetricsRecorder;
use crate::middleware::Deadline;
use crate::models::{Credential, UserSummary};
use crate::state::AuthState;
use crate::store::StoreError;
use crate::utils::http_helpers::HTTPError;

/// Registers authentication routes, relative to the service's mount path.
pub fn routes() -> Router<AuthState> {
    Router::new()
        .route("/", post(login))
        .route("/valid", post(validate))
}

/// Body of a successful login.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub user: UserSummary,
    pub token: String,
}

fn login_error(state: &AuthState, result: &str, status: StatusCode, message: &str) -> HTTPError {
    state.metrics.record_login_attempt(result);
    HTTPError::new(status, message)
}

/// Checks a name/password pair and hands out a signed token.
///
/// The token comes back twice: as a `token` cookie and in the JSON body next
/// to the user.
async fn login(
    State(state): State<AuthState>,
    deadline: Deadline,
    body: Bytes,
) -> Result<Response, HTTPError> {
    let credential: Credential = serde_json::from_slice(&body)
        .map_err(|_| login_error(&state, "bad_request", StatusCode::BAD_REQUEST, "Bad Request"))?;
    if credential.name.is_empty() || credential.password.is_empty() {
        return Err(login_error(
            &state,
            "bad_request",
            StatusCode::BAD_REQUEST,
            "Bad Request",
        ));
    }

    let lookup = deadline
        .guard(state.users.get_user_by_name(&credential.name))
        .await?;
    let user = match lookup {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(login_error(
                &state,
                "unknown_user",
                StatusCode::NOT_FOUND,
                "There is no user with this name",
            ))
        }
        Err(e) => {
            error!("User lookup failed during login: {}", e);
            return Err(login_error(
                &state,
                "error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something Went Wrong",
            ));
        }
    };

    let matches = verify_blocking(
        state.hasher.clone(),
        credential.password,
        user.password.clone(),
    )
    .await
    .unwrap_or_else(|e| {
        debug!("Stored hash for user {} is unusable: {}", user.id, e);
        false
    });
    if !matches {
        return Err(login_error(
            &state,
            "wrong_password",
            StatusCode::UNAUTHORIZED,
            "Please check if your name and password are correct",
        ));
    }

    let summary = UserSummary::from(&user);
    let issued = state.tokens.issue(&summary).map_err(|e| {
        error!("Failed to issue a token for user {}: {}", user.id, e);
        login_error(
            &state,
            "error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something Went Wrong",
        )
    })?;

    let cookie = format!(
        "token={}; Expires={}",
        issued.token,
        issued.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| {
        error!("Token cookie is not a valid header: {}", e);
        login_error(
            &state,
            "error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something Went Wrong",
        )
    })?;

    state.metrics.record_login_attempt("success");
    info!("User {} logged in", user.id);

    let mut response = Json(LoginResponse {
        user: summary,
        token: issued.token,
    })
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// 200 with an empty body for a good token, 400 for a malformed or missing
/// header, 401 for a token that fails verification.
async fn validate(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match bearer_token(header) {
        Ok(token) => token,
        Err(shape) => {
            debug!("Rejected authorization header: {:?}", shape);
            return HTTPError::new(StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };

    match state.tokens.validate(token) {
        Ok(claims) => {
            debug!("Validated token for user {}", claims.data.id);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            debug!("{}", e);
            HTTPError::new(StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}
