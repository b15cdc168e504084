mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use taskgate::auth::Claims;
use taskgate::models::UserSummary;
use taskgate::store::Stores;
use tower::ServiceExt;

use common::{
    body_bytes, body_json, build_auth, empty_request, error_message, json_request,
    load_test_config, request_with_authorization, seed_user, BACKEND_CONFIG, TEST_SECRET,
};

async fn login(app: axum::Router, body: &str) -> axum::http::Response<axum::body::Body> {
    app.oneshot(json_request(Method::POST, "/auth", body))
        .await
        .expect("request should succeed")
}

#[tokio::test]
async fn integration_login_flow() {
    let stores = Stores::memory();
    let user = seed_user(&stores, "Guts", "123445678").await;
    let app = build_auth(load_test_config(BACKEND_CONFIG), &stores);

    let response = login(app.clone(), r#"{"name":"Guts","password":"123445678"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("login should set a cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("; Expires="));
    assert!(cookie.ends_with(" GMT"));

    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());
    assert!(cookie.contains(&token));
    assert_eq!(body["user"]["id"], user.id);
    assert_eq!(body["user"]["name"], "Guts");
    assert!(body["user"].get("password").is_none());

    // The token is accepted by the validation endpoint.
    let response = app
        .oneshot(request_with_authorization(
            Method::POST,
            "/auth/valid",
            &format!("Bearer {}", token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn integration_login_failures() {
    let stores = Stores::memory();
    seed_user(&stores, "Guts", "123445678").await;
    let app = build_auth(load_test_config(BACKEND_CONFIG), &stores);

    let response = login(app.clone(), r#"{"name":"Guts","password":"wrong-password"}"#).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        error_message(response).await,
        "Please check if your name and password are correct"
    );

    let response = login(app.clone(), r#"{"name":"Griffith","password":"123445678"}"#).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_message(response).await, "There is no user with this name");

    for bad in [
        "not json",
        r#"{"name":"","password":"123445678"}"#,
        r#"{"name":"Guts","password":""}"#,
        r#"{}"#,
    ] {
        let response = login(app.clone(), bad).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", bad);
        assert_eq!(error_message(response).await, "Bad Request");
    }
}

#[tokio::test]
async fn integration_validate_header_shapes() {
    let app = build_auth(load_test_config(BACKEND_CONFIG), &Stores::memory());

    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, "/auth/valid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Structurally malformed: wrong scheme, no scheme, too many parts.
    for header in ["Basic abc", "ajshahdashda", "ashdh ajshahdashda", "Bearer    abc"] {
        let response = app
            .clone()
            .oneshot(request_with_authorization(Method::POST, "/auth/valid", header))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "header: {}", header);
        assert_eq!(error_message(response).await, "Bad Request");
    }

    // Well formed, but the token does not verify.
    for header in ["Bearer ", "Bearer garbage", "Bearer a.b.c"] {
        let response = app
            .clone()
            .oneshot(request_with_authorization(Method::POST, "/auth/valid", header))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header: {}", header);
        assert_eq!(error_message(response).await, "Unauthorized");
    }
}

#[tokio::test]
async fn integration_validate_rejects_expired_and_foreign_tokens() {
    let app = build_auth(load_test_config(BACKEND_CONFIG), &Stores::memory());
    let user = UserSummary {
        id: 1,
        name: "Guts".to_string(),
    };

    let expired = Claims {
        data: user.clone(),
        exp: Utc::now().timestamp() - 60,
        iat: Utc::now().timestamp() - 3600,
    };
    let expired = encode(
        &Header::default(),
        &expired,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();

    let live = Claims {
        data: user,
        exp: Utc::now().timestamp() + 600,
        iat: Utc::now().timestamp(),
    };
    let foreign = encode(
        &Header::default(),
        &live,
        &EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();
    let ours = encode(
        &Header::default(),
        &live,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();

    for (token, expected) in [
        (expired, StatusCode::UNAUTHORIZED),
        (foreign, StatusCode::UNAUTHORIZED),
        (ours, StatusCode::OK),
    ] {
        let response = app
            .clone()
            .oneshot(request_with_authorization(
                Method::POST,
                "/auth/valid",
                &format!("Bearer {}", token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn integration_api_endpoint_moves_the_service() {
    let config = load_test_config(&format!("{}\napi_endpoint: /v2/auth\n", BACKEND_CONFIG));
    let app = build_auth(config, &Stores::memory());

    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, "/v2/auth/valid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(empty_request(Method::POST, "/auth/valid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
