//! §4.3/§4.4/§4.7/§4.8 end-to-end authorization-code + PKCE + refresh
//! flow, and the MCP call it unlocks — the "Concrete end-to-end
//! scenarios" from the design doc, driven through the real router.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use bow_mcp_gateway::test_utils::{
    build_test_app_state, build_test_router, create_test_db, insert_organization, insert_user,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
const REDIRECT_URI: &str = "https://claude.ai/api/mcp/auth_callback";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_client(
    app: &axum::Router,
    pool: &sqlx::SqlitePool,
    user_id: &str,
) -> (String, String) {
    let created = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/clients")
                .header("content-type", "application/json")
                .header("cookie", format!("session_token={user_id}"))
                .body(Body::from(json!({"name": "Claude Web"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let created = body_json(created).await;
    let client_id = created["client_id"].as_str().unwrap().to_string();

    // validate the redirect URI we'll use is one of the defaults.
    let _ = sqlx::query_scalar::<_, String>("SELECT redirect_uris FROM oauth_clients WHERE client_id = ?")
        .bind(&client_id)
        .fetch_one(pool)
        .await
        .unwrap();

    (client_id, created["client_secret"].as_str().unwrap().to_string())
}

async fn consent(app: &axum::Router, user_id: &str, client_id: &str, state_param: &str) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/authorize")
                .header("content-type", "application/json")
                .header("cookie", format!("session_token={user_id}"))
                .body(Body::from(
                    json!({
                        "client_id": client_id,
                        "redirect_uri": REDIRECT_URI,
                        "state": state_param,
                        "code_challenge": CHALLENGE,
                        "code_challenge_method": "S256",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

fn extract_code(redirect_url: &str) -> String {
    let query = redirect_url.split('?').nth(1).unwrap();
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("code="))
        .unwrap()
        .to_string()
}

async fn token_request(app: &axum::Router, form: &[(&str, &str)]) -> axum::response::Response {
    let encoded = serde_urlencoded::to_string(form).unwrap();
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(encoded))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn full_flow_authorize_exchange_and_mcp_call() {
    let pool = create_test_db().await;
    insert_organization(&pool, "org-1", true).await;
    insert_user(&pool, "user-1", "org-1").await;
    let state = build_test_app_state(pool.clone(), None).await;
    let app = build_test_router(state);

    let (client_id, _secret) = seed_client(&app, &pool, "user-1").await;
    let consent_response = consent(&app, "user-1", &client_id, "test_state_123").await;
    let redirect_url = consent_response["redirect_url"].as_str().unwrap();
    assert!(redirect_url.contains("state=test_state_123"));
    let code = extract_code(redirect_url);

    let token_response = token_request(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("code_verifier", VERIFIER),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", &client_id),
        ],
    )
    .await;
    assert_eq!(token_response.status(), StatusCode::OK);
    let token_body = body_json(token_response).await;
    let access_token = token_body["access_token"].as_str().unwrap();
    assert!(access_token.starts_with("bow_oauth_"));
    assert_eq!(token_body["token_type"], "Bearer");
    assert!(token_body["expires_in"].as_i64().unwrap() > 0);

    let mcp_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mcp")
                .header("authorization", format!("Bearer {access_token}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(mcp_response.status(), StatusCode::OK);
    assert_eq!(
        mcp_response
            .headers()
            .get("mcp-protocol-version")
            .unwrap()
            .to_str()
            .unwrap(),
        "2025-06-18"
    );
    let mcp_body = body_json(mcp_response).await;
    assert!(!mcp_body["result"]["tools"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pkce_mismatch_is_invalid_grant() {
    let pool = create_test_db().await;
    insert_organization(&pool, "org-1", true).await;
    insert_user(&pool, "user-1", "org-1").await;
    let state = build_test_app_state(pool.clone(), None).await;
    let app = build_test_router(state);

    let (client_id, _secret) = seed_client(&app, &pool, "user-1").await;
    let consent_response = consent(&app, "user-1", &client_id, "s").await;
    let code = extract_code(consent_response["redirect_url"].as_str().unwrap());

    let response = token_request(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("code_verifier", "wrong_verifier_that_doesnt_match"),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", &client_id),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn code_is_single_use() {
    let pool = create_test_db().await;
    insert_organization(&pool, "org-1", true).await;
    insert_user(&pool, "user-1", "org-1").await;
    let state = build_test_app_state(pool.clone(), None).await;
    let app = build_test_router(state);

    let (client_id, _secret) = seed_client(&app, &pool, "user-1").await;
    let consent_response = consent(&app, "user-1", &client_id, "s").await;
    let code = extract_code(consent_response["redirect_url"].as_str().unwrap());

    let form = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("code_verifier", VERIFIER),
        ("redirect_uri", REDIRECT_URI),
        ("client_id", client_id.as_str()),
    ];

    let first = token_request(&app, &form).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = token_request(&app, &form).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let second_body = body_json(second).await;
    assert_eq!(second_body["error"], "invalid_grant");
}

#[tokio::test]
async fn consent_rejects_redirect_uri_outside_allowlist() {
    let pool = create_test_db().await;
    insert_organization(&pool, "org-1", true).await;
    insert_user(&pool, "user-1", "org-1").await;
    let state = build_test_app_state(pool.clone(), None).await;
    let app = build_test_router(state);

    let (client_id, _secret) = seed_client(&app, &pool, "user-1").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/authorize")
                .header("content-type", "application/json")
                .header("cookie", "session_token=user-1")
                .body(Body::from(
                    json!({
                        "client_id": client_id,
                        "redirect_uri": "https://evil.example.com/callback",
                        "code_challenge": CHALLENGE,
                        "code_challenge_method": "S256",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error_description"]
        .as_str()
        .unwrap()
        .contains("redirect_uri"));
}

#[tokio::test]
async fn refresh_rotates_tokens_and_new_access_token_authenticates_mcp() {
    let pool = create_test_db().await;
    insert_organization(&pool, "org-1", true).await;
    insert_user(&pool, "user-1", "org-1").await;
    let state = build_test_app_state(pool.clone(), None).await;
    let app = build_test_router(state);

    let (client_id, _secret) = seed_client(&app, &pool, "user-1").await;
    let consent_response = consent(&app, "user-1", &client_id, "s").await;
    let code = extract_code(consent_response["redirect_url"].as_str().unwrap());

    let initial = token_request(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("code_verifier", VERIFIER),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", &client_id),
        ],
    )
    .await;
    let initial = body_json(initial).await;
    let old_access = initial["access_token"].as_str().unwrap().to_string();
    let refresh_token = initial["refresh_token"].as_str().unwrap().to_string();

    let refreshed = token_request(
        &app,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", &client_id),
        ],
    )
    .await;
    assert_eq!(refreshed.status(), StatusCode::OK);
    let refreshed = body_json(refreshed).await;
    let new_access = refreshed["access_token"].as_str().unwrap().to_string();
    assert_ne!(new_access, old_access);
    assert!(refreshed["refresh_token"].as_str().unwrap() != refresh_token);

    let mcp_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mcp")
                .header("authorization", format!("Bearer {new_access}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(mcp_response.status(), StatusCode::OK);
}
