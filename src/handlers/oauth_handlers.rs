//! Authorize, token, and client-registry HTTP endpoints (§4.7, §4.8, §6).

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::error::OAuthError;
use crate::services::oauth_service::TokenResponse;
use crate::AppState;

async fn session_user_org(
    state: &AppState,
    jar: &CookieJar,
) -> Result<(crate::models::ExternalUser, crate::models::ExternalOrganization), OAuthError> {
    let token = jar
        .get("session_token")
        .map(|c| c.value().to_string())
        .ok_or_else(|| OAuthError::InvalidRequest("authentication required".to_string()))?;

    state
        .auth_dispatcher
        .authenticate_session(&token)
        .await
        .ok_or_else(|| OAuthError::InvalidRequest("authentication required".to_string()))
}

// ---------------------------------------------------------------------
// §4.7 Authorize
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// `GET /authorize` — redirects the browser to the consent UI, which
/// lives outside this core. Never issues a code itself.
pub async fn authorize_redirect(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, OAuthError> {
    if query.response_type != "code" {
        return Err(OAuthError::UnsupportedResponseType);
    }

    let base = state
        .config
        .public_base_url
        .clone()
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    let mut params = vec![
        ("client_id".to_string(), query.client_id),
        ("redirect_uri".to_string(), query.redirect_uri),
        ("response_type".to_string(), "code".to_string()),
        ("scope".to_string(), query.scope.unwrap_or_else(|| "mcp".to_string())),
    ];
    if let Some(state_param) = query.state {
        params.push(("state".to_string(), state_param));
    }
    if let Some(challenge) = query.code_challenge {
        params.push(("code_challenge".to_string(), challenge));
    }
    if let Some(method) = query.code_challenge_method {
        params.push(("code_challenge_method".to_string(), method));
    }

    let encoded = serde_urlencoded::to_string(&params)
        .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;

    Ok(Redirect::to(&format!("{base}/authorize?{encoded}")).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

#[derive(Debug, Serialize)]
pub struct ConsentResponse {
    pub redirect_url: String,
}

/// `POST /api/oauth/authorize` — the consent UI calls this after a
/// first-party session approves. Must never accept the OAuth bearer it's
/// about to mint as its own authentication (§9).
pub async fn consent_authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<ConsentRequest>,
) -> Result<Json<ConsentResponse>, OAuthError> {
    let (user, organization) = session_user_org(&state, &jar).await?;

    if body.code_challenge_method != "S256" {
        return Err(OAuthError::InvalidRequest(
            "code_challenge_method must be S256".to_string(),
        ));
    }

    let client = state
        .oauth_service
        .validate_client(&body.client_id, None)
        .await?
        .ok_or_else(|| OAuthError::InvalidRequest("unknown client_id".to_string()))?;

    if !state.oauth_service.validate_redirect_uri(&client, &body.redirect_uri) {
        return Err(OAuthError::InvalidRedirectUri);
    }

    let scope = body.scope.unwrap_or_else(|| "mcp".to_string());
    let code = state
        .oauth_service
        .create_authorization_code(
            &client.client_id,
            &user.id,
            &organization.id,
            &body.redirect_uri,
            &scope,
            &body.code_challenge,
        )
        .await?;

    let separator = if body.redirect_uri.contains('?') { '&' } else { '?' };
    let mut redirect_url = format!("{}{separator}code={code}", body.redirect_uri);
    if let Some(state_param) = body.state {
        redirect_url.push_str(&format!("&state={state_param}"));
    }

    Ok(Json(ConsentResponse { redirect_url }))
}

// ---------------------------------------------------------------------
// §4.8 Token endpoint
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

pub async fn token(
    State(state): State<AppState>,
    Form(body): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let client_secret = body.client_secret.as_deref();
    let client_id = body
        .client_id
        .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;

    match body.grant_type.as_str() {
        "authorization_code" => {
            let code = body
                .code
                .ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
            let code_verifier = body.code_verifier.ok_or_else(|| {
                OAuthError::InvalidRequest("code_verifier is required".to_string())
            })?;
            let redirect_uri = body.redirect_uri.ok_or_else(|| {
                OAuthError::InvalidRequest("redirect_uri is required".to_string())
            })?;

            let response = state
                .oauth_service
                .exchange_code(&code, &client_id, client_secret, &code_verifier, &redirect_uri)
                .await?;

            Ok(Json(response))
        }
        "refresh_token" => {
            let refresh_token = body.refresh_token.ok_or_else(|| {
                OAuthError::InvalidRequest("refresh_token is required".to_string())
            })?;

            let response = state
                .oauth_service
                .refresh_access_token(&refresh_token, &client_id, client_secret)
                .await?;

            Ok(Json(response))
        }
        _ => Err(OAuthError::UnsupportedGrantType),
    }
}

// ---------------------------------------------------------------------
// §4.2 / §6 Client registry endpoints
// ---------------------------------------------------------------------

fn default_client_name() -> String {
    "Claude Web".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    #[serde(default = "default_client_name")]
    pub name: String,
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
}

pub async fn create_client(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<CreateClientRequest>,
) -> Result<Response, OAuthError> {
    let (_, organization) = session_user_org(&state, &jar).await?;
    let registration = state
        .oauth_service
        .create_client(&organization.id, &body.name, body.redirect_uris)
        .await?;

    Ok(Json(registration).into_response())
}

pub async fn list_clients(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, OAuthError> {
    let (_, organization) = session_user_org(&state, &jar).await?;
    let clients = state.oauth_service.list_clients(&organization.id).await?;
    Ok(Json(clients).into_response())
}

/// `GET /api/oauth/clients/{client_id}/info` — unauthenticated, used by
/// the consent screen to show the application's display name.
pub async fn client_public_info(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Response, OAuthError> {
    let info = state.oauth_service.get_public_info(&client_id).await?;
    Ok(Json(info).into_response())
}

pub async fn delete_client(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response, OAuthError> {
    let (_, organization) = session_user_org(&state, &jar).await?;
    let deleted = state.oauth_service.delete_client(id, &organization.id).await?;
    if !deleted {
        return Err(OAuthError::NotFound);
    }
    Ok(Json(serde_json::json!({"deleted": true})).into_response())
}

pub async fn rotate_client(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response, OAuthError> {
    let (_, organization) = session_user_org(&state, &jar).await?;
    let rotation = state.oauth_service.rotate_client(id, &organization.id).await?;
    Ok(Json(rotation).into_response())
}
