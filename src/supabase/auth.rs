use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::{OsRng, RngCore};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, warn};

use super::{SupabaseSession, error_message};
use crate::{
    gateway::{GatewayError, IdentityGateway, SessionTokens, SignInRedirect},
    models::SessionIdentity,
};

/// The only sign-in provider offered.
pub const OAUTH_PROVIDER: &str = "google";

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Random 43-character verifier as described in RFC 7636.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge for `verifier`.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[async_trait]
impl IdentityGateway for SupabaseSession {
    fn sign_in(&self, return_to: &str) -> Result<SignInRedirect, GatewayError> {
        let code_verifier = generate_code_verifier();
        let challenge = code_challenge(&code_verifier);

        let url = Url::parse_with_params(
            &self.client.endpoint("auth/v1/authorize"),
            &[
                ("provider", OAUTH_PROVIDER),
                ("redirect_to", return_to),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "s256"),
            ],
        )
        .map_err(|err| GatewayError::AuthInitiationFailed(err.to_string()))?;

        Ok(SignInRedirect {
            url: url.into(),
            code_verifier,
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionTokens, GatewayError> {
        let response = self
            .client
            .request(Method::POST, "auth/v1/token?grant_type=pkce")
            .json(&json!({ "auth_code": code, "code_verifier": code_verifier }))
            .send()
            .await
            .map_err(|err| {
                error!(?err, "token exchange request failed");
                GatewayError::AuthInitiationFailed(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::AuthInitiationFailed(error_message(
                status, &body,
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::AuthInitiationFailed(err.to_string()))?;

        Ok(SessionTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        })
    }

    async fn current_user(&self) -> Result<Option<SessionIdentity>, GatewayError> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let response = self
            .authorized(Method::GET, "auth/v1/user")
            .send()
            .await
            .map_err(|err| {
                error!(?err, "user lookup request failed");
                GatewayError::SessionLookupFailed(err.to_string())
            })?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(status = status.as_u16(), "session token rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::SessionLookupFailed(error_message(
                status, &body,
            )));
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::SessionLookupFailed(err.to_string()))?;

        let display_name = user
            .user_metadata
            .full_name
            .or(user.user_metadata.name)
            .filter(|name| !name.trim().is_empty());

        Ok(Some(SessionIdentity {
            id: user.id,
            display_name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode as HttpStatus},
        routing::{get, post},
    };

    use super::*;
    use crate::supabase::test_server::{self, Captured};

    #[test]
    fn challenge_matches_rfc7636_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mA3oljiSsRIiMh0-6H7bD0i4E7wJ1w"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuFKIbRhz7Q"
        );
    }

    #[test]
    fn verifier_is_url_safe_and_fresh() {
        let first = generate_code_verifier();
        assert_eq!(first.len(), 43);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(first, generate_code_verifier());
    }

    #[tokio::test]
    async fn sign_in_builds_authorize_url() {
        let client = test_server::spawn(Router::new()).await;
        let redirect = client
            .session(None)
            .sign_in("http://localhost:8080/auth/callback")
            .unwrap();

        let url = Url::parse(&redirect.url).unwrap();
        assert_eq!(url.path(), "/auth/v1/authorize");
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("provider".into(), "google".into())));
        assert!(params.contains(&(
            "redirect_to".into(),
            "http://localhost:8080/auth/callback".into()
        )));
        assert!(params.contains(&(
            "code_challenge".into(),
            code_challenge(&redirect.code_verifier)
        )));
    }

    fn user_stub(status: HttpStatus, captured: Captured) -> Router {
        Router::new().route(
            "/auth/v1/user",
            get(move |headers: HeaderMap| {
                let captured = captured.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    captured
                        .lock()
                        .unwrap()
                        .push(("GET".into(), "/auth/v1/user".into(), auth, Vec::new()));
                    (
                        status,
                        Json(json!({
                            "id": "user-123",
                            "user_metadata": { "full_name": "Emmy Noether" }
                        })),
                    )
                }
            }),
        )
    }

    #[tokio::test]
    async fn current_user_reads_identity() {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let client = test_server::spawn(user_stub(HttpStatus::OK, captured.clone())).await;

        let identity = client
            .session(Some("jwt".into()))
            .current_user()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(identity.id, "user-123");
        assert_eq!(identity.display_name.as_deref(), Some("Emmy Noether"));
        assert_eq!(captured.lock().unwrap()[0].2.as_deref(), Some("Bearer jwt"));
    }

    #[tokio::test]
    async fn rejected_token_means_signed_out() {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let client =
            test_server::spawn(user_stub(HttpStatus::UNAUTHORIZED, captured.clone())).await;

        let lookup = client.session(Some("expired".into())).current_user().await;
        assert_eq!(lookup, Ok(None));
    }

    #[tokio::test]
    async fn missing_token_skips_the_network() {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let client = test_server::spawn(user_stub(HttpStatus::OK, captured.clone())).await;

        assert_eq!(client.session(None).current_user().await, Ok(None));
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_is_a_lookup_failure() {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let client = test_server::spawn(user_stub(
            HttpStatus::SERVICE_UNAVAILABLE,
            captured.clone(),
        ))
        .await;

        let lookup = client.session(Some("jwt".into())).current_user().await;
        assert!(matches!(lookup, Err(GatewayError::SessionLookupFailed(_))));
    }

    #[tokio::test]
    async fn exchange_code_returns_tokens() {
        let client = test_server::spawn(Router::new().route(
            "/auth/v1/token",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["auth_code"], "code-1");
                assert_eq!(body["code_verifier"], "verifier-1");
                Json(json!({
                    "access_token": "access",
                    "refresh_token": "refresh",
                    "expires_in": 3600,
                    "token_type": "bearer"
                }))
            }),
        ))
        .await;

        let tokens = client
            .session(None)
            .exchange_code("code-1", "verifier-1")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(tokens.expires_in, Some(3600));
    }
}
