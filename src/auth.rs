//! Security strategies applied to outgoing requests.
//!
//! A [`Security`] strategy decorates every request the client sends. Two
//! strategies are provided: a static [`BearerToken`] and an
//! [`OAuth2ClientCredentials`] flow that exchanges, refreshes and revokes
//! access tokens against a token endpoint.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::request::ApiRequest;

/// Decorates outgoing requests with authentication material.
pub trait Security: Send + Sync + fmt::Debug {
    /// Applies the strategy to a request about to be sent.
    ///
    /// ## Errors
    ///
    /// Returns an error if credentials cannot be obtained or applied.
    fn apply(&self, request: &mut ApiRequest) -> Result<(), AuthError>;

    /// Receives the client's base URL at build time. Strategies with
    /// relative endpoint URLs resolve them against this host.
    fn attach_host(&self, _host: &Url) {}
}

/// A pre-exchanged bearer token.
#[derive(Debug, Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    /// Creates the strategy from an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Security for BearerToken {
    fn apply(&self, request: &mut ApiRequest) -> Result<(), AuthError> {
        if self.token.is_empty() {
            return Ok(());
        }
        request
            .set_header(AUTHORIZATION.as_str(), &format!("Bearer {}", self.token))
            .map_err(AuthError::InvalidCredentials)
    }
}

/// Default seconds a token stays valid when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Timeout for token-endpoint calls.
const TOKEN_TIMEOUT_SECS: u64 = 10;

#[derive(Default)]
struct TokenState {
    token: String,
    expires_at: Option<Instant>,
}

/// OAuth 2.0 client-credentials flow with automatic refresh.
///
/// The first request triggers a token exchange; subsequent requests reuse
/// the token until it is within the refresh threshold of expiry, at which
/// point it is exchanged again. Endpoint URLs may be relative; they are
/// resolved against the API client's base URL.
pub struct OAuth2ClientCredentials {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    token_url: String,
    revoke_url: Option<String>,
    refresh_threshold: Duration,
    host: Mutex<Option<Url>>,
    state: Mutex<TokenState>,
}

impl OAuth2ClientCredentials {
    /// Creates the strategy. `token_url` may be absolute or a path relative
    /// to the API host (e.g. `/oauth2/token`).
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: Vec<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes,
            token_url: token_url.into(),
            revoke_url: None,
            refresh_threshold: Duration::from_secs(10),
            host: Mutex::new(None),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Sets the revocation endpoint, absolute or host-relative.
    pub fn revoke_url(mut self, url: impl Into<String>) -> Self {
        self.revoke_url = Some(url.into());
        self
    }

    /// Sets how long before expiry a token is refreshed.
    pub fn refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    fn resolve(&self, endpoint: &str) -> Result<String, AuthError> {
        if !endpoint.starts_with('/') {
            return Ok(endpoint.to_string());
        }
        let host = self.host.lock().map_err(poisoned)?;
        match host.as_ref() {
            Some(host) => Ok(format!("{}{}", host.as_str().trim_end_matches('/'), endpoint)),
            None => Err(AuthError::TokenExchange(format!(
                "relative endpoint '{endpoint}' used without an API host"
            ))),
        }
    }

    fn exchange(&self) -> Result<(), AuthError> {
        let token_url = self.resolve(&self.token_url)?;
        debug!(token_url, "exchanging client credentials for a token");

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        if !self.scopes.is_empty() {
            form.push(("scope", self.scopes.join(" ")));
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .build()?;
        let response = http.post(&token_url).form(&form).send()?;
        let body: serde_json::Value = response
            .json()
            .map_err(|e| AuthError::TokenExchange(format!("invalid token response: {e}")))?;

        let Some(token) = body.get("access_token").and_then(|t| t.as_str()) else {
            return Err(AuthError::TokenExchange(body.to_string()));
        };
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let mut state = self.state.lock().map_err(poisoned)?;
        state.token = token.to_string();
        state.expires_at = Some(Instant::now() + Duration::from_secs(expires_in));
        Ok(())
    }

    /// Revokes the current token, if one is held and a revocation endpoint
    /// is configured.
    ///
    /// ## Errors
    ///
    /// Returns an error if the revocation endpoint rejects the request.
    pub fn revoke(&self) -> Result<(), AuthError> {
        let token = {
            let state = self.state.lock().map_err(poisoned)?;
            state.token.clone()
        };
        if token.is_empty() {
            return Ok(());
        }

        if let Some(revoke_url) = &self.revoke_url {
            let revoke_url = self.resolve(revoke_url)?;
            let form = [
                ("token", token),
                ("client_id", self.client_id.clone()),
                ("client_secret", self.client_secret.clone()),
            ];
            let http = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
                .build()?;
            let response = http.post(&revoke_url).form(&form).send()?;
            if !response.status().is_success() {
                return Err(AuthError::TokenRevocation(format!(
                    "status {}",
                    response.status()
                )));
            }
        }

        let mut state = self.state.lock().map_err(poisoned)?;
        state.token.clear();
        state.expires_at = None;
        Ok(())
    }

    fn needs_refresh(&self) -> Result<bool, AuthError> {
        let state = self.state.lock().map_err(poisoned)?;
        if state.token.is_empty() {
            return Ok(true);
        }
        Ok(match state.expires_at {
            Some(expires_at) => Instant::now() + self.refresh_threshold >= expires_at,
            None => false,
        })
    }
}

impl Security for OAuth2ClientCredentials {
    fn apply(&self, request: &mut ApiRequest) -> Result<(), AuthError> {
        if self.needs_refresh()? {
            self.exchange()?;
        }
        let token = {
            let state = self.state.lock().map_err(poisoned)?;
            state.token.clone()
        };
        request
            .set_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
            .map_err(AuthError::InvalidCredentials)
    }

    fn attach_host(&self, host: &Url) {
        if let Ok(mut slot) = self.host.lock() {
            *slot = Some(host.clone());
        }
    }
}

impl fmt::Debug for OAuth2ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2ClientCredentials")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AuthError {
    AuthError::TokenExchange("token state lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn start_server() -> (tokio::runtime::Runtime, MockServer) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        (runtime, server)
    }

    fn request() -> ApiRequest {
        ApiRequest::new(
            Method::Get,
            Url::parse("https://api.example.com/things").unwrap(),
        )
    }

    #[test]
    fn test_bearer_token_sets_header() {
        let mut req = request();
        BearerToken::new("tok-123").apply(&mut req).unwrap();
        assert_eq!(req.header_str("authorization"), Some("Bearer tok-123"));
    }

    #[test]
    fn test_empty_bearer_token_is_a_noop() {
        let mut req = request();
        BearerToken::new("").apply(&mut req).unwrap();
        assert_eq!(req.header_str("authorization"), None);
    }

    #[test]
    fn test_oauth2_exchanges_once_and_reuses() {
        let (runtime, server) = start_server();
        runtime.block_on(
            Mock::given(method("POST"))
                .and(path("/oauth2/token"))
                .and(body_string_contains("grant_type=client_credentials"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": "tok-1",
                    "expires_in": 3600,
                })))
                .expect(1)
                .mount(&server),
        );

        let strategy = OAuth2ClientCredentials::new(
            "client-1",
            "secret",
            vec!["thing".to_string()],
            format!("{}/oauth2/token", server.uri()),
        );

        let mut req = request();
        strategy.apply(&mut req).unwrap();
        assert_eq!(req.header_str("authorization"), Some("Bearer tok-1"));

        let mut req2 = request();
        strategy.apply(&mut req2).unwrap();
        assert_eq!(req2.header_str("authorization"), Some("Bearer tok-1"));
    }

    #[test]
    fn test_oauth2_refreshes_near_expiry() {
        let (runtime, server) = start_server();
        runtime.block_on(
            Mock::given(method("POST"))
                .and(path("/oauth2/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": "tok-short",
                    "expires_in": 1,
                })))
                .expect(2)
                .mount(&server),
        );

        let strategy = OAuth2ClientCredentials::new(
            "client-1",
            "secret",
            vec![],
            format!("{}/oauth2/token", server.uri()),
        )
        .refresh_threshold(Duration::from_secs(60));

        strategy.apply(&mut request()).unwrap();
        strategy.apply(&mut request()).unwrap();
    }

    #[test]
    fn test_oauth2_error_response_surfaces() {
        let (runtime, server) = start_server();
        runtime.block_on(
            Mock::given(method("POST"))
                .and(path("/oauth2/token"))
                .respond_with(
                    ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})),
                )
                .mount(&server),
        );

        let strategy = OAuth2ClientCredentials::new(
            "client-1",
            "bad-secret",
            vec![],
            format!("{}/oauth2/token", server.uri()),
        );

        let err = strategy.apply(&mut request()).unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange(_)));
    }

    #[test]
    fn test_relative_endpoint_requires_host() {
        let strategy =
            OAuth2ClientCredentials::new("client-1", "secret", vec![], "/oauth2/token");
        let err = strategy.apply(&mut request()).unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange(_)));

        strategy.attach_host(&Url::parse("https://api.example.com").unwrap());
        assert_eq!(
            strategy.resolve("/oauth2/token").unwrap(),
            "https://api.example.com/oauth2/token"
        );
    }
}
