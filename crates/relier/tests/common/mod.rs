//! Common test utilities for integration tests
//!
//! Provides a wiremock-backed OpenID provider double (discovery,
//! registration, and token endpoints) plus scriptable user agents for
//! driving redirects without a browser.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use relier::{
    ClientConfig, MemorySecretStore, OidcClient, RedirectKind, RedirectOutcome, RedirectRequest,
    ResponseHandle, SessionState, UserAgent,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An OpenID provider double.
pub struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// The discovery document this provider serves, for tests that need to
    /// mount a doctored variant.
    pub fn discovery_document(&self, with_registration: bool) -> serde_json::Value {
        let uri = self.server.uri();
        let mut document = json!({
            "issuer": uri,
            "authorization_endpoint": format!("{uri}/authorize"),
            "token_endpoint": format!("{uri}/token"),
            "end_session_endpoint": format!("{uri}/logout"),
            "scopes_supported": ["openid", "profile", "offline_access"],
            "code_challenge_methods_supported": ["S256"],
        });
        if with_registration {
            document["registration_endpoint"] = json!(format!("{uri}/register"));
        }
        document
    }

    pub async fn mount_discovery(&self) {
        self.mount_discovery_document(self.discovery_document(true)).await;
    }

    pub async fn mount_discovery_without_registration(&self) {
        self.mount_discovery_document(self.discovery_document(false)).await;
    }

    pub async fn mount_discovery_document(&self, document: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_registration(&self, client_id: &str) {
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "client_id": client_id,
                "redirect_uris": ["https://app.example.com/signin"],
                "scope": "openid profile offline_access",
                "client_id_issued_at": 1_700_000_000,
            })))
            .mount(&self.server)
            .await;
    }

    /// Token grant answering requests whose form body contains `fragment`.
    pub async fn mount_token_grant(&self, fragment: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(fragment))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint rejecting requests whose form body contains `fragment`
    /// with a standard OAuth error response.
    pub async fn mount_token_error(&self, fragment: &str, status: u16, error: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(fragment))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": error,
                "error_description": "as mounted",
            })))
            .mount(&self.server)
            .await;
    }
}

/// A user agent driven by a closure, for scripting redirect outcomes.
pub struct FnAgent<F>(pub F);

impl<F> UserAgent for FnAgent<F>
where
    F: Fn(RedirectRequest, ResponseHandle) + Send + Sync,
{
    fn present(&self, request: RedirectRequest, handle: ResponseHandle) {
        (self.0)(request, handle);
    }
}

/// Agent approving every redirect: echoes the presented `state` back and,
/// for logins, attaches `code`.
pub fn approving_agent(code: &'static str) -> Arc<dyn UserAgent> {
    Arc::new(FnAgent(move |request: RedirectRequest, handle: ResponseHandle| {
        let mut params = HashMap::new();
        if let Some(state) = query_param(&request.url, "state") {
            params.insert("state".to_string(), state);
        }
        if request.kind == RedirectKind::Login {
            params.insert("code".to_string(), code.to_string());
        }
        handle.resolve(RedirectOutcome::Completed(params));
    }))
}

/// Agent abandoning every redirect.
pub fn cancelling_agent() -> Arc<dyn UserAgent> {
    Arc::new(FnAgent(|_request: RedirectRequest, handle: ResponseHandle| {
        handle.resolve(RedirectOutcome::Cancelled);
    }))
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
}

pub fn test_config(issuer: &str) -> ClientConfig {
    ClientConfig::new(
        issuer,
        "https://app.example.com/signin",
        "https://app.example.com/signout",
        "openid profile offline_access",
    )
    .expect("test config should validate")
}

pub fn build_client(issuer: &str, agent: Arc<dyn UserAgent>) -> OidcClient {
    build_client_with_store(issuer, agent, Arc::new(MemorySecretStore::new()))
}

pub fn build_client_with_store(
    issuer: &str,
    agent: Arc<dyn UserAgent>,
    store: Arc<MemorySecretStore>,
) -> OidcClient {
    let state = SessionState::new(store);
    OidcClient::new(test_config(issuer), state, agent).expect("client should build")
}

/// A token-endpoint success body.
pub fn token_body(
    access: &str,
    refresh: Option<&str>,
    id_token: Option<&str>,
) -> serde_json::Value {
    let mut body = json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "openid profile offline_access",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    if let Some(id_token) = id_token {
        body["id_token"] = json!(id_token);
    }
    body
}

/// An unsigned but structurally valid JWT for `sub`.
pub fn fake_id_token(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"test"}"#);
    let payload = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&json!({ "sub": sub, "auth_time": 1_700_000_000 })).unwrap());
    format!("{header}.{payload}.signature")
}
