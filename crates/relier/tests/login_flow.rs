//! Login sequence integration tests
//!
//! These tests drive `OidcClient::login` against a wiremock provider double.
//! Tests cover:
//! - First-run logins: discovery, dynamic registration, code exchange
//! - Fail-fast when the provider offers no registration endpoint
//! - Redirect-response validation (`state`, provider error parameters)
//! - User cancellation as an absent result
//! - The single-pending-redirect rule across concurrent logins

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    FnAgent, MockProvider, approving_agent, build_client, cancelling_agent, fake_id_token,
    query_param, token_body,
};
use relier::{AuthError, RedirectOutcome, RedirectRequest, ResponseHandle};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Test: A first run performs discovery, registers, and redeems the code.
#[tokio::test]
async fn full_login_discovers_registers_and_stores_tokens() {
    // GIVEN: A provider supporting discovery, registration, and the code grant
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    provider.mount_registration("cid-123").await;
    let id_token = fake_id_token("alice");
    provider
        .mount_token_grant(
            "grant_type=authorization_code",
            token_body("at-1", Some("rt-1"), Some(&id_token)),
        )
        .await;

    let client = build_client(&provider.issuer(), approving_agent("code-abc"));

    // WHEN: The user approves the login redirect
    let tokens = client.login().await.expect("login should succeed");

    // THEN: The granted tokens and supporting state are all held
    let tokens = tokens.expect("user approved, so tokens are granted");
    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert!(client.state().is_logged_in());
    assert_eq!(client.state().id_token(), Some(id_token));
    assert_eq!(client.state().registration().expect("registration").client_id, "cid-123");
    assert!(client.state().metadata().is_some(), "metadata is kept for later operations");
}

/// Test: A provider without a registration endpoint is unusable on first
/// run, and the failure happens before any registration request is sent.
#[tokio::test]
async fn missing_registration_endpoint_fails_before_any_registration_call() {
    let provider = MockProvider::start().await;
    provider.mount_discovery_without_registration().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&provider.server)
        .await;

    let client = build_client(&provider.issuer(), approving_agent("code-abc"));

    let err = client.login().await.expect_err("login must fail");
    assert!(matches!(err, AuthError::Configuration(_)), "got {err:?}");
    assert!(client.state().registration().is_none());
    assert!(!client.state().is_logged_in());
}

/// Test: A redirect response echoing the wrong `state` is rejected and no
/// code exchange is attempted.
#[tokio::test]
async fn state_mismatch_is_rejected_without_a_token_exchange() {
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    provider.mount_registration("cid-123").await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&provider.server)
        .await;

    // GIVEN: An agent answering with a forged state value
    let agent = Arc::new(FnAgent(|_request: RedirectRequest, handle: ResponseHandle| {
        let params = [("code", "code-abc"), ("state", "forged")]
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        handle.resolve(RedirectOutcome::Completed(params));
    }));
    let client = build_client(&provider.issuer(), agent);

    let err = client.login().await.expect_err("forged state must be rejected");
    assert!(matches!(err, AuthError::Authorization(_)), "got {err:?}");
    assert!(!client.state().is_logged_in());
}

/// Test: Cancelling at the redirect is not an error and leaves everything
/// already obtained (metadata, registration) in place.
#[tokio::test]
async fn cancelled_login_returns_none_and_keeps_the_session() {
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    provider.mount_registration("cid-123").await;

    let client = build_client(&provider.issuer(), cancelling_agent());

    let outcome = client.login().await.expect("cancellation is not an error");
    assert!(outcome.is_none());
    assert!(!client.state().is_logged_in());
    assert!(client.state().registration().is_some(), "registration outlives the cancellation");
}

/// Test: While one login redirect is pending, a second login fails fast
/// instead of queueing, and the first completes normally afterwards.
#[tokio::test]
async fn second_login_while_redirect_pending_fails_fast() {
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    provider.mount_registration("cid-123").await;

    // GIVEN: An agent that parks redirect handles without resolving them
    let parked: Arc<Mutex<Vec<ResponseHandle>>> = Arc::new(Mutex::new(Vec::new()));
    let agent = {
        let parked = Arc::clone(&parked);
        Arc::new(FnAgent(move |_request: RedirectRequest, handle: ResponseHandle| {
            parked.lock().unwrap().push(handle);
        }))
    };
    let client = Arc::new(build_client(&provider.issuer(), agent));

    // WHEN: A first login is parked at its redirect
    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.login().await }
    });
    let mut waited = 0;
    while parked.lock().unwrap().is_empty() {
        waited += 1;
        assert!(waited < 1000, "the redirect was never presented");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // THEN: A concurrent login is refused
    let err = client.login().await.expect_err("second login must fail fast");
    assert!(matches!(err, AuthError::Authorization(_)), "got {err:?}");
    assert!(err.detail().contains("pending"));

    // AND: The parked login still finishes cleanly
    let handle = parked.lock().unwrap().pop().expect("parked handle");
    handle.resolve(RedirectOutcome::Cancelled);
    let outcome = first.await.expect("task").expect("cancellation is not an error");
    assert!(outcome.is_none());
}

/// Test: Extension parameters are appended to the authorization URL next to
/// the standard ones.
#[tokio::test]
async fn extension_parameters_reach_the_authorization_url() {
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    provider.mount_registration("cid-123").await;

    // GIVEN: An agent that records the presented URL and cancels
    let presented: Arc<Mutex<Option<Url>>> = Arc::new(Mutex::new(None));
    let agent = {
        let presented = Arc::clone(&presented);
        Arc::new(FnAgent(move |request: RedirectRequest, handle: ResponseHandle| {
            *presented.lock().unwrap() = Some(request.url.clone());
            handle.resolve(RedirectOutcome::Cancelled);
        }))
    };
    let client = build_client(&provider.issuer(), agent);

    let options = relier::AuthorizationOptions {
        extra_params: vec![("acr_values".to_string(), "phr".to_string())],
    };
    client.login_with(&options).await.expect("cancelled login");

    let url = presented.lock().unwrap().clone().expect("a redirect was presented");
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("cid-123"));
    assert_eq!(
        query_param(&url, "redirect_uri").as_deref(),
        Some("https://app.example.com/signin")
    );
    assert_eq!(query_param(&url, "scope").as_deref(), Some("openid profile offline_access"));
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
    assert!(query_param(&url, "code_challenge").is_some_and(|challenge| !challenge.is_empty()));
    assert!(query_param(&url, "state").is_some_and(|state| !state.is_empty()));
    assert_eq!(query_param(&url, "acr_values").as_deref(), Some("phr"));
}

/// Test: A provider error response on the redirect becomes an authorization
/// error carrying the provider's code and description.
#[tokio::test]
async fn provider_error_response_fails_the_login() {
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    provider.mount_registration("cid-123").await;

    // GIVEN: An agent relaying an access_denied response with a valid state
    let agent = Arc::new(FnAgent(|request: RedirectRequest, handle: ResponseHandle| {
        let mut params = std::collections::HashMap::new();
        if let Some(state) = query_param(&request.url, "state") {
            params.insert("state".to_string(), state);
        }
        params.insert("error".to_string(), "access_denied".to_string());
        params.insert("error_description".to_string(), "user said no".to_string());
        handle.resolve(RedirectOutcome::Completed(params));
    }));
    let client = build_client(&provider.issuer(), agent);

    let err = client.login().await.expect_err("provider error must surface");
    assert!(matches!(err, AuthError::Authorization(_)), "got {err:?}");
    assert!(err.detail().contains("access_denied"));
    assert!(err.detail().contains("user said no"));
    assert!(!client.state().is_logged_in());
}
