//! RP-initiated logout driver.
//!
//! Mirrors the authorization driver with one semantic difference: there is
//! no code to redeem afterwards, so there is no "cancelled, try later"
//! outcome. A logout redirect either completes (and the caller may then
//! clear the session) or it did not, and the session must stay intact.

use std::fmt;
use std::sync::Arc;

use oauth2::CsrfToken;
use url::Url;

use crate::agent::{
    RedirectKind, RedirectOutcome, RedirectRequest, RedirectSlot, ResponseHandle, UserAgent,
};
use crate::config::ClientConfig;
use crate::discovery::ProviderMetadata;
use crate::error::AuthError;

/// A single-use end-session request.
#[derive(Debug)]
pub struct EndSessionRequest {
    url: Url,
    state: String,
    post_logout_redirect_uri: Url,
}

impl EndSessionRequest {
    /// Build the logout URL: `id_token_hint`, the post-logout redirect, and
    /// a fresh `state` the response must echo.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] when the provider advertises no
    /// end-session endpoint; [`AuthError::Discovery`] when the advertised
    /// URL is invalid.
    pub fn new(
        metadata: &ProviderMetadata,
        id_token: &str,
        config: &ClientConfig,
    ) -> Result<Self, AuthError> {
        let mut url = metadata.require_end_session_url()?;
        let state = CsrfToken::new_random();

        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair(
                "post_logout_redirect_uri",
                config.post_logout_redirect_uri().as_str(),
            )
            .append_pair("state", state.secret());

        Ok(Self {
            url,
            state: state.secret().clone(),
            post_logout_redirect_uri: config.post_logout_redirect_uri().clone(),
        })
    }

    /// The URL the user agent must open.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `state` value the response must echo.
    pub fn state(&self) -> &str {
        &self.state
    }
}

/// Drives end-session redirects, one at a time.
pub struct EndSessionFlow {
    agent: Arc<dyn UserAgent>,
    slot: RedirectSlot,
}

impl fmt::Debug for EndSessionFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndSessionFlow").finish_non_exhaustive()
    }
}

impl EndSessionFlow {
    /// Flow presenting through `agent`.
    pub fn new(agent: Arc<dyn UserAgent>) -> Self {
        Self {
            agent,
            slot: RedirectSlot::default(),
        }
    }

    /// Present `request` and await the terminal response.
    ///
    /// Success means the provider redirected back to the post-logout URI
    /// with the request's `state`; only then may the caller clear local
    /// session state.
    ///
    /// # Errors
    /// [`AuthError::EndSession`] when another logout redirect is pending,
    /// the agent fails, the user abandons the redirect, or the response's
    /// `state` does not match.
    pub async fn run(&self, request: EndSessionRequest) -> Result<(), AuthError> {
        let _guard = self.slot.claim().map_err(|_| {
            AuthError::EndSession("an end-session redirect is already pending".into())
        })?;

        let (handle, outcome) = ResponseHandle::channel();
        tracing::debug!(url = %request.url, "presenting end-session redirect");
        self.agent.present(
            RedirectRequest {
                kind: RedirectKind::Logout,
                url: request.url.clone(),
                callback: request.post_logout_redirect_uri.clone(),
            },
            handle,
        );

        let outcome = outcome.await.map_err(|_| {
            AuthError::EndSession("user agent dropped the redirect without responding".into())
        })?;

        match outcome {
            RedirectOutcome::Completed(params) => match params.get("state") {
                Some(state) if *state == request.state => {
                    tracing::debug!("end-session redirect completed");
                    Ok(())
                }
                _ => Err(AuthError::EndSession(
                    "response state does not match the pending request".into(),
                )),
            },
            RedirectOutcome::Cancelled => Err(AuthError::EndSession(
                "logout redirect was abandoned before completing".into(),
            )),
            RedirectOutcome::Failed(reason) => Err(AuthError::EndSession(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn metadata() -> ProviderMetadata {
        serde_json::from_value(json!({
            "issuer": "https://idsvr.example.com",
            "authorization_endpoint": "https://idsvr.example.com/authorize",
            "token_endpoint": "https://idsvr.example.com/token",
            "end_session_endpoint": "https://idsvr.example.com/logout"
        }))
        .unwrap()
    }

    fn config() -> ClientConfig {
        ClientConfig::new(
            "https://idsvr.example.com",
            "io.example.app:/callback",
            "io.example.app:/logged-out",
            "openid profile",
        )
        .unwrap()
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    struct EchoAgent;

    impl UserAgent for EchoAgent {
        fn present(&self, request: RedirectRequest, handle: ResponseHandle) {
            assert_eq!(request.kind, RedirectKind::Logout);
            let state = query_map(&request.url)["state"].clone();
            handle.resolve(RedirectOutcome::Completed(HashMap::from([(
                "state".to_string(),
                state,
            )])));
        }
    }

    #[test]
    fn request_url_carries_logout_parameters() {
        let request = EndSessionRequest::new(&metadata(), "my-id-token", &config()).unwrap();
        let params = query_map(request.url());

        assert!(request.url().as_str().starts_with("https://idsvr.example.com/logout?"));
        assert_eq!(params["id_token_hint"], "my-id-token");
        assert_eq!(params["post_logout_redirect_uri"], "io.example.app:/logged-out");
        assert_eq!(params["state"], request.state());
    }

    #[test]
    fn missing_end_session_endpoint_is_a_configuration_error() {
        let metadata: ProviderMetadata = serde_json::from_value(json!({
            "issuer": "https://idsvr.example.com",
            "authorization_endpoint": "https://idsvr.example.com/authorize",
            "token_endpoint": "https://idsvr.example.com/token"
        }))
        .unwrap();

        let err = EndSessionRequest::new(&metadata, "tok", &config()).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn completed_redirect_with_matching_state_succeeds() {
        let flow = EndSessionFlow::new(Arc::new(EchoAgent));
        let request = EndSessionRequest::new(&metadata(), "tok", &config()).unwrap();
        assert!(flow.run(request).await.is_ok());
    }

    #[tokio::test]
    async fn mismatched_state_fails() {
        struct ForgedAgent;
        impl UserAgent for ForgedAgent {
            fn present(&self, _request: RedirectRequest, handle: ResponseHandle) {
                handle.resolve(RedirectOutcome::Completed(HashMap::from([(
                    "state".to_string(),
                    "forged".to_string(),
                )])));
            }
        }

        let flow = EndSessionFlow::new(Arc::new(ForgedAgent));
        let request = EndSessionRequest::new(&metadata(), "tok", &config()).unwrap();
        let err = flow.run(request).await.unwrap_err();
        assert!(matches!(err, AuthError::EndSession(_)));
        assert!(err.detail().contains("state"));
    }

    #[tokio::test]
    async fn abandoned_redirect_is_an_error_not_an_absent_result() {
        struct CancelAgent;
        impl UserAgent for CancelAgent {
            fn present(&self, _request: RedirectRequest, handle: ResponseHandle) {
                handle.resolve(RedirectOutcome::Cancelled);
            }
        }

        let flow = EndSessionFlow::new(Arc::new(CancelAgent));
        let request = EndSessionRequest::new(&metadata(), "tok", &config()).unwrap();
        let err = flow.run(request).await.unwrap_err();
        assert!(matches!(err, AuthError::EndSession(_)));
    }
}
