//! The orchestrator tying discovery, registration, redirects, grants, and
//! session state into the three user-facing operations: login, refresh,
//! logout.
//!
//! [`OidcClient`] owns nothing global. It is handed its configuration, a
//! [`SessionState`], and the [`UserAgent`] that presents redirects; every
//! back-channel call goes through one `reqwest` client with redirects
//! disabled. Preconditions (metadata before refresh, an ID token before
//! logout) surface as the failing operation's error variant.

use std::sync::Arc;

use crate::agent::UserAgent;
use crate::authorize::{AuthorizationFlow, AuthorizationOptions, AuthorizationRequest};
use crate::config::ClientConfig;
use crate::discovery::{ProviderMetadata, fetch_provider_metadata};
use crate::endsession::{EndSessionFlow, EndSessionRequest};
use crate::error::AuthError;
use crate::registration::{ClientRegistration, RegistrationRequest, register_client};
use crate::secrets::SecretStoreError;
use crate::session::SessionState;
use crate::token::{TokenSet, exchange_code, refresh_tokens};

/// An OpenID Connect relying-party client for one provider.
#[derive(Debug)]
pub struct OidcClient {
    config: ClientConfig,
    http: reqwest::Client,
    state: SessionState,
    login_flow: AuthorizationFlow,
    logout_flow: EndSessionFlow,
}

impl OidcClient {
    /// Client with its own HTTP transport.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] when the TLS backend cannot be
    /// initialized.
    pub fn new(
        config: ClientConfig,
        state: SessionState,
        agent: Arc<dyn UserAgent>,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| {
                AuthError::Configuration(format!("could not build the HTTP client: {err}"))
            })?;
        Ok(Self::with_http_client(config, state, agent, http))
    }

    /// Client using a caller-supplied transport. The transport should not
    /// follow redirects; token endpoints must be spoken to directly.
    #[must_use]
    pub fn with_http_client(
        config: ClientConfig,
        state: SessionState,
        agent: Arc<dyn UserAgent>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            http,
            state,
            login_flow: AuthorizationFlow::new(Arc::clone(&agent)),
            logout_flow: EndSessionFlow::new(agent),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Provider metadata, discovering it on first use.
    ///
    /// Discovery insists on a `registration_endpoint` only when no usable
    /// registration is held, so a provider that has since dropped dynamic
    /// registration does not strand previously registered installations.
    ///
    /// # Errors
    /// Discovery failures per [`fetch_provider_metadata`].
    pub async fn ensure_metadata(&self) -> Result<ProviderMetadata, AuthError> {
        if let Some(metadata) = self.state.metadata() {
            return Ok(metadata);
        }
        let registration_required = self.state.registration().is_none();
        let metadata =
            fetch_provider_metadata(&self.http, self.config.issuer(), registration_required)
                .await?;
        self.state.set_metadata(metadata.clone());
        Ok(metadata)
    }

    /// Client registration, performing dynamic registration on first use.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] when the provider offers no
    /// registration endpoint, [`AuthError::Registration`] when the
    /// registration call fails, plus discovery failures.
    pub async fn ensure_registration(&self) -> Result<ClientRegistration, AuthError> {
        if let Some(registration) = self.state.registration() {
            return Ok(registration);
        }
        let metadata = self.ensure_metadata().await?;
        let endpoint = metadata.require_registration_url()?;
        let request = RegistrationRequest::from_config(&self.config);
        let registration = register_client(&self.http, &endpoint, &request).await?;
        self.state.set_registration(registration.clone());
        Ok(registration)
    }

    /// Run the full login sequence with default authorization parameters.
    ///
    /// See [`login_with`](Self::login_with).
    ///
    /// # Errors
    /// See [`login_with`](Self::login_with).
    pub async fn login(&self) -> Result<Option<TokenSet>, AuthError> {
        self.login_with(&AuthorizationOptions::default()).await
    }

    /// Run the full login sequence: discover and register as needed, drive
    /// the authorization redirect, and redeem the code.
    ///
    /// `Ok(None)` means the user cancelled at the redirect; the session is
    /// exactly as it was. On success the granted tokens are stored and
    /// returned.
    ///
    /// # Errors
    /// Whichever step failed: [`AuthError::Discovery`],
    /// [`AuthError::Configuration`], [`AuthError::Registration`],
    /// [`AuthError::Authorization`], or [`AuthError::TokenExchange`].
    pub async fn login_with(
        &self,
        options: &AuthorizationOptions,
    ) -> Result<Option<TokenSet>, AuthError> {
        let metadata = self.ensure_metadata().await?;
        let registration = self.ensure_registration().await?;

        let request = AuthorizationRequest::new(&metadata, &registration, &self.config, options)?;
        let Some(response) = self.login_flow.run(request).await? else {
            tracing::debug!("login cancelled by the user");
            return Ok(None);
        };

        let tokens = exchange_code(&self.http, &metadata, &registration, response).await?;
        self.state.store_tokens(tokens.clone());
        Ok(Some(tokens))
    }

    /// Redeem the held refresh token for a new token set.
    ///
    /// `Ok(None)` means the provider rejected the refresh token as expired
    /// or revoked; the held tokens are cleared and a full
    /// [`login`](Self::login) is the way back in.
    ///
    /// # Errors
    /// [`AuthError::TokenRefresh`] when a precondition is missing
    /// (metadata, registration, or a refresh token) or the grant fails for
    /// any reason other than an expired or revoked token.
    pub async fn refresh(&self) -> Result<Option<TokenSet>, AuthError> {
        let Some(metadata) = self.state.metadata() else {
            return Err(AuthError::TokenRefresh(
                "provider metadata must be discovered before refreshing".into(),
            ));
        };
        let Some(registration) = self.state.registration() else {
            return Err(AuthError::TokenRefresh(
                "a client registration is required before refreshing".into(),
            ));
        };
        let Some(refresh_token) = self.state.tokens().and_then(|tokens| tokens.refresh_token)
        else {
            return Err(AuthError::TokenRefresh("no refresh token is held".into()));
        };

        match refresh_tokens(&self.http, &metadata, &registration, &refresh_token).await? {
            Some(tokens) => {
                self.state.store_tokens(tokens.clone());
                Ok(Some(tokens))
            }
            None => {
                self.state.clear_tokens();
                Ok(None)
            }
        }
    }

    /// Drive the end-session redirect and, once it completes, drop the
    /// held tokens.
    ///
    /// The session is cleared only after the provider confirms; an
    /// abandoned or failed redirect leaves everything in place so the
    /// caller may retry.
    ///
    /// # Errors
    /// [`AuthError::EndSession`] when a precondition is missing (metadata
    /// or an ID token) or the redirect does not complete;
    /// [`AuthError::Configuration`] when the provider advertises no
    /// end-session endpoint.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let Some(metadata) = self.state.metadata() else {
            return Err(AuthError::EndSession(
                "provider metadata must be discovered before logging out".into(),
            ));
        };
        let Some(id_token) = self.state.id_token() else {
            return Err(AuthError::EndSession(
                "no ID token is held; nothing to log out".into(),
            ));
        };

        let request = EndSessionRequest::new(&metadata, &id_token, &self.config)?;
        self.logout_flow.run(request).await?;

        self.state.clear_tokens();
        tracing::debug!("logged out");
        Ok(())
    }

    /// Restore the durable session subset from the secret store.
    ///
    /// # Errors
    /// Returns [`SecretStoreError`] when the store fails.
    pub async fn load(&self) -> Result<(), SecretStoreError> {
        self.state.load().await
    }

    /// Persist the durable session subset to the secret store.
    ///
    /// # Errors
    /// Returns [`SecretStoreError`] when the store fails.
    pub async fn save(&self) -> Result<(), SecretStoreError> {
        self.state.save().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::agent::{RedirectRequest, ResponseHandle};
    use crate::secrets::MemorySecretStore;

    #[derive(Debug)]
    struct UnusedAgent;

    impl UserAgent for UnusedAgent {
        fn present(&self, _request: RedirectRequest, _handle: ResponseHandle) {
            panic!("no redirect expected in this test");
        }
    }

    fn client() -> OidcClient {
        let config = ClientConfig::new(
            "https://idsvr.example.com",
            "https://app.example.com/signin",
            "https://app.example.com/signout",
            "openid",
        )
        .unwrap();
        let state = SessionState::new(Arc::new(MemorySecretStore::new()));
        OidcClient::new(config, state, Arc::new(UnusedAgent)).unwrap()
    }

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            issuer: "https://idsvr.example.com".to_string(),
            authorization_endpoint: "https://idsvr.example.com/authorize".to_string(),
            token_endpoint: "https://idsvr.example.com/token".to_string(),
            registration_endpoint: None,
            end_session_endpoint: Some("https://idsvr.example.com/logout".to_string()),
            userinfo_endpoint: None,
            scopes_supported: Vec::new(),
            code_challenge_methods_supported: Vec::new(),
            additional_fields: HashMap::new(),
        }
    }

    fn registration() -> ClientRegistration {
        ClientRegistration {
            client_id: "cid".to_string(),
            client_secret: None,
            redirect_uris: vec!["https://app.example.com/signin".to_string()],
            scope: Some("openid".to_string()),
            client_id_issued_at: None,
            client_secret_expires_at: None,
            additional_fields: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn refresh_requires_metadata_first() {
        let client = client();
        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRefresh(_)), "got {err:?}");
        assert!(err.detail().contains("metadata"));
    }

    #[tokio::test]
    async fn refresh_requires_a_registration() {
        let client = client();
        client.state().set_metadata(metadata());

        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRefresh(_)), "got {err:?}");
        assert!(err.detail().contains("registration"));
    }

    #[tokio::test]
    async fn refresh_requires_a_refresh_token() {
        let client = client();
        client.state().set_metadata(metadata());
        client.state().set_registration(registration());

        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRefresh(_)), "got {err:?}");
        assert!(err.detail().contains("refresh token"));
    }

    #[tokio::test]
    async fn logout_requires_metadata_and_an_id_token() {
        let client = client();
        let err = client.logout().await.unwrap_err();
        assert!(matches!(err, AuthError::EndSession(_)), "got {err:?}");

        client.state().set_metadata(metadata());
        let err = client.logout().await.unwrap_err();
        assert!(matches!(err, AuthError::EndSession(_)), "got {err:?}");
        assert!(err.detail().contains("ID token"));
    }
}
