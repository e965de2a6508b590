//! Authorization-code flow driver.
//!
//! Builds a single-use authorization request (fresh `state`, fresh PKCE
//! pair), presents it through the injected [`UserAgent`], and suspends until
//! the one terminal outcome arrives. A response is only accepted when its
//! `state` echoes the outstanding request; user cancellation is a normal
//! `Ok(None)`, never an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope};
use url::Url;

use crate::agent::{
    RedirectKind, RedirectOutcome, RedirectRequest, RedirectSlot, ResponseHandle, UserAgent,
};
use crate::config::ClientConfig;
use crate::discovery::ProviderMetadata;
use crate::error::{AuthError, protocol_detail};
use crate::registration::ClientRegistration;

/// Caller-supplied knobs for one authorization attempt.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationOptions {
    /// Extra query parameters appended to the authorization URL verbatim
    /// (e.g. `acr_values` to select an authentication method). The flow
    /// never interprets them.
    pub extra_params: Vec<(String, String)>,
}

/// A single-use authorization request: the URL to present plus the secrets
/// needed to validate and redeem its response.
#[derive(Debug)]
pub struct AuthorizationRequest {
    url: Url,
    state: String,
    code_verifier: String,
    redirect_uri: Url,
}

impl AuthorizationRequest {
    /// Build the request with a fresh `state` and PKCE S256 pair.
    ///
    /// # Errors
    /// [`AuthError::Discovery`] when the metadata's authorization endpoint
    /// does not parse.
    pub fn new(
        metadata: &ProviderMetadata,
        registration: &ClientRegistration,
        config: &ClientConfig,
        options: &AuthorizationOptions,
    ) -> Result<Self, AuthError> {
        let endpoint = metadata.authorization_url()?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = BasicClient::new(ClientId::new(registration.client_id.clone()))
            .set_auth_uri(AuthUrl::from_url(endpoint))
            .set_redirect_uri(RedirectUrl::from_url(config.redirect_uri().clone()));

        let mut authorize = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(config.scope().to_string()))
            .set_pkce_challenge(pkce_challenge);
        for (name, value) in &options.extra_params {
            authorize = authorize.add_extra_param(name.clone(), value.clone());
        }
        let (url, state) = authorize.url();

        Ok(Self {
            url,
            state: state.secret().clone(),
            code_verifier: pkce_verifier.secret().clone(),
            redirect_uri: config.redirect_uri().clone(),
        })
    }

    /// The URL the user agent must open.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `state` value responses must echo.
    pub fn state(&self) -> &str {
        &self.state
    }
}

/// Validated terminal response of one authorization redirect, carrying what
/// the token exchange needs.
#[derive(Debug)]
pub struct AuthorizationResponse {
    code: String,
    code_verifier: String,
    redirect_uri: Url,
}

impl AuthorizationResponse {
    /// The authorization code to redeem.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub(crate) fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub(crate) fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }
}

/// Drives authorization redirects, one at a time.
pub struct AuthorizationFlow {
    agent: Arc<dyn UserAgent>,
    slot: RedirectSlot,
}

impl fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationFlow").finish_non_exhaustive()
    }
}

impl AuthorizationFlow {
    /// Flow presenting through `agent`.
    pub fn new(agent: Arc<dyn UserAgent>) -> Self {
        Self {
            agent,
            slot: RedirectSlot::default(),
        }
    }

    /// Present `request` and await its single terminal outcome.
    ///
    /// `Ok(None)` means the user cancelled; nothing happened that a caller
    /// needs to undo. The request is consumed either way: authorization
    /// requests are single-use.
    ///
    /// # Errors
    /// [`AuthError::Authorization`] when another redirect is already
    /// pending, the agent fails or drops the handle, the response's `state`
    /// does not match, the provider returned an error response, or the
    /// response carries no code.
    pub async fn run(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Option<AuthorizationResponse>, AuthError> {
        let _guard = self.slot.claim().map_err(|_| {
            AuthError::Authorization("an authorization redirect is already pending".into())
        })?;

        let (handle, outcome) = ResponseHandle::channel();
        tracing::debug!(url = %request.url, "presenting authorization redirect");
        self.agent.present(
            RedirectRequest {
                kind: RedirectKind::Login,
                url: request.url.clone(),
                callback: request.redirect_uri.clone(),
            },
            handle,
        );

        let outcome = outcome.await.map_err(|_| {
            AuthError::Authorization("user agent dropped the redirect without responding".into())
        })?;

        match outcome {
            RedirectOutcome::Cancelled => {
                tracing::debug!("authorization redirect cancelled by user");
                Ok(None)
            }
            RedirectOutcome::Failed(reason) => Err(AuthError::Authorization(reason)),
            RedirectOutcome::Completed(params) => accept_response(&request, params).map(Some),
        }
    }
}

fn accept_response(
    request: &AuthorizationRequest,
    mut params: HashMap<String, String>,
) -> Result<AuthorizationResponse, AuthError> {
    match params.get("state") {
        Some(state) if *state == request.state => {}
        _ => {
            return Err(AuthError::Authorization(
                "response state does not match the pending request".into(),
            ));
        }
    }

    if let Some(error) = params.remove("error") {
        let description = params.remove("error_description");
        return Err(AuthError::Authorization(protocol_detail(
            &error,
            description.as_deref(),
        )));
    }

    let code = params.remove("code").ok_or_else(|| {
        AuthError::Authorization("response carries neither a code nor an error".into())
    })?;

    Ok(AuthorizationResponse {
        code,
        code_verifier: request.code_verifier.clone(),
        redirect_uri: request.redirect_uri.clone(),
    })
}
