//! Dynamic client registration (RFC 7591).
//!
//! A registration happens once per installation: the resulting
//! [`ClientRegistration`] is the durable client identity and round-trips
//! through serde unchanged, so the session can persist it encrypted and
//! recover it on the next run instead of registering again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{AuthError, OAuthErrorBody};

/// Registration request payload sent to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    /// Redirect URIs the client will use for authorization responses.
    pub redirect_uris: Vec<String>,
    /// Grant types the client asks to use.
    pub grant_types: Vec<String>,
    /// Scope the client asks to be granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Ask the provider to skip the consent screen for this client.
    pub requires_consent: bool,
    /// Redirect URIs the client will use for end-session responses.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_logout_redirect_uris: Vec<String>,
}

impl RegistrationRequest {
    /// The request this crate sends: authorization-code grant only, the
    /// configured scope, consent not required.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            redirect_uris: vec![config.redirect_uri().to_string()],
            grant_types: vec!["authorization_code".to_string()],
            scope: Some(config.scope().to_string()),
            requires_consent: false,
            post_logout_redirect_uris: vec![config.post_logout_redirect_uri().to_string()],
        }
    }
}

/// Client identity issued by the provider.
///
/// Fields beyond the ones this client reads are preserved verbatim so a
/// persisted registration deserializes back to an equal value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRegistration {
    /// Issued client identifier.
    pub client_id: String,
    /// Issued client secret, when the provider registered a confidential
    /// client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Redirect URIs the provider bound to this client.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    /// Scope the provider granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Seconds-since-epoch issue time, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
    /// Secret expiry as seconds since epoch; `0` means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
    /// Everything else the provider included.
    #[serde(flatten)]
    pub additional_fields: HashMap<String, serde_json::Value>,
}

/// Register this installation with the provider.
///
/// No state is touched here; the caller owns persisting the result.
///
/// # Errors
/// [`AuthError::Registration`] on transport failure, a rejection (with the
/// provider's error identifier when it sent one), or a malformed response.
pub async fn register_client(
    http: &reqwest::Client,
    registration_endpoint: &Url,
    request: &RegistrationRequest,
) -> Result<ClientRegistration, AuthError> {
    tracing::debug!(endpoint = %registration_endpoint, "registering client");

    let response = http
        .post(registration_endpoint.clone())
        .json(request)
        .send()
        .await
        .map_err(|err| AuthError::Registration(format!("request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(oauth_error) => oauth_error.describe(),
            Err(_) if body.is_empty() => format!("registration endpoint returned HTTP {status}"),
            Err(_) => format!("registration endpoint returned HTTP {status}: {body}"),
        };
        tracing::warn!(%status, "client registration rejected");
        return Err(AuthError::Registration(detail));
    }

    let registration: ClientRegistration = response
        .json()
        .await
        .map_err(|err| AuthError::Registration(format!("malformed registration response: {err}")))?;

    tracing::debug!(client_id = %registration.client_id, "client registered");
    Ok(registration)
}
