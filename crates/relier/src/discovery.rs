//! OIDC provider metadata discovery.
//!
//! One GET of `<issuer>/.well-known/openid-configuration`, validated before
//! anything downstream may depend on it: the document's issuer must match
//! the configured one, every advertised endpoint must parse, and when the
//! caller needs dynamic registration the registration endpoint must be
//! present. The validated document is held by the session and replaced
//! wholesale on re-discovery, never patched field by field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::is_loopback_host;
use crate::error::AuthError;

/// Largest discovery document this client will accept.
const MAX_DOCUMENT_BYTES: usize = 64 * 1024;

/// The provider's discovery document, trimmed to the members this client
/// uses. Unrecognized members are preserved so the document a session holds
/// reflects what the provider actually said.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderMetadata {
    /// The provider's identity URI; must equal the issuer that was asked.
    pub issuer: String,
    /// Endpoint the login redirect goes to.
    pub authorization_endpoint: String,
    /// Endpoint for authorization-code and refresh-token grants.
    pub token_endpoint: String,
    /// RFC 7591 dynamic registration endpoint, when offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// RP-initiated logout endpoint, when offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    /// Userinfo endpoint, when offered. Not consulted by this client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// Scopes the provider says it understands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    /// PKCE challenge methods the provider accepts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,
    /// Everything else the document carried.
    #[serde(flatten)]
    pub additional_fields: HashMap<String, serde_json::Value>,
}

impl ProviderMetadata {
    /// Whether the provider offers dynamic client registration.
    pub fn supports_registration(&self) -> bool {
        self.registration_endpoint.is_some()
    }

    /// Whether the provider offers RP-initiated logout.
    pub fn supports_end_session(&self) -> bool {
        self.end_session_endpoint.is_some()
    }

    /// Whether the provider advertises S256 PKCE support.
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported.iter().any(|m| m == "S256")
    }

    /// Parsed authorization endpoint.
    ///
    /// # Errors
    /// [`AuthError::Discovery`] when the document carries an invalid URL.
    pub fn authorization_url(&self) -> Result<Url, AuthError> {
        endpoint_url("authorization_endpoint", &self.authorization_endpoint)
    }

    /// Parsed token endpoint.
    ///
    /// # Errors
    /// [`AuthError::Discovery`] when the document carries an invalid URL.
    pub fn token_url(&self) -> Result<Url, AuthError> {
        endpoint_url("token_endpoint", &self.token_endpoint)
    }

    /// Parsed registration endpoint.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] when the provider offers none;
    /// [`AuthError::Discovery`] when the advertised URL is invalid.
    pub fn require_registration_url(&self) -> Result<Url, AuthError> {
        match &self.registration_endpoint {
            Some(raw) => endpoint_url("registration_endpoint", raw),
            None => Err(AuthError::Configuration(
                "provider advertises no registration endpoint".into(),
            )),
        }
    }

    /// Parsed end-session endpoint.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] when the provider offers none;
    /// [`AuthError::Discovery`] when the advertised URL is invalid.
    pub fn require_end_session_url(&self) -> Result<Url, AuthError> {
        match &self.end_session_endpoint {
            Some(raw) => endpoint_url("end_session_endpoint", raw),
            None => Err(AuthError::Configuration(
                "provider advertises no end-session endpoint".into(),
            )),
        }
    }

    /// Check document coherence: issuer match and well-formed endpoints.
    ///
    /// # Errors
    /// [`AuthError::Discovery`] describing the first offending member.
    pub fn validate(&self, expected_issuer: &Url) -> Result<(), AuthError> {
        let expected = expected_issuer.as_str().trim_end_matches('/');
        if self.issuer.trim_end_matches('/') != expected {
            return Err(AuthError::Discovery(format!(
                "document issuer {:?} does not match requested issuer {expected:?}",
                self.issuer
            )));
        }

        self.authorization_url()?;
        self.token_url()?;
        if let Some(raw) = &self.registration_endpoint {
            endpoint_url("registration_endpoint", raw)?;
        }
        if let Some(raw) = &self.end_session_endpoint {
            endpoint_url("end_session_endpoint", raw)?;
        }
        if let Some(raw) = &self.userinfo_endpoint {
            endpoint_url("userinfo_endpoint", raw)?;
        }
        Ok(())
    }
}

/// Fetch and validate the discovery document for `issuer`.
///
/// With `registration_required` set, a document that advertises no
/// registration endpoint is rejected here, before any registration call
/// could be attempted.
///
/// # Errors
/// [`AuthError::Discovery`] on transport failure, an error status, an
/// oversized body, or a document that fails [`ProviderMetadata::validate`];
/// [`AuthError::Configuration`] when required registration is unavailable.
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    issuer: &Url,
    registration_required: bool,
) -> Result<ProviderMetadata, AuthError> {
    let discovery_url = well_known_url(issuer)?;
    tracing::debug!(url = %discovery_url, "fetching provider metadata");

    let response = http
        .get(discovery_url.clone())
        .send()
        .await
        .map_err(|err| AuthError::Discovery(format!("request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(%status, url = %discovery_url, "discovery endpoint returned an error status");
        return Err(AuthError::Discovery(format!(
            "discovery endpoint returned HTTP {status}"
        )));
    }

    if let Some(length) = response.content_length()
        && length > MAX_DOCUMENT_BYTES as u64
    {
        return Err(AuthError::Discovery(format!(
            "discovery document too large: {length} bytes"
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|err| AuthError::Discovery(format!("failed to read response body: {err}")))?;
    if body.len() > MAX_DOCUMENT_BYTES {
        return Err(AuthError::Discovery(format!(
            "discovery document too large: {} bytes",
            body.len()
        )));
    }

    let metadata: ProviderMetadata = serde_json::from_slice(&body)
        .map_err(|err| AuthError::Discovery(format!("malformed discovery document: {err}")))?;

    metadata.validate(issuer)?;

    if registration_required && !metadata.supports_registration() {
        return Err(AuthError::Configuration(
            "dynamic client registration is required but the provider advertises no registration endpoint"
                .into(),
        ));
    }

    tracing::debug!(
        issuer = %metadata.issuer,
        registration = metadata.supports_registration(),
        end_session = metadata.supports_end_session(),
        "provider metadata validated"
    );
    Ok(metadata)
}

/// `<issuer>/.well-known/openid-configuration`, appended after any issuer
/// path per OpenID Connect Discovery 1.0.
fn well_known_url(issuer: &Url) -> Result<Url, AuthError> {
    let mut url = issuer.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| AuthError::Configuration("issuer URI cannot be a base URL".into()))?;
        segments.pop_if_empty();
        segments.extend([".well-known", "openid-configuration"]);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn endpoint_url(field: &str, raw: &str) -> Result<Url, AuthError> {
    let parsed = Url::parse(raw).map_err(|err| {
        AuthError::Discovery(format!("discovery document field {field} is not a valid URL: {err}"))
    })?;
    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if is_loopback_host(&parsed) => Ok(parsed),
        other => Err(AuthError::Discovery(format!(
            "discovery document field {field} must use https (or loopback http), got scheme {other:?}"
        ))),
    }
}
