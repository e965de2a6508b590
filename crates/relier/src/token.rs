//! Token grants and the token set they produce.
//!
//! Both grants go through the `oauth2` crate against the discovered token
//! endpoint. Refresh has three outcomes, not two: success, a typed error,
//! and `Ok(None)` when the server answers `invalid_grant` — the refresh
//! token is expired or revoked and only a new login can help. That
//! classification looks exclusively at the OAuth error response; nothing
//! about user cancellation plays into it.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use oauth2::basic::{
    BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenType,
};
use oauth2::{
    AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
    HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
    StandardRevocableToken, StandardTokenResponse, TokenResponse as _, TokenUrl,
};
use serde::{Deserialize, Serialize};

use crate::authorize::AuthorizationResponse;
use crate::discovery::ProviderMetadata;
use crate::error::{AuthError, protocol_detail};
use crate::registration::ClientRegistration;

/// Token-endpoint response fields beyond RFC 6749: the OIDC ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type OidcTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// OAuth client parameterized for this crate's response type; the token
/// endpoint is attached per call from the discovered metadata.
type GrantClient = oauth2::Client<
    BasicErrorResponse,
    OidcTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

type ConfiguredGrantClient = oauth2::Client<
    BasicErrorResponse,
    OidcTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

type GrantRequestError = RequestTokenError<HttpClientError<reqwest::Error>, BasicErrorResponse>;

/// Credentials granted by the token endpoint. Always replaced as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenSet {
    /// Bearer token for resource requests.
    pub access_token: String,
    /// Token for refresh grants, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// ID token from this grant. Absent on most refresh responses; the
    /// session keeps the previously issued one in that case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Absolute access-token expiry, when the provider reported a lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scope the provider granted, when echoed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    fn from_response(response: &OidcTokenResponse) -> Self {
        let expires_at = response
            .expires_in()
            .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
            .map(|lifetime| Utc::now() + lifetime);

        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|token| token.secret().clone()),
            id_token: response.extra_fields().id_token.clone(),
            expires_at,
            scope: response.scopes().map(|scopes| {
                scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" ")
            }),
        }
    }

    /// Whether the access token is at or past expiry, with a 60 second
    /// clock-skew buffer. An unknown expiry reads as not expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(60) >= expires_at,
            None => false,
        }
    }
}

/// Redeem an authorization response for tokens.
///
/// Sends the code, its PKCE verifier, and the redirect URI it was issued
/// for; the client secret rides along when the registration is
/// confidential.
///
/// # Errors
/// [`AuthError::TokenExchange`] on transport failure, an OAuth error
/// response, or a malformed success body; [`AuthError::Discovery`] when the
/// metadata's token endpoint does not parse.
pub async fn exchange_code(
    http: &reqwest::Client,
    metadata: &ProviderMetadata,
    registration: &ClientRegistration,
    response: AuthorizationResponse,
) -> Result<TokenSet, AuthError> {
    let client = grant_client(metadata, registration)?
        .set_redirect_uri(RedirectUrl::from_url(response.redirect_uri().clone()));

    tracing::debug!(client_id = %registration.client_id, "redeeming authorization code");
    let granted = client
        .exchange_code(AuthorizationCode::new(response.code().to_string()))
        .set_pkce_verifier(PkceCodeVerifier::new(response.code_verifier().to_string()))
        .request_async(http)
        .await
        .map_err(|err| AuthError::TokenExchange(describe_grant_error(&err)))?;

    tracing::debug!("authorization code redeemed");
    Ok(TokenSet::from_response(&granted))
}

/// Perform a refresh-token grant.
///
/// `Ok(None)` reports an `invalid_grant` answer: the refresh token is
/// expired or revoked and the caller must run a full login. Any other
/// rejection is an error.
///
/// # Errors
/// [`AuthError::TokenRefresh`] on transport failure, a non-`invalid_grant`
/// OAuth error, or a malformed response; [`AuthError::Discovery`] when the
/// metadata's token endpoint does not parse.
pub async fn refresh_tokens(
    http: &reqwest::Client,
    metadata: &ProviderMetadata,
    registration: &ClientRegistration,
    refresh_token: &str,
) -> Result<Option<TokenSet>, AuthError> {
    let client = grant_client(metadata, registration)?;

    tracing::debug!(client_id = %registration.client_id, "refreshing access token");
    match client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(http)
        .await
    {
        Ok(granted) => {
            tracing::debug!("access token refreshed");
            Ok(Some(TokenSet::from_response(&granted)))
        }
        Err(RequestTokenError::ServerResponse(response))
            if matches!(response.error(), BasicErrorResponseType::InvalidGrant) =>
        {
            tracing::debug!("refresh token expired or revoked; full login required");
            Ok(None)
        }
        Err(err) => Err(AuthError::TokenRefresh(describe_grant_error(&err))),
    }
}

fn grant_client(
    metadata: &ProviderMetadata,
    registration: &ClientRegistration,
) -> Result<ConfiguredGrantClient, AuthError> {
    let token_url = TokenUrl::from_url(metadata.token_url()?);
    let client =
        GrantClient::new(ClientId::new(registration.client_id.clone())).set_token_uri(token_url);

    Ok(match &registration.client_secret {
        Some(secret) => client.set_client_secret(ClientSecret::new(secret.clone())),
        None => client,
    })
}

fn describe_grant_error(err: &GrantRequestError) -> String {
    match err {
        RequestTokenError::ServerResponse(response) => protocol_detail(
            &error_code(response.error()),
            response.error_description().map(String::as_str),
        ),
        RequestTokenError::Request(err) => format!("token request failed: {err}"),
        RequestTokenError::Parse(err, _) => format!("malformed token response: {err}"),
        RequestTokenError::Other(message) => message.clone(),
    }
}

// The protocol identifier (snake_case wire form) comes back through serde
fn error_code(kind: &BasicErrorResponseType) -> String {
    match serde_json::to_value(kind) {
        Ok(serde_json::Value::String(code)) => code,
        _ => format!("{kind:?}"),
    }
}

/// Claims read from an ID token for display purposes.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// The authenticated subject.
    pub sub: String,
    /// End-user authentication time, seconds since epoch.
    #[serde(default)]
    pub auth_time: Option<i64>,
    /// Token expiry, seconds since epoch.
    #[serde(default)]
    pub exp: Option<i64>,
    /// The issuer that minted the token.
    #[serde(default)]
    pub iss: Option<String>,
}

/// Decode the payload segment of an ID token, without verifying anything.
///
/// The trust decision already happened: the token arrived over TLS from the
/// token endpoint this client discovered. This helper only makes its claims
/// readable, e.g. to greet the subject. Malformed input yields `None` with
/// a warning, never an error.
pub fn peek_id_token_claims(id_token: &str) -> Option<IdTokenClaims> {
    let mut segments = id_token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            tracing::warn!("ID token is not a three-segment JWT");
            return None;
        }
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| tracing::warn!(%err, "ID token payload is not base64url"))
        .ok()?;
    serde_json::from_slice(&decoded)
        .map_err(|err| tracing::warn!(%err, "ID token payload is not a claims object"))
        .ok()
}
