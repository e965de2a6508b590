//! Error taxonomy for relying-party operations.
//!
//! Every fallible operation in this crate returns exactly one of the
//! [`AuthError`] classes below. Two outcomes are deliberately *not* errors
//! and never appear here: a user-cancelled interactive redirect and an
//! expired or revoked refresh token. Both are returned as `Ok(None)` by the
//! operations that can produce them, so callers cannot confuse "the user
//! changed their mind" or "please log in again" with a failure.

use serde::Deserialize;
use thiserror::Error;

/// Failure classes for relying-party operations.
///
/// Each variant carries a description assembled from the protocol-level
/// error identifier when the server sent one and the underlying transport
/// or library message otherwise. [`title`](Self::title) supplies the
/// matching user-facing banner title.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// A configured URI is malformed, or the server lacks a required
    /// capability (e.g. no registration endpoint when registration is
    /// needed). Recoverable by fixing configuration, not by retrying.
    #[error("configuration problem: {0}")]
    Configuration(String),

    /// The discovery document could not be fetched or parsed.
    #[error("metadata discovery failed: {0}")]
    Discovery(String),

    /// Dynamic client registration was rejected or failed.
    #[error("client registration failed: {0}")]
    Registration(String),

    /// The authorization redirect failed or produced an invalid response.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The authorization code could not be redeemed for tokens.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// A refresh-token grant failed for a reason other than token expiry.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// The end-session redirect failed or was abandoned.
    #[error("end session failed: {0}")]
    EndSession(String),
}

impl AuthError {
    /// Banner title for surfacing this error to a user.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration Error",
            Self::Discovery(_) => "Metadata Discovery Error",
            Self::Registration(_) => "Client Registration Error",
            Self::Authorization(_) => "Authorization Error",
            Self::TokenExchange(_) => "Token Exchange Error",
            Self::TokenRefresh(_) => "Token Refresh Error",
            Self::EndSession(_) => "End Session Error",
        }
    }

    /// Description without the class prefix, for rendering under
    /// [`title`](Self::title).
    pub fn detail(&self) -> &str {
        match self {
            Self::Configuration(detail)
            | Self::Discovery(detail)
            | Self::Registration(detail)
            | Self::Authorization(detail)
            | Self::TokenExchange(detail)
            | Self::TokenRefresh(detail)
            | Self::EndSession(detail) => detail,
        }
    }
}

/// OAuth error document returned by authorization servers on rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorBody {
    /// Protocol error identifier, e.g. `invalid_grant`.
    pub error: String,
    /// Optional human-readable elaboration from the server.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Render the identifier and description into one line.
    pub fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

/// Combine a protocol error identifier with an optional server-provided
/// description into one detail line.
pub(crate) fn protocol_detail(error: &str, description: Option<&str>) -> String {
    match description {
        Some(description) => format!("{error}: {description}"),
        None => error.to_string(),
    }
}
