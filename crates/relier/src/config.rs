//! Relying-party configuration.
//!
//! All configured URIs are parsed and policy-checked once, up front. Later
//! flow steps borrow the parsed forms and can no longer fail on URI syntax.

use url::Url;

use crate::error::AuthError;

/// Validated relying-party configuration surface.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    issuer: Url,
    redirect_uri: Url,
    post_logout_redirect_uri: Url,
    scope: String,
}

impl ClientConfig {
    /// Parse and validate the four configuration values.
    ///
    /// Redirect URIs must use `https`, `http` on a loopback host, or a
    /// reverse-domain custom scheme (e.g. `io.example.app:/callback`), and
    /// must not carry a fragment. The issuer must use `https`, or `http` on
    /// a loopback host.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] naming the offending value.
    pub fn new(
        issuer: &str,
        redirect_uri: &str,
        post_logout_redirect_uri: &str,
        scope: &str,
    ) -> Result<Self, AuthError> {
        let issuer = parse_issuer(issuer)?;
        let redirect_uri = parse_redirect("redirect URI", redirect_uri)?;
        let post_logout_redirect_uri =
            parse_redirect("post-logout redirect URI", post_logout_redirect_uri)?;

        let scope = scope.trim();
        if scope.is_empty() {
            return Err(AuthError::Configuration(
                "requested scope must not be empty".into(),
            ));
        }

        Ok(Self {
            issuer,
            redirect_uri,
            post_logout_redirect_uri,
            scope: scope.to_string(),
        })
    }

    /// The authorization server's base identity URI.
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// Where the authorization response redirects back to.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Where the end-session response redirects back to.
    pub fn post_logout_redirect_uri(&self) -> &Url {
        &self.post_logout_redirect_uri
    }

    /// Space-separated scope string requested at registration and login.
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

fn parse_issuer(raw: &str) -> Result<Url, AuthError> {
    let parsed = Url::parse(raw)
        .map_err(|err| AuthError::Configuration(format!("invalid issuer URI: {err}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if is_loopback_host(&parsed) => {}
        other => {
            return Err(AuthError::Configuration(format!(
                "issuer URI must use https (or http on a loopback host), got scheme {other:?}"
            )));
        }
    }
    Ok(parsed)
}

fn parse_redirect(label: &str, raw: &str) -> Result<Url, AuthError> {
    let parsed = Url::parse(raw)
        .map_err(|err| AuthError::Configuration(format!("invalid {label}: {err}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            if !is_loopback_host(&parsed) {
                return Err(AuthError::Configuration(format!(
                    "{label} may use http only on a loopback host"
                )));
            }
        }
        // Reverse-domain custom schemes claimed by native apps
        scheme if scheme.contains('.') => {}
        other => {
            return Err(AuthError::Configuration(format!(
                "{label} scheme {other:?} is not allowed; use https, loopback http, or a reverse-domain app scheme"
            )));
        }
    }

    if parsed.fragment().is_some() {
        return Err(AuthError::Configuration(format!(
            "{label} must not contain a fragment"
        )));
    }
    Ok(parsed)
}

pub(crate) fn is_loopback_host(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]" | "0.0.0.0"))
}
