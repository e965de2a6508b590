//! # Relier - OpenID Connect Relying-Party Client
//!
//! Standards-compliant OpenID Connect authentication for native applications:
//! issuer discovery, dynamic client registration, the authorization code flow
//! with PKCE, token refresh, and RP-initiated logout.
//!
//! ## Design Principles
//!
//! - **Nothing Global**: session state and secure storage are injected values,
//!   so two providers (or two tests) never share anything by accident
//! - **Opaque User Agent**: the library never opens a browser; it hands each
//!   redirect to a [`UserAgent`] you supply and awaits one terminal outcome
//! - **Absence Is Not Failure**: user cancellation and an expired refresh
//!   token come back as `Ok(None)`, keeping `Err` for things actually broken
//! - **Standards-Compliant**: OIDC Discovery 1.0, RFC 7591 (Dynamic Client
//!   Registration), RFC 7636 (PKCE), RP-Initiated Logout 1.0
//!
//! ## Architecture
//!
//! - [`config`] - Validated relying-party configuration
//! - [`discovery`] - Provider metadata from the well-known endpoint
//! - [`registration`] - Dynamic client registration
//! - [`agent`] - The user-agent seam redirects are presented through
//! - [`authorize`] - Authorization redirect driver (PKCE, `state`)
//! - [`token`] - Code and refresh-token grants, the resulting [`TokenSet`]
//! - [`endsession`] - RP-initiated logout redirect driver
//! - [`session`] - Shared session state with a durable subset
//! - [`secrets`] - Secure-storage capability behind [`SecretStore`]
//! - [`client`] - [`OidcClient`], the orchestrator tying it all together
//! - [`error`] - The [`AuthError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relier::{
//!     ClientConfig, MemorySecretStore, OidcClient, RedirectOutcome, RedirectRequest,
//!     ResponseHandle, SessionState, UserAgent,
//! };
//!
//! #[derive(Debug)]
//! struct StdoutAgent;
//!
//! impl UserAgent for StdoutAgent {
//!     fn present(&self, request: RedirectRequest, handle: ResponseHandle) {
//!         // A real agent opens the URL and resolves the handle from the
//!         // captured redirect; see examples/device_login.rs.
//!         println!("open {}", request.url);
//!         handle.resolve(RedirectOutcome::Cancelled);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new(
//!         "https://idsvr.example.com",
//!         "https://app.example.com/signin",
//!         "https://app.example.com/signout",
//!         "openid profile offline_access",
//!     )?;
//!     let state = SessionState::new(Arc::new(MemorySecretStore::new()));
//!     let client = OidcClient::new(config, state, Arc::new(StdoutAgent))?;
//!
//!     client.load().await?;
//!     match client.login().await? {
//!         Some(tokens) => println!("logged in, expires {:?}", tokens.expires_at),
//!         None => println!("login cancelled"),
//!     }
//!     client.save().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `keyring` - [`KeyringSecretStore`], persisting the durable session
//!   subset in the platform keychain
//!
//! ## Standards Compliance
//!
//! - **OpenID Connect Discovery 1.0** - issuer metadata resolution
//! - **RFC 7591** - OAuth 2.0 Dynamic Client Registration
//! - **RFC 6749** - OAuth 2.0 Authorization Framework
//! - **RFC 7636** - Proof Key for Code Exchange (PKCE)
//! - **OpenID Connect RP-Initiated Logout 1.0** - end-session flow

#![cfg_attr(docsrs, feature(doc_cfg))]

// Submodules
pub mod agent;
pub mod authorize;
pub mod client;
pub mod config;
pub mod discovery;
pub mod endsession;
pub mod error;
pub mod registration;
pub mod secrets;
pub mod session;
pub mod token;

// Re-export the orchestrator and its configuration
#[doc(inline)]
pub use client::OidcClient;
#[doc(inline)]
pub use config::ClientConfig;

// Re-export the user-agent seam
#[doc(inline)]
pub use agent::{RedirectKind, RedirectOutcome, RedirectRequest, ResponseHandle, UserAgent};

// Re-export the flow building blocks
#[doc(inline)]
pub use authorize::{
    AuthorizationFlow, AuthorizationOptions, AuthorizationRequest, AuthorizationResponse,
};
#[doc(inline)]
pub use discovery::{ProviderMetadata, fetch_provider_metadata};
#[doc(inline)]
pub use endsession::{EndSessionFlow, EndSessionRequest};
#[doc(inline)]
pub use registration::{ClientRegistration, RegistrationRequest, register_client};
#[doc(inline)]
pub use token::{IdTokenClaims, TokenSet, exchange_code, peek_id_token_claims, refresh_tokens};

// Re-export session state and storage
#[doc(inline)]
pub use secrets::{MemorySecretStore, SecretStore, SecretStoreError};
#[doc(inline)]
pub use session::SessionState;

// Re-export the error taxonomy
#[doc(inline)]
pub use error::AuthError;

// Re-export the keychain store when the feature is enabled
#[cfg(feature = "keyring")]
#[cfg_attr(docsrs, doc(cfg(feature = "keyring")))]
pub use secrets::KeyringSecretStore;
