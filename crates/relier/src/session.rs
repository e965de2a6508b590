//! In-memory session state with a durable subset.
//!
//! One [`SessionState`] value is shared by everything that reads or writes
//! authentication state. All mutation happens under a single lock, so a
//! token set is always observed whole. Only two items survive a process
//! exit, both written through the injected [`SecretStore`]: the client
//! registration and the latest ID token. Provider metadata is re-fetched
//! per run and access/refresh tokens deliberately live only in memory.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::discovery::ProviderMetadata;
use crate::registration::ClientRegistration;
use crate::secrets::{SecretStore, SecretStoreError};
use crate::token::TokenSet;

/// Secret-store entry holding the serialized [`ClientRegistration`].
pub const REGISTRATION_ENTRY: &str = "client-registration";

/// Secret-store entry holding the raw ID-token string.
pub const ID_TOKEN_ENTRY: &str = "id-token";

#[derive(Debug, Default)]
struct SessionFields {
    metadata: Option<ProviderMetadata>,
    registration: Option<ClientRegistration>,
    tokens: Option<TokenSet>,
    id_token: Option<String>,
}

/// Shared authentication state. Cloning yields another handle to the same
/// state.
#[derive(Debug, Clone)]
pub struct SessionState {
    fields: Arc<RwLock<SessionFields>>,
    secrets: Arc<dyn SecretStore>,
}

impl SessionState {
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { fields: Arc::new(RwLock::new(SessionFields::default())), secrets }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionFields> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionFields> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn metadata(&self) -> Option<ProviderMetadata> {
        self.read().metadata.clone()
    }

    #[must_use]
    pub fn registration(&self) -> Option<ClientRegistration> {
        self.read().registration.clone()
    }

    #[must_use]
    pub fn tokens(&self) -> Option<TokenSet> {
        self.read().tokens.clone()
    }

    /// The most recently issued ID token, surviving refreshes that did not
    /// mint a new one.
    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.read().id_token.clone()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.read().tokens.is_some()
    }

    pub fn set_metadata(&self, metadata: ProviderMetadata) {
        self.write().metadata = Some(metadata);
    }

    pub fn set_registration(&self, registration: ClientRegistration) {
        self.write().registration = Some(registration);
    }

    /// Replace the held tokens with a freshly granted set.
    ///
    /// The ID token is carried over from the previous set when the new one
    /// lacks it; providers routinely omit it from refresh responses.
    pub fn store_tokens(&self, tokens: TokenSet) {
        let mut fields = self.write();
        if let Some(id_token) = &tokens.id_token {
            fields.id_token = Some(id_token.clone());
        }
        fields.tokens = Some(tokens);
        tracing::debug!("token set stored");
    }

    /// Drop the token set and ID token together, returning to the
    /// registered-but-logged-out state.
    pub fn clear_tokens(&self) {
        let mut fields = self.write();
        fields.tokens = None;
        fields.id_token = None;
        tracing::debug!("token set cleared");
    }

    /// Populate the durable subset from the secret store.
    ///
    /// Missing entries mean a first run and leave the fields untouched. A
    /// stored registration that no longer deserializes is logged and
    /// skipped; re-registration will replace it.
    ///
    /// # Errors
    /// Returns [`SecretStoreError`] when the store itself fails.
    pub async fn load(&self) -> Result<(), SecretStoreError> {
        let registration = match self.secrets.get(REGISTRATION_ENTRY).await? {
            Some(serialized) => match serde_json::from_str::<ClientRegistration>(&serialized) {
                Ok(registration) => Some(registration),
                Err(err) => {
                    tracing::warn!(%err, "stored client registration is corrupt; ignoring it");
                    None
                }
            },
            None => None,
        };
        let id_token = self.secrets.get(ID_TOKEN_ENTRY).await?;

        let mut fields = self.write();
        let restored_registration = registration.is_some();
        let restored_id_token = id_token.is_some();
        if let Some(registration) = registration {
            fields.registration = Some(registration);
        }
        if let Some(id_token) = id_token {
            fields.id_token = Some(id_token);
        }
        tracing::debug!(
            registration = restored_registration,
            id_token = restored_id_token,
            "session state loaded"
        );
        Ok(())
    }

    /// Write the durable subset to the secret store.
    ///
    /// Each durable item currently absent from memory is deleted from the
    /// store, so saving after a logout removes the stale copies.
    ///
    /// # Errors
    /// Returns [`SecretStoreError`] when the store itself fails.
    pub async fn save(&self) -> Result<(), SecretStoreError> {
        let (registration, id_token) = {
            let fields = self.read();
            (fields.registration.clone(), fields.id_token.clone())
        };

        match &registration {
            Some(registration) => {
                let serialized = serde_json::to_string(registration).map_err(|err| {
                    SecretStoreError(format!("could not serialize client registration: {err}"))
                })?;
                self.secrets.set(REGISTRATION_ENTRY, &serialized).await?;
            }
            None => self.secrets.delete(REGISTRATION_ENTRY).await?,
        }
        match &id_token {
            Some(id_token) => self.secrets.set(ID_TOKEN_ENTRY, id_token).await?,
            None => self.secrets.delete(ID_TOKEN_ENTRY).await?,
        }
        tracing::debug!("session state saved");
        Ok(())
    }
}
