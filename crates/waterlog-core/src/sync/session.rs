//! Signed-in user session.
//!
//! [`StoredSession`] keeps the user id and access token in the OS keyring so
//! a background sync can run without prompting. [`FixedSession`] holds them
//! in memory.

use std::sync::RwLock;

use crate::sync::ports::AuthOracle;

const USER_ID_KEY: &str = "session_user_id";
const ACCESS_TOKEN_KEY: &str = "session_access_token";

mod keyring_store {
    const SERVICE: &str = "waterlog";

    pub fn get(key: &str) -> Result<Option<String>, keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), keyring::Error> {
        keyring::Entry::new(SERVICE, key)?.set_password(value)
    }

    pub fn delete(key: &str) -> Result<(), keyring::Error> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Credentials {
    user_id: Option<String>,
    access_token: Option<String>,
}

/// Session persisted in the OS keyring.
#[derive(Debug, Default)]
pub struct StoredSession {
    cached: RwLock<Credentials>,
}

impl StoredSession {
    /// Load whatever session the keyring holds. An unreadable keyring is
    /// treated as signed out.
    pub fn load() -> Self {
        let read = |key: &str| {
            keyring_store::get(key).unwrap_or_else(|e| {
                tracing::warn!(key, error = %e, "keyring unavailable");
                None
            })
        };
        Self {
            cached: RwLock::new(Credentials {
                user_id: read(USER_ID_KEY).filter(|id| !id.trim().is_empty()),
                access_token: read(ACCESS_TOKEN_KEY),
            }),
        }
    }

    /// Persist a signed-in session.
    ///
    /// # Errors
    /// Returns an error if the keyring rejects the write.
    pub fn sign_in(&self, user_id: &str, access_token: Option<&str>) -> Result<(), keyring::Error> {
        keyring_store::set(USER_ID_KEY, user_id)?;
        match access_token {
            Some(token) => keyring_store::set(ACCESS_TOKEN_KEY, token)?,
            None => keyring_store::delete(ACCESS_TOKEN_KEY)?,
        }
        if let Ok(mut cached) = self.cached.write() {
            *cached = Credentials {
                user_id: Some(user_id.to_string()),
                access_token: access_token.map(str::to_string),
            };
        }
        tracing::info!(user_id, "session stored");
        Ok(())
    }

    /// Forget the session.
    ///
    /// # Errors
    /// Returns an error if the keyring rejects the delete.
    pub fn sign_out(&self) -> Result<(), keyring::Error> {
        keyring_store::delete(USER_ID_KEY)?;
        keyring_store::delete(ACCESS_TOKEN_KEY)?;
        if let Ok(mut cached) = self.cached.write() {
            *cached = Credentials::default();
        }
        tracing::info!("session cleared");
        Ok(())
    }
}

impl AuthOracle for StoredSession {
    fn current_user_id(&self) -> Option<String> {
        self.cached.read().ok()?.user_id.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.cached.read().ok()?.access_token.clone()
    }
}

/// In-memory session.
#[derive(Debug, Default)]
pub struct FixedSession {
    inner: RwLock<Credentials>,
}

impl FixedSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Credentials {
                user_id: Some(user_id.into()),
                access_token: None,
            }),
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.access_token = Some(token.into());
        }
        self
    }

    /// Switch user; `None` signs out.
    pub fn set_user(&self, user_id: Option<String>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.user_id = user_id;
        }
    }
}

impl AuthOracle for FixedSession {
    fn current_user_id(&self) -> Option<String> {
        self.inner.read().ok()?.user_id.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.inner.read().ok()?.access_token.clone()
    }
}
