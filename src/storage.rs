//! Persisted session storage.
//!
//! The token and the user profile are written and cleared together. The
//! default backend is the OS credential store (DPAPI on Windows, Keychain on
//! macOS, Secret Service on Linux via the `keyring` crate); the local SQLite
//! store is used when the credential store is disabled.

use std::sync::{Arc, Mutex};

use keyring::Entry;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::db::LocalStore;
use crate::error::StoreError;
use crate::session::UserProfile;

const SERVICE_NAME: &str = "dining-console";

const KEY_TOKEN: &str = "session_token";
const KEY_USER: &str = "session_user";

/// Category used when the session lives in the local store.
const LOCAL_CATEGORY: &str = "session";

/// Whatever was found in storage. Either half may be missing; the session
/// guard decides what to do with a partial pair.
#[derive(Default)]
pub struct StoredSession {
    pub token: Option<Zeroizing<String>>,
    pub user: Option<UserProfile>,
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish()
    }
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<StoredSession, StoreError>;
    fn save(&self, token: &str, user: &UserProfile) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// OS credential store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Retrieve a single credential. Returns `None` when the entry does not
    /// exist or the platform store cannot be read.
    fn get_credential(&self, key: &str) -> Option<String> {
        let entry = match Entry::new(&self.service, key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(pw),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }

    fn set_credential(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Entry::new(&self.service, key)?.set_password(value)?;
        Ok(())
    }

    /// Delete a credential. Silently succeeds if the entry does not exist.
    fn delete_credential(&self, key: &str) -> Result<(), StoreError> {
        match Entry::new(&self.service, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStore for KeyringStore {
    fn load(&self) -> Result<StoredSession, StoreError> {
        let token = self.get_credential(KEY_TOKEN).map(Zeroizing::new);
        let user = self.get_credential(KEY_USER).and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| warn!(error = %e, "keyring: stored user profile is unreadable"))
                .ok()
        });
        Ok(StoredSession { token, user })
    }

    fn save(&self, token: &str, user: &UserProfile) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(user)?;
        self.set_credential(KEY_TOKEN, token)?;
        if let Err(e) = self.set_credential(KEY_USER, &user_json) {
            let _ = self.delete_credential(KEY_TOKEN);
            return Err(e);
        }
        info!(username = %user.username, "Session stored in OS credential store");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let token = self.delete_credential(KEY_TOKEN);
        let user = self.delete_credential(KEY_USER);
        token.and(user)
    }
}

// ---------------------------------------------------------------------------
// Local SQLite fallback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LocalSessionStore {
    store: Arc<LocalStore>,
}

impl LocalSessionStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

impl SessionStore for LocalSessionStore {
    fn load(&self) -> Result<StoredSession, StoreError> {
        Ok(StoredSession {
            token: self
                .store
                .get_setting(LOCAL_CATEGORY, KEY_TOKEN)?
                .map(Zeroizing::new),
            user: self.store.get_json(LOCAL_CATEGORY, KEY_USER)?,
        })
    }

    fn save(&self, token: &str, user: &UserProfile) -> Result<(), StoreError> {
        self.store.set_setting(LOCAL_CATEGORY, KEY_TOKEN, token)?;
        self.store.set_json(LOCAL_CATEGORY, KEY_USER, user)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.store.delete_setting(LOCAL_CATEGORY, KEY_TOKEN)?;
        self.store.delete_setting(LOCAL_CATEGORY, KEY_USER)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Non-persistent store; the session is forgotten when the process exits.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<(Option<String>, Option<UserProfile>)>,
}

impl MemorySessionStore {
    /// Seed the store with a possibly partial pair.
    pub fn with(token: Option<&str>, user: Option<UserProfile>) -> Self {
        Self {
            inner: Mutex::new((token.map(str::to_string), user)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<StoredSession, StoreError> {
        let guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(StoredSession {
            token: guard.0.clone().map(Zeroizing::new),
            user: guard.1.clone(),
        })
    }

    fn save(&self, token: &str, user: &UserProfile) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        *guard = (Some(token.to_string()), Some(user.clone()));
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        *guard = (None, None);
        Ok(())
    }
}
