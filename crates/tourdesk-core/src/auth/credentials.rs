use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use super::store::{decode, SESSION_KEY};
use super::{SessionRecord, TokenStore};

const SERVICE_NAME: &str = "tourdesk";

/// Session record kept in the OS keychain.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service name (one per installation)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, SESSION_KEY).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        let contents = serde_json::to_string(record)?;
        self.entry()?
            .set_password(&contents)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn load(&self) -> Option<SessionRecord> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Keyring unavailable");
                return None;
            }
        };

        let contents = match entry.get_password() {
            Ok(contents) => contents,
            Err(keyring::Error::NoEntry) => return None,
            Err(e) => {
                debug!(error = %e, "Failed to read session from keychain");
                return None;
            }
        };

        let record = decode("keyring", &contents);
        if record.is_none() {
            if let Err(e) = entry.delete_credential() {
                debug!(error = %e, "Failed to discard session from keychain");
            }
        }
        record
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
