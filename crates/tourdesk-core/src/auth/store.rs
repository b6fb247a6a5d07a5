use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::debug;

use super::SessionRecord;

/// Fixed key the session record is stored under.
pub const SESSION_KEY: &str = "tourdesk_session";

/// Durable storage for exactly one session record.
///
/// `load` never fails: a missing or unparseable value reads as `None`, and an
/// unparseable value is discarded. `clear` is a no-op when nothing is stored.
pub trait TokenStore: Send + Sync {
    fn save(&self, record: &SessionRecord) -> Result<()>;

    fn load(&self) -> Option<SessionRecord>;

    fn clear(&self) -> Result<()>;
}

/// Parse a stored value, returning `None` for corrupt data.
pub(crate) fn decode(store: &str, contents: &str) -> Option<SessionRecord> {
    match serde_json::from_str(contents) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(store, error = %e, "Discarding unreadable session record");
            None
        }
    }
}

/// Session record kept as a JSON file in the cache directory.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(format!("{}.json", SESSION_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn load(&self) -> Option<SessionRecord> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(path = ?self.path, error = %e, "Failed to read session file");
                return None;
            }
        };

        let record = decode("file", &contents);
        if record.is_none() {
            if let Err(e) = self.clear() {
                debug!(path = ?self.path, error = %e, "Failed to discard session file");
            }
        }
        record
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }
}

/// Process-local store, for tests and for sessions that must not touch disk.
#[derive(Default)]
pub struct MemoryTokenStore {
    value: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put raw contents in the slot, bypassing serialization
    pub fn put_raw(&self, contents: impl Into<String>) {
        *self.slot() = Some(contents.into());
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        let contents = serde_json::to_string(record)?;
        *self.slot() = Some(contents);
        Ok(())
    }

    fn load(&self) -> Option<SessionRecord> {
        let mut slot = self.slot();
        let record = decode("memory", slot.as_deref()?);
        if record.is_none() {
            *slot = None;
        }
        record
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
