use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::User;

/// Lifetime in days of a session created without "remember me".
pub const SHORT_SESSION_DAYS: i64 = 1;

/// Lifetime in days of a "remember me" session, and of any refreshed session.
pub const LONG_SESSION_DAYS: i64 = 7;

/// The persisted session: bearer token, absolute expiry and user snapshot.
///
/// `expires_at` is epoch milliseconds and is required on the wire; a stored
/// value without it does not deserialize and is treated as no session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

impl SessionRecord {
    /// Build a record that expires `lifetime` after `now_ms`.
    pub fn issue(token: String, user: User, now_ms: i64, lifetime: Duration) -> Self {
        Self {
            token,
            expires_at: now_ms + lifetime.num_milliseconds(),
            user,
        }
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }

    pub fn time_until_expiry(&self, now_ms: i64) -> Duration {
        Duration::milliseconds(self.expires_at - now_ms)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now_ms: i64) -> i64 {
        self.time_until_expiry(now_ms).num_minutes().max(0)
    }
}
