//! Authentication module for managing the dashboard session.
//!
//! This module provides:
//! - `SessionManager`: login, logout, refresh and expiry of the session
//! - `SessionRecord`: the persisted token, expiry and user snapshot
//! - `TokenStore`: persistence of the single record (file, keyring, memory)
//! - `Clock`: time source used for every expiry decision
//!
//! Sessions last one day, or seven with "remember me". A refresh always
//! extends to seven days.

pub mod clock;
pub mod credentials;
pub mod error;
pub mod record;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::KeyringTokenStore;
pub use error::AuthError;
pub use record::{SessionRecord, LONG_SESSION_DAYS, SHORT_SESSION_DAYS};
pub use session::{SessionEvent, SessionManager, SessionOptions};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, SESSION_KEY};
