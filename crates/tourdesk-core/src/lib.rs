//! Core library for tourdesk.
//!
//! Session lifecycle for the tourism-vendor dashboard: login, logout,
//! refresh and expiry of a single bearer-token session, role gating of the
//! signed-in vendor or admin, and the API client consumers use to make
//! authenticated requests.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, CredentialValidator};
pub use auth::{
    AuthError, Clock, FileTokenStore, KeyringTokenStore, ManualClock, MemoryTokenStore,
    SessionEvent, SessionManager, SessionOptions, SessionRecord, SystemClock, TokenStore,
};
pub use cache::CacheManager;
pub use config::{Config, TokenBackend};
pub use models::{Role, User};
