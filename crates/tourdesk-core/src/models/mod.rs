//! Data models for dashboard identities.
//!
//! - `User`: snapshot of the authenticated vendor or admin
//! - `Role`: the access level carried by a `User`

pub mod user;

pub use user::{Role, User};
