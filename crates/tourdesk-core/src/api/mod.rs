//! REST API client module for the vendor dashboard backend.
//!
//! This module provides the `ApiClient` for talking to the dashboard API and
//! the `CredentialValidator` seam the session manager authenticates through.
//!
//! Authenticated requests carry `Authorization: Bearer <token>` using the
//! token of the current session.

pub mod client;
pub mod error;

pub use client::{ApiClient, CredentialValidator, LoginResponse};
pub use error::ApiError;
