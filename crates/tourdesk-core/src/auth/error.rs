use thiserror::Error;

use crate::api::ApiError;
use crate::models::Role;

/// Message used when the server rejects a login without saying why.
pub const GENERIC_LOGIN_FAILURE: &str = "Login failed. Please try again.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The server refused the credentials or token.
    #[error("{0}")]
    Rejected(String),

    /// The server could not be reached or answered with something unreadable.
    #[error("Unable to reach the server: {0}")]
    Transport(String),

    #[error("Failed to save session: {0}")]
    Storage(String),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Requires {required} access, signed in as {actual}")]
    Forbidden { required: Role, actual: Role },
}

impl AuthError {
    /// Text suitable for showing next to a login form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Rejected(message) => message.clone(),
            AuthError::Transport(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected(message) => AuthError::Rejected(message),
            ApiError::Unauthorized => AuthError::Rejected(GENERIC_LOGIN_FAILURE.to_string()),
            ApiError::AccessDenied(_) => AuthError::Rejected(GENERIC_LOGIN_FAILURE.to_string()),
            ApiError::NetworkError(e) => AuthError::Transport(e.to_string()),
            other => AuthError::Transport(other.to_string()),
        }
    }
}
