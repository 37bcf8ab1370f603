//! Error types for banwarden.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BanError {
    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    InvalidAction(String),

    #[error("{0}")]
    InvalidCidrBlock(String),

    #[error("{0}")]
    InvalidDuration(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    #[error("Notification error: {0}")]
    Notify(String),
}

impl BanError {
    /// Errors caused by the request text itself; shown to the requester verbatim.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BanError::Syntax(_)
                | BanError::InvalidAction(_)
                | BanError::InvalidCidrBlock(_)
                | BanError::InvalidDuration(_)
        )
    }
}

pub type BanResult<T> = std::result::Result<T, BanError>;
