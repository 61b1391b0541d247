//! Error types for wirelay-core.

use thiserror::Error;

/// Main error type for wirelay operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation or malformed message.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Transport layer error.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Host key could not be loaded.
    #[error("host key error: {message}")]
    HostKey { message: String },

    /// Nickname is already bound to a different public key.
    #[error("nickname '{nickname}' already taken with different key")]
    NicknameConflict { nickname: String },

    /// Message could not be delivered to an online client.
    #[error("delivery to '{nickname}' failed")]
    Delivery { nickname: String },
}

impl Error {
    /// True when authentication must be refused because of this error.
    pub fn is_auth_refusal(&self) -> bool {
        matches!(self, Error::NicknameConflict { .. })
    }
}

/// Convenience result type for wirelay operations.
pub type Result<T> = std::result::Result<T, Error>;
