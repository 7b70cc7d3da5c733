//! Error types for sftp-pool.
//!
//! Each layer has its own error enum ([`PoolError`], [`SessionError`],
//! [`OptionError`]). This module joins them into one [`Error`] for callers
//! that work across layers, such as [`SessionPool::with_session`].
//!
//! [`SessionPool::with_session`]: crate::pool::SessionPool::with_session

use thiserror::Error;

use crate::options::OptionError;
use crate::pool::PoolError;
use crate::session::SessionError;

/// Result type alias for sftp-pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for sftp-pool.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// The pool could not lend a session.
    #[error(transparent)]
    Pool(#[from] PoolError),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// An operation on a borrowed session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    // ========================================================================
    // Option Errors
    // ========================================================================
    /// Open or copy options were rejected.
    #[error(transparent)]
    Option(#[from] OptionError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the pool is closed and retrying cannot succeed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Pool(PoolError::Closed))
    }

    /// Whether this is a transient condition worth retrying: a wait timeout,
    /// an exhausted pool or a defective session.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Pool(PoolError::WaitTimeoutExpired { .. } | PoolError::Exhausted { .. }) => true,
            Error::Pool(PoolError::FactoryFailed(e)) | Error::Session(e) => e.is_defective(),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Config(format!("{:#}", err))
    }
}
