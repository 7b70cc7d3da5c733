//! # sftp-pool
//!
//! A bounded, async pool of SFTP sessions.
//!
//! Opening an SFTP session means a TCP connect, an SSH handshake and an
//! authentication round trip. `sftp-pool` lets many short file operations
//! (stat, read, write, list, rename) share a small set of such sessions:
//! each operation borrows a session, uses it exclusively, and hands it back.
//!
//! ## Core Concepts
//!
//! - **Session**: an opaque, already authenticated transport handle produced by a
//!   [`SessionFactory`](session::SessionFactory). The pool never looks inside it.
//! - **Pool**: [`SessionPool`](pool::SessionPool) creates sessions on demand up
//!   to `max_size`, reuses idle ones first, and makes callers wait (optionally
//!   bounded) when every session is borrowed.
//! - **Borrowed session**: [`PooledSession`](pool::PooledSession), a handle that
//!   returns its session to the pool exactly once, on `release`, on `discard`
//!   or when dropped.
//! - **Options**: [`OpenOptions`](options::OpenOptions) and
//!   [`CopyOptions`](options::CopyOptions) validate standard open/copy flags
//!   before a session is borrowed.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sftp_pool::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::load(None)?;
//!     LoggingBuilder::from_config(settings.logging.clone()).init()?;
//!
//!     let params: ConnectionParams = "sftp://deploy@files.internal:22".parse()?;
//!     let pool = settings.pool.open(MyFactory::new(), params).await?;
//!
//!     let size = pool
//!         .with_session(|sftp| Box::pin(async move { sftp.stat("/srv/data/report.csv").await }))
//!         .await?
//!         .size;
//!     println!("{} bytes", size);
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod pool;
pub mod session;

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! ```rust,ignore
    //! use sftp_pool::prelude::*;
    //! ```

    // Pool
    pub use crate::pool::{
        PoolConfig, PoolConfigBuilder, PoolError, PoolResult, PoolStats, PooledSession,
        SessionPool, WarmupResult,
    };

    // Sessions
    pub use crate::session::{ConnectionParams, SessionError, SessionFactory, SessionResult};

    // Options
    pub use crate::options::{CopyOptions, FileOption, OpenOptions, OptionError};

    // Configuration and logging
    pub use crate::config::{PoolSettings, Settings};
    pub use crate::logging::{LogFormat, LogLevel, LoggingBuilder, LoggingConfig};

    // Errors
    pub use crate::error::{Error, Result};

    // Re-export async_trait for implementing SessionFactory
    pub use async_trait::async_trait;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the version string.
pub fn version() -> &'static str {
    VERSION
}
