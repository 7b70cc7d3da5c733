//! Session layer: the transport collaborator the pool is built on.
//!
//! A *session* is an opaque, independently authenticated transport handle
//! (typically one SSH connection with an open SFTP subsystem channel). The pool
//! never looks inside a session; it only asks a [`SessionFactory`] to create,
//! probe and close them.
//!
//! # Example
//!
//! ```rust,ignore
//! use sftp_pool::session::{ConnectionParams, SessionFactory, SessionResult};
//!
//! struct MyFactory;
//!
//! #[async_trait::async_trait]
//! impl SessionFactory for MyFactory {
//!     type Session = MySftpChannel;
//!
//!     async fn create_session(&self, params: &ConnectionParams) -> SessionResult<MySftpChannel> {
//!         MySftpChannel::connect(&params.host, params.port, &params.username).await
//!     }
//!
//!     async fn close_session(&self, session: MySftpChannel) -> SessionResult<()> {
//!         session.disconnect().await
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default SSH port used when a URI or builder does not name one.
pub const DEFAULT_PORT: u16 = 22;

/// URI scheme accepted by [`ConnectionParams::from_uri`].
pub const SCHEME: &str = "sftp";

/// Errors reported by a session or by the factory that creates it.
///
/// Variants split into two groups: transport failures, after which the session
/// must not be reused (see [`SessionError::is_defective`]), and operation-level
/// failures that leave the session healthy.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to establish the transport connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the remote host.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The transport was closed underneath the session.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The remote side did not answer in time.
    #[error("Session timeout after {0} seconds")]
    Timeout(u64),

    /// The remote side sent something the session could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error on the underlying socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote path does not exist.
    #[error("No such file: {0}")]
    NoSuchFile(String),

    /// The remote server refused the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The operation is not supported by the server or the session.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl SessionError {
    /// Whether this error means the session itself is broken.
    ///
    /// A borrower that sees a defective error should [`discard`] the session
    /// instead of releasing it.
    ///
    /// [`discard`]: crate::pool::PooledSession::discard
    pub fn is_defective(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionFailed(_)
                | SessionError::ConnectionClosed
                | SessionError::Timeout(_)
                | SessionError::Protocol(_)
                | SessionError::Io(_)
        )
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Parameters handed to the factory for every session it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Remote host name or address
    pub host: String,
    /// Remote port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name
    pub username: String,
    /// Free-form transport options (cipher lists, keepalive, ...) passed through
    /// to the factory untouched
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionParams {
    /// Create parameters for `username@host` on the default port.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            options: BTreeMap::new(),
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Add a transport option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse `sftp://user@host[:port]`. Query pairs become transport options.
    pub fn from_uri(uri: &str) -> SessionResult<Self> {
        let url = Url::parse(uri)
            .map_err(|e| SessionError::ConnectionFailed(format!("invalid URI '{}': {}", uri, e)))?;

        if url.scheme() != SCHEME {
            return Err(SessionError::Unsupported(format!(
                "URI scheme '{}' (expected '{}')",
                url.scheme(),
                SCHEME
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SessionError::ConnectionFailed(format!("URI '{}' has no host", uri)))?;

        if url.username().is_empty() {
            return Err(SessionError::ConnectionFailed(format!(
                "URI '{}' has no user name",
                uri
            )));
        }

        let mut params = Self::new(host, url.username()).with_port(url.port().unwrap_or(DEFAULT_PORT));
        for (key, value) in url.query_pairs() {
            params.options.insert(key.into_owned(), value.into_owned());
        }
        Ok(params)
    }

    /// Key identifying the remote endpoint, used in log fields.
    pub fn pool_key(&self) -> String {
        format!("{}://{}@{}:{}", SCHEME, self.username, self.host, self.port)
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pool_key())
    }
}

impl FromStr for ConnectionParams {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

/// Creates and destroys sessions on behalf of a [`SessionPool`].
///
/// Implementations own all transport and authentication details. Every method
/// may perform network I/O; the pool never calls them while holding its lock.
///
/// [`SessionPool`]: crate::pool::SessionPool
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// The pooled transport handle
    type Session: Send + Sync + 'static;

    /// Open and authenticate one new session.
    async fn create_session(&self, params: &ConnectionParams) -> SessionResult<Self::Session>;

    /// Close a session. Best-effort: the pool logs failures and moves on.
    async fn close_session(&self, session: Self::Session) -> SessionResult<()>;

    /// Cheap liveness probe run before an idle session is lent out again.
    async fn is_valid(&self, _session: &Self::Session) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_pool_key() {
        let params = ConnectionParams::new("example.com", "admin");
        assert_eq!(params.pool_key(), "sftp://admin@example.com:22");
        assert_eq!(params.with_port(2222).to_string(), "sftp://admin@example.com:2222");
    }

    #[test]
    fn test_params_from_uri() {
        let params: ConnectionParams = "sftp://deploy@files.internal:2022?compression=yes"
            .parse()
            .unwrap();
        assert_eq!(params.host, "files.internal");
        assert_eq!(params.port, 2022);
        assert_eq!(params.username, "deploy");
        assert_eq!(params.options.get("compression"), Some(&"yes".to_string()));
    }

    #[test]
    fn test_params_from_uri_default_port() {
        let params = ConnectionParams::from_uri("sftp://deploy@files.internal").unwrap();
        assert_eq!(params.port, DEFAULT_PORT);
    }

    #[test]
    fn test_params_from_uri_rejects_bad_input() {
        assert!(matches!(
            ConnectionParams::from_uri("ftp://deploy@files.internal"),
            Err(SessionError::Unsupported(_))
        ));
        assert!(ConnectionParams::from_uri("sftp://files.internal").is_err());
        assert!(ConnectionParams::from_uri("not a uri").is_err());
    }

    #[test]
    fn test_defective_classification() {
        assert!(SessionError::ConnectionClosed.is_defective());
        assert!(SessionError::Timeout(5).is_defective());
        assert!(SessionError::Protocol("bad packet".into()).is_defective());
        assert!(SessionError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_defective());
        assert!(!SessionError::NoSuchFile("/tmp/x".into()).is_defective());
        assert!(!SessionError::PermissionDenied("/root".into()).is_defective());
        assert!(!SessionError::AuthenticationFailed("bad key".into()).is_defective());
    }
}
