//! Shared test utilities for the sftp-pool test suite.
//!
//! This module provides:
//! - `MockSessionFactory`, a scriptable [`SessionFactory`] that counts every
//!   create and close and can be told to fail, stall, validate slowly or report sessions dead
//! - Pool construction helpers
//! - Async polling helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use sftp_pool::pool::{PoolConfig, SessionPool};
use sftp_pool::session::{ConnectionParams, SessionError, SessionFactory, SessionResult};

// ============================================================================
// Mock Session
// ============================================================================

/// A fake SFTP session.
///
/// `in_use` lets tests detect a session being handed to two borrowers at once.
#[derive(Debug)]
pub struct MockSession {
    pub serial: u32,
    in_use: AtomicBool,
}

impl MockSession {
    fn new(serial: u32) -> Self {
        Self {
            serial,
            in_use: AtomicBool::new(false),
        }
    }

    /// Mark the session busy. Returns `false` if it already was.
    pub fn enter(&self) -> bool {
        !self.in_use.swap(true, Ordering::SeqCst)
    }

    /// Mark the session free again.
    pub fn exit(&self) {
        self.in_use.store(false, Ordering::SeqCst);
    }

    /// Pretend to stat a remote path.
    pub async fn stat(&self, path: &str) -> SessionResult<u64> {
        tokio::task::yield_now().await;
        match path {
            "/broken" => Err(SessionError::ConnectionClosed),
            "/missing" => Err(SessionError::NoSuchFile(path.to_string())),
            _ => Ok(path.len() as u64),
        }
    }
}

// ============================================================================
// Mock Session Factory
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    next_serial: AtomicU32,
    created: AtomicU32,
    create_calls: AtomicU32,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
    sessions_invalid: AtomicBool,
    close_fails: AtomicBool,
    create_delay: RwLock<Duration>,
    validate_delay: RwLock<Duration>,
    closed: Mutex<Vec<u32>>,
}

/// A mock session factory for testing purposes.
///
/// Cloning shares the underlying counters, so a test can hand one clone to
/// the pool and keep another to inspect.
///
/// # Example
///
/// ```rust,ignore
/// let factory = MockSessionFactory::new();
/// factory.fail_next(1);
///
/// let pool = pool_with(factory.clone(), config).await;
/// assert!(pool.acquire().await.is_err());
/// assert_eq!(factory.create_calls(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockSessionFactory {
    state: Arc<MockState>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` creations.
    pub fn fail_next(&self, n: u32) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every creation until turned off.
    pub fn set_fail_always(&self, fail: bool) {
        self.state.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Make `is_valid` report every session dead.
    pub fn set_sessions_invalid(&self, invalid: bool) {
        self.state.sessions_invalid.store(invalid, Ordering::SeqCst);
    }

    /// Make `close_session` return an error (the close is still recorded).
    pub fn set_close_fails(&self, fails: bool) {
        self.state.close_fails.store(fails, Ordering::SeqCst);
    }

    /// Delay every creation by `delay`.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.state.create_delay.write() = delay;
    }

    /// Delay every `is_valid` check by `delay`.
    pub fn set_validate_delay(&self, delay: Duration) {
        *self.state.validate_delay.write() = delay;
    }

    /// Successful creations
    pub fn created(&self) -> u32 {
        self.state.created.load(Ordering::SeqCst)
    }

    /// All creation attempts, failed ones included
    pub fn create_calls(&self) -> u32 {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    /// Sessions closed so far
    pub fn closed(&self) -> usize {
        self.state.closed.lock().len()
    }

    /// Serials of closed sessions, in close order
    pub fn closed_serials(&self) -> Vec<u32> {
        self.state.closed.lock().clone()
    }

    /// Whether any session was closed more than once
    pub fn has_double_close(&self) -> bool {
        let closed = self.state.closed.lock();
        let unique: HashSet<_> = closed.iter().collect();
        unique.len() != closed.len()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    async fn create_session(&self, _params: &ConnectionParams) -> SessionResult<MockSession> {
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.create_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_always.load(Ordering::SeqCst) {
            return Err(SessionError::ConnectionFailed("host unreachable".to_string()));
        }
        let scripted = self
            .state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scripted.is_ok() {
            return Err(SessionError::AuthenticationFailed("scripted failure".to_string()));
        }

        self.state.created.fetch_add(1, Ordering::SeqCst);
        let serial = self.state.next_serial.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession::new(serial))
    }

    async fn close_session(&self, session: MockSession) -> SessionResult<()> {
        self.state.closed.lock().push(session.serial);
        if self.state.close_fails.load(Ordering::SeqCst) {
            return Err(SessionError::Protocol("disconnect rejected".to_string()));
        }
        Ok(())
    }

    async fn is_valid(&self, _session: &MockSession) -> bool {
        let delay = *self.state.validate_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        !self.state.sessions_invalid.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Pool Helpers
// ============================================================================

/// Connection parameters used by every test pool.
pub fn test_params() -> ConnectionParams {
    ConnectionParams::new("sftp.test.local", "tester")
}

/// Build a pool around `factory`.
pub async fn pool_with(factory: MockSessionFactory, config: PoolConfig) -> SessionPool<MockSessionFactory> {
    SessionPool::new(factory, test_params(), config).await
}

/// Config with the given `max_size` and wait limit in milliseconds
/// (negative means unbounded).
pub fn sized_config(max_size: usize, max_wait_ms: i64) -> PoolConfig {
    let mut builder = PoolConfig::builder();
    builder
        .max_size(max_size)
        .expect("valid max_size")
        .max_wait_time(chrono::Duration::milliseconds(max_wait_ms));
    builder.build()
}

// ============================================================================
// Async Helpers
// ============================================================================

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `fut` with a timeout, panicking with `what` if it does not finish.
pub async fn within<T>(timeout: Duration, what: &str, fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(timeout, fut).await {
        Ok(value) => value,
        Err(_) => panic!("{} did not finish within {:?}", what, timeout),
    }
}
