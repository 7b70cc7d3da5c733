//! Session pool.
//!
//! This module provides a bounded, async pool of transport sessions. It supports:
//! - Idle session reuse in preference to creating new sessions
//! - A hard cap on live sessions (borrowed + idle)
//! - Bounded or unbounded waiting when the pool is exhausted
//! - Best-effort pre-warming at construction
//! - Idle eviction, on demand, opportunistically on acquire, or on a timer
//! - Discarding sessions a borrower found broken
//! - Idempotent shutdown that wakes every waiter
//!
//! Capacity is tracked with a fair [`Semaphore`] holding one permit per
//! lendable slot. A borrower keeps its permit for the lifetime of its
//! [`PooledSession`]; releasing or discarding gives the permit back, which hands
//! the slot to the longest-waiting acquirer. Closing the pool closes the
//! semaphore, failing every waiter with [`PoolError::Closed`].

pub mod config;
pub mod entry;
pub mod handle;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::session::{ConnectionParams, SessionError, SessionFactory, SessionResult};

pub use config::{PoolConfig, PoolConfigBuilder, DEFAULT_MAX_SIZE};
pub use entry::{EntryState, PoolEntry};
pub use handle::PooledSession;

/// Errors reported by pool operations.
///
/// The pool never retries on its own; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The configuration was rejected.
    #[error("Invalid pool configuration: {0}")]
    Configuration(String),

    /// The pool has been closed.
    #[error("Session pool is closed")]
    Closed,

    /// The factory could not create a session.
    #[error("Session factory failed: {0}")]
    FactoryFailed(#[source] SessionError),

    /// Waited `max_wait_time` on an exhausted pool without getting a session.
    #[error("Timed out after {waited:?} waiting for an idle session")]
    WaitTimeoutExpired {
        /// The wait limit that elapsed
        waited: Duration,
    },

    /// Every slot is borrowed and the caller asked not to wait.
    #[error("All {max_size} sessions are borrowed")]
    Exhausted {
        /// Configured maximum pool size
        max_size: usize,
    },
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Outcome of the construction-time warm-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupResult {
    /// Sessions created and parked in the idle queue
    pub created: usize,
    /// Factory calls that failed
    pub failed: usize,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live sessions (idle + borrowed + being created)
    pub live: usize,
    /// Sessions in the idle queue
    pub idle: usize,
    /// Live sessions not in the idle queue
    pub borrowed: usize,
    /// Callers currently blocked in `acquire`
    pub waiting: usize,
    /// Sessions ever created by the factory
    pub created: u64,
    /// Acquisitions served from the idle queue
    pub reused: u64,
    /// Sessions destroyed for any reason
    pub destroyed: u64,
    /// Sessions destroyed by idle eviction
    pub evicted: u64,
    /// Sessions destroyed because a borrower discarded them
    pub discarded: u64,
    /// Failed factory calls during `acquire`
    pub factory_failures: u64,
    /// Acquisitions that hit `max_wait_time`
    pub timeouts: u64,
    /// Warm-up outcome
    pub warmup: WarmupResult,
}

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    reused: u64,
    destroyed: u64,
    evicted: u64,
    discarded: u64,
    factory_failures: u64,
    timeouts: u64,
    warmup: WarmupResult,
}

struct PoolState<S> {
    idle: VecDeque<PoolEntry<S>>,
    /// Idle + borrowed + reserved for an in-flight factory call
    live: usize,
    closed: bool,
    counters: Counters,
}

impl<S> PoolState<S> {
    /// Remove idle entries that outlived `max_idle_time`.
    fn take_expired(&mut self, config: &PoolConfig) -> Vec<PoolEntry<S>> {
        if config.max_idle_time().is_none() || self.idle.is_empty() {
            return Vec::new();
        }

        let (expired, kept): (Vec<_>, Vec<_>) = self
            .idle
            .drain(..)
            .partition(|entry| config.is_idle_expired(entry.idle_for()));
        self.idle = kept.into();

        let count = expired.len();
        self.live -= count;
        self.counters.evicted += count as u64;
        self.counters.destroyed += count as u64;
        expired
    }
}

/// Decrements the waiter gauge even if the waiting future is dropped.
struct WaitGuard<'a>(&'a AtomicUsize);

impl<'a> WaitGuard<'a> {
    fn enter(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self(waiting)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What an in-flight checkout holds on top of its permit.
enum Slot<S> {
    Empty,
    /// `live` was bumped for a session the factory has not produced yet
    Reserved,
    /// Popped from the idle queue and waiting on `is_valid`
    Validating(PoolEntry<S>),
}

/// A capacity permit plus the slot it claims while `acquire` is in flight.
///
/// If the acquire future is dropped before [`lend`](Self::lend), the slot is
/// handed back: a reservation is removed from `live`, and a popped idle entry
/// goes back to the front of the queue (or is closed if the pool closed in
/// the meantime). The permit is released only after that.
struct Checkout<'a, F: SessionFactory> {
    inner: &'a Arc<PoolInner<F>>,
    permit: Option<SemaphorePermit<'a>>,
    slot: Slot<F::Session>,
}

impl<'a, F: SessionFactory> Checkout<'a, F> {
    fn new(inner: &'a Arc<PoolInner<F>>, permit: SemaphorePermit<'a>) -> Self {
        Self {
            inner,
            permit: Some(permit),
            slot: Slot::Empty,
        }
    }

    fn entry(&self) -> Option<&PoolEntry<F::Session>> {
        match &self.slot {
            Slot::Validating(entry) => Some(entry),
            _ => None,
        }
    }

    fn take_entry(&mut self) -> Option<PoolEntry<F::Session>> {
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Validating(entry) => Some(entry),
            other => {
                self.slot = other;
                None
            }
        }
    }

    /// Hand `entry` to the caller, keeping the permit for the borrow.
    fn lend(mut self, mut entry: PoolEntry<F::Session>) -> PooledSession<F> {
        self.slot = Slot::Empty;
        if let Some(permit) = self.permit.take() {
            permit.forget();
        }
        entry.mark_borrowed();
        PooledSession::new(entry, Arc::clone(self.inner))
    }
}

impl<F: SessionFactory> Drop for Checkout<'_, F> {
    fn drop(&mut self) {
        let inner = self.inner;
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Empty => {}
            Slot::Reserved => {
                inner.state.lock().live -= 1;
                trace!(pool = %inner.key, "Acquire abandoned, reserved slot returned");
            }
            Slot::Validating(entry) => {
                let orphan = {
                    let mut state = inner.state.lock();
                    if state.closed {
                        state.live -= 1;
                        state.counters.destroyed += 1;
                        Some(entry)
                    } else {
                        trace!(pool = %inner.key, entry = entry.id(), "Acquire abandoned, session requeued");
                        state.idle.push_front(entry);
                        None
                    }
                };
                if let Some(entry) = orphan {
                    inner.spawn_close(entry);
                }
            }
        }
    }
}

pub(crate) struct PoolInner<F: SessionFactory> {
    id: Uuid,
    key: String,
    factory: F,
    params: ConnectionParams,
    config: PoolConfig,
    state: Mutex<PoolState<F::Session>>,
    permits: Semaphore,
    next_entry_id: AtomicU64,
    waiting: AtomicUsize,
}

impl<F: SessionFactory> PoolInner<F> {
    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn next_entry_id(&self) -> u64 {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Close a session that is no longer tracked by the pool.
    async fn close_entry(&self, entry: PoolEntry<F::Session>) {
        let id = entry.id();
        if let Err(e) = self.factory.close_session(entry.into_session()).await {
            warn!(pool = %self.key, entry = id, error = %e, "Error closing session");
        } else {
            trace!(pool = %self.key, entry = id, "Session closed");
        }
    }

    async fn close_entries(&self, entries: Vec<PoolEntry<F::Session>>) {
        for entry in entries {
            self.close_entry(entry).await;
        }
    }

    /// Put a borrowed entry back in the idle queue and hand its slot on.
    pub(crate) fn return_entry(self: &Arc<Self>, mut entry: PoolEntry<F::Session>) {
        let orphan = {
            let mut state = self.state.lock();
            if state.closed {
                state.live -= 1;
                state.counters.destroyed += 1;
                Some(entry)
            } else {
                entry.mark_idle();
                trace!(pool = %self.key, entry = entry.id(), "Session released back to pool");
                state.idle.push_back(entry);
                None
            }
        };

        match orphan {
            None => self.permits.add_permits(1),
            Some(entry) => {
                debug!(pool = %self.key, entry = entry.id(), "Session released after close, destroying");
                self.spawn_close(entry);
            }
        }
    }

    /// Close an untracked entry from synchronous code.
    fn spawn_close(self: &Arc<Self>, entry: PoolEntry<F::Session>) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(self);
                runtime.spawn(async move { pool.close_entry(entry).await });
            }
            Err(_) => {
                warn!(pool = %self.key, entry = entry.id(), "No runtime to close session on, dropping it");
            }
        }
    }

    /// Permanently remove a borrowed entry and free its slot.
    pub(crate) async fn discard_entry(&self, entry: PoolEntry<F::Session>, cause: &str) {
        let closed = {
            let mut state = self.state.lock();
            state.live -= 1;
            state.counters.discarded += 1;
            state.counters.destroyed += 1;
            state.closed
        };
        if !closed {
            self.permits.add_permits(1);
        }

        warn!(pool = %self.key, entry = entry.id(), cause = %cause, "Discarding defective session");
        self.close_entry(entry).await;
    }

    async fn evict_idle(&self) -> usize {
        let expired = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.take_expired(&self.config)
        };

        let count = expired.len();
        if count > 0 {
            debug!(pool = %self.key, count = count, "Evicting idle sessions");
            self.close_entries(expired).await;
        }
        count
    }
}

/// A bounded pool of reusable sessions created by a [`SessionFactory`].
///
/// Cloning a `SessionPool` is cheap and yields another handle to the same pool.
///
/// # Example
///
/// ```rust,ignore
/// use sftp_pool::prelude::*;
///
/// let mut config = PoolConfig::builder();
/// config.max_size(3)?.max_wait_time(chrono::Duration::seconds(5));
///
/// let pool = SessionPool::new(factory, "sftp://deploy@files.internal".parse()?, config.build()).await;
///
/// let session = pool.acquire().await?;
/// let outcome = session.stat("/srv/data").await;
/// match outcome {
///     Ok(_) => session.release(),
///     Err(e) if e.is_defective() => session.discard(&e).await,
///     Err(_) => session.release(),
/// }
///
/// pool.close().await;
/// ```
pub struct SessionPool<F: SessionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: SessionFactory> Clone for SessionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SessionFactory> fmt::Debug for SessionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: SessionFactory> SessionPool<F> {
    /// Create a pool and pre-warm `config.initial_size()` sessions.
    ///
    /// Warm-up is best-effort: factory failures are logged and leave the pool
    /// under-provisioned, they never fail construction.
    pub async fn new(factory: F, params: ConnectionParams, config: PoolConfig) -> Self {
        let key = params.pool_key();
        debug!(
            pool = %key,
            initial_size = config.initial_size(),
            max_size = config.max_size(),
            max_wait_time = ?config.max_wait_time(),
            max_idle_time = ?config.max_idle_time(),
            "Creating new SessionPool"
        );

        let pool = Self {
            inner: Arc::new(PoolInner {
                id: Uuid::new_v4(),
                key,
                factory,
                params,
                permits: Semaphore::new(config.max_size()),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.max_size()),
                    live: 0,
                    closed: false,
                    counters: Counters::default(),
                }),
                config,
                next_entry_id: AtomicU64::new(1),
                waiting: AtomicUsize::new(0),
            }),
        };

        let initial_size = pool.inner.config.initial_size();
        if initial_size > 0 {
            pool.warm_up(initial_size).await;
        }
        pool
    }

    async fn warm_up(&self, count: usize) -> WarmupResult {
        let inner = &self.inner;
        info!(pool = %inner.key, count = count, "Pre-warming sessions");

        let attempts = (0..count).map(|_| inner.factory.create_session(&inner.params));
        let mut result = WarmupResult::default();

        for outcome in join_all(attempts).await {
            match outcome {
                Ok(session) => {
                    let entry = PoolEntry::new(inner.next_entry_id(), session);
                    let mut state = inner.state.lock();
                    state.idle.push_back(entry);
                    state.live += 1;
                    state.counters.created += 1;
                    result.created += 1;
                }
                Err(e) => {
                    warn!(pool = %inner.key, error = %e, "Pre-warm session failed");
                    result.failed += 1;
                }
            }
        }

        inner.state.lock().counters.warmup = result;
        info!(pool = %inner.key, created = result.created, failed = result.failed, "Pre-warming complete");
        result
    }

    /// The pool's configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Parameters passed to the factory
    pub fn params(&self) -> &ConnectionParams {
        &self.inner.params
    }

    /// Unique id of this pool, used in log fields
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Borrow a session, waiting at most the configured `max_wait_time`.
    pub async fn acquire(&self) -> PoolResult<PooledSession<F>> {
        self.acquire_timeout(self.inner.config.max_wait_time()).await
    }

    /// Borrow a session, waiting at most `wait` (`None` waits forever) if the
    /// pool is exhausted.
    ///
    /// The limit bounds only the wait for a free slot, not the factory call
    /// that may follow it.
    pub async fn acquire_timeout(&self, wait: Option<Duration>) -> PoolResult<PooledSession<F>> {
        let permit = self.wait_for_permit(wait).await?;
        self.checkout(permit).await
    }

    /// Borrow a session only if a slot is free right now.
    pub async fn try_acquire(&self) -> PoolResult<PooledSession<F>> {
        let permit = match self.inner.permits.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {
                return Err(PoolError::Exhausted {
                    max_size: self.inner.config.max_size(),
                })
            }
        };
        self.checkout(permit).await
    }

    async fn wait_for_permit(&self, wait: Option<Duration>) -> PoolResult<SemaphorePermit<'_>> {
        let inner = &self.inner;
        match inner.permits.try_acquire() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        trace!(pool = %inner.key, wait = ?wait, "Pool exhausted, waiting for a session");
        let _waiting = WaitGuard::enter(&inner.waiting);

        match wait {
            None => inner.permits.acquire().await.map_err(|_| PoolError::Closed),
            Some(limit) => match tokio::time::timeout(limit, inner.permits.acquire()).await {
                Ok(permit) => permit.map_err(|_| PoolError::Closed),
                Err(_) => {
                    inner.state.lock().counters.timeouts += 1;
                    debug!(pool = %inner.key, waited = ?limit, "Timed out waiting for a session");
                    Err(PoolError::WaitTimeoutExpired { waited: limit })
                }
            },
        }
    }

    /// Turn a capacity permit into a borrowed session: reuse an idle entry if
    /// one is valid, otherwise create a new one.
    async fn checkout<'a>(&'a self, permit: SemaphorePermit<'a>) -> PoolResult<PooledSession<F>> {
        let inner = &self.inner;
        let mut checkout = Checkout::new(inner, permit);

        loop {
            let expired = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                let expired = state.take_expired(&inner.config);
                match state.idle.pop_front() {
                    Some(entry) => checkout.slot = Slot::Validating(entry),
                    None => {
                        debug_assert!(state.live < inner.config.max_size());
                        state.live += 1;
                        checkout.slot = Slot::Reserved;
                    }
                }
                expired
            };

            if !expired.is_empty() {
                debug!(pool = %inner.key, count = expired.len(), "Evicting idle sessions");
                inner.close_entries(expired).await;
            }

            if checkout.entry().is_none() {
                return self.create(checkout).await;
            }
            let valid = match checkout.entry() {
                Some(candidate) => inner.factory.is_valid(candidate.session()).await,
                None => continue,
            };

            let Some(entry) = checkout.take_entry() else {
                continue;
            };
            let closed = {
                let mut state = inner.state.lock();
                // close() may have run while the session was being validated
                if !valid || state.closed {
                    state.live -= 1;
                    state.counters.destroyed += 1;
                } else {
                    state.counters.reused += 1;
                }
                state.closed
            };

            if closed {
                debug!(pool = %inner.key, entry = entry.id(), "Pool closed during validation, destroying session");
                inner.close_entry(entry).await;
                return Err(PoolError::Closed);
            }
            if valid {
                debug!(pool = %inner.key, entry = entry.id(), "Reusing idle session");
                return Ok(checkout.lend(entry));
            }

            warn!(pool = %inner.key, entry = entry.id(), "Idle session failed validation, destroying");
            inner.close_entry(entry).await;
        }
    }

    /// Create a session into the slot `checkout` has reserved in `live`.
    async fn create(&self, mut checkout: Checkout<'_, F>) -> PoolResult<PooledSession<F>> {
        let inner = &self.inner;
        debug!(pool = %inner.key, "Creating new session");

        let session = match inner.factory.create_session(&inner.params).await {
            Ok(session) => session,
            Err(e) => {
                inner.state.lock().counters.factory_failures += 1;
                warn!(pool = %inner.key, error = %e, "Session factory failed");
                // dropping `checkout` frees the reservation
                return Err(PoolError::FactoryFailed(e));
            }
        };

        let entry = PoolEntry::new(inner.next_entry_id(), session);
        let closed = {
            let mut state = inner.state.lock();
            state.counters.created += 1;
            if state.closed {
                state.live -= 1;
                state.counters.destroyed += 1;
                checkout.slot = Slot::Empty;
            }
            state.closed
        };

        if closed {
            inner.close_entry(entry).await;
            return Err(PoolError::Closed);
        }

        info!(pool = %inner.key, entry = entry.id(), "Created new session");
        Ok(checkout.lend(entry))
    }

    /// Run `op` with a borrowed session.
    ///
    /// The session is released when `op` succeeds or fails with an
    /// operation-level error, and discarded when `op` reports a defective
    /// session (see [`SessionError::is_defective`]).
    pub async fn with_session<T, Op>(&self, op: Op) -> crate::error::Result<T>
    where
        Op: for<'s> FnOnce(&'s F::Session) -> BoxFuture<'s, SessionResult<T>>,
    {
        let session = self.acquire().await?;
        let outcome = op(&*session).await;

        match outcome {
            Ok(value) => {
                session.release();
                Ok(value)
            }
            Err(e) if e.is_defective() => {
                session.discard(&e).await;
                Err(e.into())
            }
            Err(e) => {
                session.release();
                Err(e.into())
            }
        }
    }

    /// Destroy idle sessions that outlived `max_idle_time`. Borrowed sessions
    /// are never touched. Returns the number of sessions destroyed.
    pub async fn evict_idle(&self) -> usize {
        self.inner.evict_idle().await
    }

    /// Spawn a task running [`evict_idle`](Self::evict_idle) every `period`
    /// until the pool is closed or dropped.
    pub fn start_maintenance(&self, period: Duration) -> JoinHandle<()> {
        let pool: Weak<PoolInner<F>> = Arc::downgrade(&self.inner);
        let period = period.max(Duration::from_millis(1));
        debug!(pool = %self.inner.key, period = ?period, "Starting pool maintenance");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(inner) = pool.upgrade() else {
                    break;
                };
                if inner.is_closed() {
                    break;
                }
                inner.evict_idle().await;
            }
        })
    }

    /// Close the pool.
    ///
    /// Every session the pool owns is destroyed. Idle sessions are closed
    /// now. A borrowed session is owned by its [`PooledSession`] until then,
    /// so it is closed when that handle is released, discarded or dropped,
    /// never put back in the idle queue. Every blocked `acquire` fails with
    /// [`PoolError::Closed`], as does every later one. Calling `close` again
    /// is a no-op.
    pub async fn close(&self) {
        let inner = &self.inner;
        let (drained, borrowed) = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.live -= drained.len();
            state.counters.destroyed += drained.len() as u64;
            (drained, state.live)
        };
        inner.permits.close();

        info!(pool = %inner.key, idle = drained.len(), borrowed = borrowed, "Closing session pool");
        inner.close_entries(drained).await;
    }

    /// Get current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let c = &state.counters;
        PoolStats {
            live: state.live,
            idle: state.idle.len(),
            borrowed: state.live - state.idle.len(),
            waiting: self.inner.waiting.load(Ordering::SeqCst),
            created: c.created,
            reused: c.reused,
            destroyed: c.destroyed,
            evicted: c.evicted,
            discarded: c.discarded,
            factory_failures: c.factory_failures,
            timeouts: c.timeouts,
            warmup: c.warmup,
        }
    }
}
