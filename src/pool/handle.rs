//! Borrowed session handle.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use super::entry::PoolEntry;
use super::PoolInner;
use crate::session::SessionFactory;

const ENTRY_PRESENT: &str = "pooled session used after its terminal action";

/// A session lent out by a [`SessionPool`](super::SessionPool).
///
/// The borrower has exclusive use of the session until the handle is ended by
/// exactly one terminal action:
///
/// - [`release`](Self::release): the session is healthy, return it to the pool
/// - [`discard`](Self::discard): the session is broken, destroy it and free the slot
/// - dropping the handle: same as `release`
///
/// Terminal actions consume the handle, so a session cannot be returned twice.
pub struct PooledSession<F: SessionFactory> {
    entry: Option<PoolEntry<F::Session>>,
    pool: Arc<PoolInner<F>>,
}

impl<F: SessionFactory> PooledSession<F> {
    pub(super) fn new(entry: PoolEntry<F::Session>, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            entry: Some(entry),
            pool,
        }
    }

    fn entry(&self) -> &PoolEntry<F::Session> {
        self.entry.as_ref().expect(ENTRY_PRESENT)
    }

    /// Pool-unique id of the underlying entry
    pub fn id(&self) -> u64 {
        self.entry().id()
    }

    /// How many times the underlying session has been lent out, this loan included
    pub fn borrow_count(&self) -> u64 {
        self.entry().borrow_count()
    }

    /// Time since the underlying session was created
    pub fn age(&self) -> Duration {
        self.entry().age()
    }

    /// Return the session to the pool for reuse.
    pub fn release(mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.return_entry(entry);
        }
    }

    /// Destroy the session because it is no longer usable.
    ///
    /// The pool slot is freed immediately and one waiter is woken, so a
    /// replacement gets created on the next acquire.
    pub async fn discard(mut self, cause: impl fmt::Display + Send) {
        if let Some(entry) = self.entry.take() {
            self.pool.discard_entry(entry, &cause.to_string()).await;
        }
    }
}

impl<F: SessionFactory> Deref for PooledSession<F> {
    type Target = F::Session;

    fn deref(&self) -> &Self::Target {
        self.entry().session()
    }
}

impl<F: SessionFactory> DerefMut for PooledSession<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.entry.as_mut().expect(ENTRY_PRESENT).session_mut()
    }
}

impl<F: SessionFactory> Drop for PooledSession<F> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.return_entry(entry);
        }
    }
}

impl<F: SessionFactory> fmt::Debug for PooledSession<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("pool", &self.pool.key)
            .field("entry", &self.entry.as_ref().map(PoolEntry::id))
            .finish()
    }
}
