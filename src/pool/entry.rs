//! Pool entry bookkeeping.

use std::time::{Duration, Instant};

/// Lifecycle state of a pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Sitting in the idle queue, available for lending
    Idle,
    /// Lent to exactly one borrower
    Borrowed,
}

/// One session plus the bookkeeping the pool needs to manage it.
///
/// Entries are owned by the pool while idle and moved into a
/// [`PooledSession`](super::PooledSession) while borrowed, so a session can
/// never be reachable from two borrowers at once.
#[derive(Debug)]
pub struct PoolEntry<S> {
    id: u64,
    session: S,
    state: EntryState,
    created_at: Instant,
    last_released_at: Instant,
    borrow_count: u64,
}

impl<S> PoolEntry<S> {
    pub(crate) fn new(id: u64, session: S) -> Self {
        let now = Instant::now();
        Self {
            id,
            session,
            state: EntryState::Idle,
            created_at: now,
            last_released_at: now,
            borrow_count: 0,
        }
    }

    /// Pool-unique identifier of this entry
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// How many times this entry has been lent out
    pub fn borrow_count(&self) -> u64 {
        self.borrow_count
    }

    /// Time since the session was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the entry was last returned to the pool
    pub fn idle_for(&self) -> Duration {
        self.last_released_at.elapsed()
    }

    pub(crate) fn session(&self) -> &S {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub(crate) fn into_session(self) -> S {
        self.session
    }

    pub(crate) fn mark_borrowed(&mut self) {
        debug_assert_eq!(self.state, EntryState::Idle, "entry {} lent twice", self.id);
        self.state = EntryState::Borrowed;
        self.borrow_count += 1;
    }

    pub(crate) fn mark_idle(&mut self) {
        debug_assert_eq!(self.state, EntryState::Borrowed, "entry {} returned twice", self.id);
        self.state = EntryState::Idle;
        self.last_released_at = Instant::now();
    }
}
