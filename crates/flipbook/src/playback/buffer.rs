//! Fixed-capacity blocking FIFO shared between the reader thread and the caller.
//!
//! Two wake-up paths exist besides the obvious space/item ones:
//! - `close()` makes every blocked and future push fail, and pops fail once drained
//! - `reset_with()` drops the contents and bumps the epoch; pushes that were
//!   started against the old epoch fail with [`PushError::Reset`]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Why an item was handed back instead of queued.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The buffer is closed.
    Closed(T),
    /// Non-blocking push on a full buffer.
    Full(T),
    /// The buffer was reset after the push was started.
    Reset(T),
    /// The commit callback declined the item.
    Rejected(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(t)
            | PushError::Full(t)
            | PushError::Reset(t)
            | PushError::Rejected(t) => t,
        }
    }
}

struct Slots<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedBuffer<T> {
    slots: Mutex<Slots<T>>,
    capacity: usize,
    /// Written only while `slots` is locked; read freely.
    epoch: AtomicU64,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BoundedBuffer<T> {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            epoch: AtomicU64::new(0),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Number of resets so far. Capture it before producing an item to make
    /// the later push fail if a reset happened in between.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Insert `item`, blocking while the buffer is full.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let epoch = self.epoch();
        self.push_if(epoch, item, || true)
    }

    /// Insert `item` without blocking.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let epoch = self.epoch();
        self.try_push_if(epoch, item, || true)
    }

    /// Blocking push that only succeeds while the buffer is still at `epoch`.
    ///
    /// Once space is available, `commit` runs under the buffer lock; the item is
    /// queued only if it returns true. Anything `commit` mutates is therefore
    /// ordered with other pushes and with [`reset_with`](Self::reset_with).
    pub fn push_if(
        &self,
        epoch: u64,
        item: T,
        commit: impl FnOnce() -> bool,
    ) -> Result<(), PushError<T>> {
        let mut slots = self.slots.lock();
        loop {
            if slots.closed {
                return Err(PushError::Closed(item));
            }
            if self.epoch.load(Ordering::Acquire) != epoch {
                return Err(PushError::Reset(item));
            }
            if slots.items.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut slots);
        }
        self.commit_locked(&mut slots, item, commit)
    }

    /// Non-blocking variant of [`push_if`](Self::push_if).
    pub fn try_push_if(
        &self,
        epoch: u64,
        item: T,
        commit: impl FnOnce() -> bool,
    ) -> Result<(), PushError<T>> {
        let mut slots = self.slots.lock();
        if slots.closed {
            return Err(PushError::Closed(item));
        }
        if self.epoch.load(Ordering::Acquire) != epoch {
            return Err(PushError::Reset(item));
        }
        if slots.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        self.commit_locked(&mut slots, item, commit)
    }

    fn commit_locked(
        &self,
        slots: &mut Slots<T>,
        item: T,
        commit: impl FnOnce() -> bool,
    ) -> Result<(), PushError<T>> {
        if !commit() {
            return Err(PushError::Rejected(item));
        }
        slots.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, blocking while empty. `None` once closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut slots = self.slots.lock();
        loop {
            if let Some(item) = slots.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if slots.closed {
                return None;
            }
            self.not_empty.wait(&mut slots);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut slots = self.slots.lock();
        let item = slots.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Refuse further pushes and wake every blocked caller.
    pub fn close(&self) {
        self.slots.lock().closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn reopen(&self) {
        self.slots.lock().closed = false;
    }

    /// Drop the contents and start a new epoch, running `f` under the same lock.
    /// Returns how many items were dropped.
    pub fn reset_with(&self, f: impl FnOnce()) -> usize {
        let dropped = {
            let mut slots = self.slots.lock();
            let dropped = slots.items.len();
            slots.items.clear();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            f();
            dropped
        };
        self.not_full.notify_all();
        self.not_empty.notify_all();
        dropped
    }

    pub fn clear(&self) -> usize {
        self.reset_with(|| ())
    }

    /// Run `f` while holding the buffer lock, excluding pushes, pops and resets.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _slots = self.slots.lock();
        f()
    }
}
