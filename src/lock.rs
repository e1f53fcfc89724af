//! Reentrant read / exclusive write lock
//!
//! Storage models hold this lock for the whole lifetime of every iterator
//! they hand out. A single thread may take the read side any number of times
//! (a decorator re-querying its parent while an outer iterator is still open
//! does exactly that), but only one thread reads at a time and a writer
//! excludes everybody.
//!
//! State machine:
//!
//! ```text
//! Free --read(T)--> Read(T, 1) --read(T)--> Read(T, n + 1)
//! Read(T, n + 1) --unlock--> Read(T, n)      Read(T, 1) --unlock--> Free
//! Free --write--> Write --unlock--> Free
//! ```
//!
//! Requests that cannot be granted block until the lock frees up; they never
//! fail. Upgrading a held read lock to a write lock on the same thread is not
//! supported and blocks forever.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Free,
    Read { thread: ThreadId, count: usize },
    Write,
}

/// Lock with reentrant reads for the holding thread and exclusive writes
#[derive(Debug)]
pub struct ReentrantReadExclusiveWriteLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ReentrantReadExclusiveWriteLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::Free),
            released: Condvar::new(),
        }
    }

    /// Acquire one unit of the read side, blocking while another thread
    /// reads or any thread writes.
    pub fn lock_for_read(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match *state {
                LockState::Free => {
                    *state = LockState::Read { thread: me, count: 1 };
                    trace!("read lock acquired");
                    return;
                }
                LockState::Read { thread, count } if thread == me => {
                    *state = LockState::Read { thread, count: count + 1 };
                    trace!(depth = count + 1, "read lock re-entered");
                    return;
                }
                _ => self.released.wait(&mut state),
            }
        }
    }

    /// Acquire the write side, blocking while any read or write is held.
    ///
    /// Upgrading is not supported: a thread that still holds reads blocks
    /// here forever.
    pub fn lock_for_write(&self) {
        let mut state = self.state.lock();
        while *state != LockState::Free {
            self.released.wait(&mut state);
        }
        *state = LockState::Write;
        trace!("write lock acquired");
    }

    /// Release one unit: one reentrant read level, or the write lock.
    ///
    /// The unit is released regardless of the calling thread, so an iterator
    /// dropped on another thread still gives its lock back.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        match *state {
            LockState::Read { thread, count } if count > 1 => {
                *state = LockState::Read { thread, count: count - 1 };
            }
            LockState::Read { .. } | LockState::Write => {
                *state = LockState::Free;
                trace!("lock released");
                self.released.notify_all();
            }
            LockState::Free => warn!("unlock called on a lock that is not held"),
        }
    }

    /// Scoped read lock
    pub fn read(&self) -> ReadLocker<'_> {
        self.lock_for_read();
        ReadLocker { lock: self }
    }

    /// Scoped write lock
    pub fn write(&self) -> WriteLocker<'_> {
        self.lock_for_write();
        WriteLocker { lock: self }
    }

    pub fn is_locked(&self) -> bool {
        *self.state.lock() != LockState::Free
    }

    pub fn is_write_locked(&self) -> bool {
        *self.state.lock() == LockState::Write
    }

    /// Reentrant depth held by the current reader, 0 when not read-locked.
    pub fn read_depth(&self) -> usize {
        match *self.state.lock() {
            LockState::Read { count, .. } => count,
            _ => 0,
        }
    }
}

impl Default for ReentrantReadExclusiveWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one read unit on drop
#[must_use = "the read lock is released as soon as the locker is dropped"]
pub struct ReadLocker<'a> {
    lock: &'a ReentrantReadExclusiveWriteLock,
}

impl Drop for ReadLocker<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Releases the write lock on drop
#[must_use = "the write lock is released as soon as the locker is dropped"]
pub struct WriteLocker<'a> {
    lock: &'a ReentrantReadExclusiveWriteLock,
}

impl Drop for WriteLocker<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_reentrant_read_counts_down() {
        let lock = ReentrantReadExclusiveWriteLock::new();
        lock.lock_for_read();
        lock.lock_for_read();
        lock.lock_for_read();
        assert_eq!(lock.read_depth(), 3);
        lock.unlock();
        lock.unlock();
        assert!(lock.is_locked());
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_scoped_lockers() {
        let lock = ReentrantReadExclusiveWriteLock::new();
        {
            let _outer = lock.read();
            let _inner = lock.read();
            assert_eq!(lock.read_depth(), 2);
        }
        assert!(!lock.is_locked());
        {
            let _w = lock.write();
            assert!(lock.is_write_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_second_reader_waits_for_first() {
        let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
        lock.lock_for_read();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            other.lock_for_read();
            tx.send(()).ok();
            other.unlock();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        lock.unlock();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        handle.join().ok();
    }

    #[test]
    fn test_unlock_from_other_thread_releases() {
        let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
        lock.lock_for_read();
        let other = Arc::clone(&lock);
        thread::spawn(move || other.unlock()).join().ok();
        assert!(!lock.is_locked());
    }
}
