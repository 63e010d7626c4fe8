//! Request table shared between submitters, the worker loop and the dispatcher

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of checking a finished download against the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The entry still pointed at the same url and has been removed
    Claimed,
    /// The entry is gone or points at a newer url
    Stale,
    /// The worker has been stopped
    Stopped,
}

#[derive(Debug)]
struct Pending {
    url: String,
    seq: u64,
}

#[derive(Debug)]
struct TableState<K> {
    entries: HashMap<K, Pending>,
    next_seq: u64,
    stopped: bool,
}

/// Key → most recently requested url.
///
/// Every operation takes the lock for a single lookup or mutation, so overwrite, remove and
/// lookup are atomic with respect to each other. Entries are never exposed by reference.
///
/// Each insert stamps its entry with a fresh sequence number. A work signal carries the
/// number it was enqueued with and is only acted on while the entry still has it, which
/// turns signals for overwritten, cancelled or cleared requests into no-ops.
/// The stopped flag lives under the same lock so a delivery check sees both at once.
#[derive(Debug)]
pub struct RequestTable<K> {
    state: Mutex<TableState<K>>,
}

impl<K> Default for RequestTable<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(TableState {
                entries: HashMap::new(),
                next_seq: 0,
                stopped: false,
            }),
        }
    }
}

impl<K> RequestTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every entry, returning how many there were
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        dropped
    }

    /// Permanently mark the table as stopped and drop every entry
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.stopped = true;
        state.entries.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl<K: Eq + Hash> RequestTable<K> {
    /// Insert or overwrite the url for `key`, returning the sequence number of the request.
    ///
    /// Returns `None` once the table has been shut down.
    pub fn insert(&self, key: K, url: String) -> Option<u64> {
        let mut state = self.lock();
        if state.stopped {
            return None;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key, Pending { url, seq });
        Some(seq)
    }

    pub fn remove(&self, key: &K) -> Option<String> {
        self.lock().entries.remove(key).map(|pending| pending.url)
    }

    pub fn get(&self, key: &K) -> Option<String> {
        self.lock().entries.get(key).map(|pending| pending.url.clone())
    }

    /// Url for `key` if request `seq` is still the latest one for it
    pub fn lookup(&self, key: &K, seq: u64) -> Option<String> {
        let state = self.lock();
        if state.stopped {
            return None;
        }
        state
            .entries
            .get(key)
            .filter(|pending| pending.seq == seq)
            .map(|pending| pending.url.clone())
    }

    /// Remove the entry for `key` if it still maps to `url`
    pub fn claim(&self, key: &K, url: &str) -> Claim {
        let mut state = self.lock();
        if state.stopped {
            return Claim::Stopped;
        }
        if state.entries.get(key).is_some_and(|pending| pending.url == url) {
            state.entries.remove(key);
            Claim::Claimed
        } else {
            Claim::Stale
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }
}
