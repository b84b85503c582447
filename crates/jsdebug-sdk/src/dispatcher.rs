//! Correlation of outstanding commands with their replies.
//!
//! Every command gets a sequence number from a [`SeqAllocator`] shared by
//! the session handle and its connection task. The connection task keeps a
//! [`PendingTable`] keyed by that number and resolves entries as replies
//! arrive, in whatever order the VM sends them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic sequence-number source. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SeqAllocator {
    next: Arc<AtomicU64>,
}

impl SeqAllocator {
    /// Start numbering at 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Take the next sequence number.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SeqAllocator {
    fn default() -> Self {
        Self::new()
    }
}

struct Pending<E> {
    command: &'static str,
    sent_at: Instant,
    entry: E,
}

/// Outstanding commands awaiting a reply.
///
/// `E` is whatever the session needs to finish the command once the reply
/// is in: typically a reply sender plus some bookkeeping.
pub struct PendingTable<E> {
    pending: BTreeMap<u64, Pending<E>>,
}

impl<E> PendingTable<E> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    /// Record a command that has been written to the wire.
    pub fn register(&mut self, seq: u64, command: &'static str, entry: E) {
        self.pending.insert(
            seq,
            Pending {
                command,
                sent_at: Instant::now(),
                entry,
            },
        );
    }

    /// Take the entry a reply with `seq` belongs to.
    ///
    /// Unknown sequence numbers are logged and ignored.
    pub fn resolve(&mut self, seq: u64) -> Option<E> {
        match self.pending.remove(&seq) {
            Some(pending) => {
                tracing::debug!(
                    seq,
                    command = pending.command,
                    elapsed_ms = pending.sent_at.elapsed().as_millis() as u64,
                    "reply received"
                );
                Some(pending.entry)
            }
            None => {
                tracing::warn!("received response for unknown request seq: {}", seq);
                None
            }
        }
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> Vec<(u64, E)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(seq, p)| (seq, p.entry))
            .collect()
    }

    /// How many commands are outstanding.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for PendingTable<E> {
    fn default() -> Self {
        Self::new()
    }
}
