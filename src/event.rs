//! Mailbox between the threads that observe the tunnel and the tick thread
//! that acts on it.
//!
//! Producers (relay callbacks, probe completions) only push. The single
//! consumer swaps the whole backlog out under the lock and handles it after
//! releasing it, so a producer never waits on event handling.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `relay` is the generation of the relay connection that reported it.
    ConnectivityChanged { connected: bool, relay: u64 },
    /// `run` identifies the auto-detection run, `index` the probed candidate.
    ProbeResult {
        udp_reachable: bool,
        run: u64,
        index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    /// Monotonic, assigned at push time.
    pub seq: u64,
    pub event: Event,
}

#[derive(Default)]
struct Backlog {
    next_seq: u64,
    events: Vec<QueuedEvent>,
}

#[derive(Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<Backlog>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&self, event: Event) -> u64 {
        let mut guard = self.inner.lock();
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.events.push(QueuedEvent { seq, event });
        seq
    }
    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<QueuedEvent> {
        std::mem::take(&mut self.inner.lock().events)
    }
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
