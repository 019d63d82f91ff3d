//! The intake list: a thin hand-off between the receiver thread and the
//! queue thread (§3, §4.3). Deliberately holds the intake lock for as
//! little time as possible on both ends so the receiver never serializes
//! against the audio callback through this path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::packet::Packet;

struct Inner {
    list: VecDeque<Box<Packet>>,
}

/// FIFO intake list, producer (receiver) / consumer (queue thread) pair.
#[derive(Clone)]
pub struct IntakeList {
    inner: Arc<Mutex<Inner>>,
    cond: Arc<Condvar>,
}

impl IntakeList {
    pub fn new() -> Self {
        IntakeList {
            inner: Arc::new(Mutex::new(Inner {
                list: VecDeque::new(),
            })),
            cond: Arc::new(Condvar::new()),
        }
    }

    /// Append a packet and signal the intake condition. Called by the
    /// receiver; holds the lock only for the append itself.
    pub fn push(&self, packet: Box<Packet>) {
        let mut inner = self.inner.lock();
        inner.list.push_back(packet);
        self.cond.notify_one();
    }

    /// Current length. A racy hint when read outside the lock that protects
    /// the list; only used for logging/monitoring here.
    pub fn len_hint(&self) -> usize {
        self.inner.lock().list.len()
    }

    /// Block until the list is non-empty, then splice off the head packet.
    /// Called by the queue thread.
    pub fn pop_blocking(&self) -> Box<Packet> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(p) = inner.list.pop_front() {
                return p;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Like [`Self::pop_blocking`] but gives up after `timeout`, so the
    /// queue thread can periodically check a shutdown flag.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Box<Packet>> {
        let mut inner = self.inner.lock();
        if let Some(p) = inner.list.pop_front() {
            return Some(p);
        }
        let result = self.cond.wait_for(&mut inner, timeout);
        if result.timed_out() {
            return None;
        }
        inner.list.pop_front()
    }
}

impl Default for IntakeList {
    fn default() -> Self {
        Self::new()
    }
}
