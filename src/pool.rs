//! Fixed-size packet allocator (§4.1).
//!
//! A bounded free list guarded by a tiny mutex, so the hot path doesn't hit
//! the global allocator once the pool has warmed up. Grows on underflow,
//! drops excess on release once the free list is already full.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::packet::Packet;

/// Packets idle in the free list beyond this count are simply dropped on
/// release rather than kept around; keeps a burst of churn from pinning
/// memory forever.
const MAX_FREE: usize = 256;

struct Inner {
    free: Vec<Box<Packet>>,
}

/// Thread-safe packet pool. Cheap to clone (it's an `Arc` around a mutex).
#[derive(Clone)]
pub struct PacketPool {
    inner: Arc<Mutex<Inner>>,
}

impl PacketPool {
    pub fn new() -> Self {
        PacketPool {
            inner: Arc::new(Mutex::new(Inner {
                free: Vec::with_capacity(MAX_FREE),
            })),
        }
    }

    /// Reserve a packet, reusing one from the free list if available.
    /// O(1) amortized; allocates only on underflow.
    pub fn reserve(&self) -> Box<Packet> {
        let mut inner = self.inner.lock();
        match inner.free.pop() {
            Some(mut p) => {
                p.reset();
                p
            }
            None => Box::new(Packet::fresh()),
        }
    }

    /// Return a packet to the pool for reuse.
    pub fn release(&self, packet: Box<Packet>) {
        let mut inner = self.inner.lock();
        if inner.free.len() < MAX_FREE {
            inner.free.push(packet);
        }
        // else: let it drop, pool is already saturated.
    }
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_release_round_trips() {
        let pool = PacketPool::new();
        let p = pool.reserve();
        assert_eq!(p.nsamples, 0);
        pool.release(p);
        let p2 = pool.reserve();
        assert_eq!(p2.nsamples, 0);
    }

    #[test]
    fn reset_clears_stale_state() {
        let pool = PacketPool::new();
        let mut p = pool.reserve();
        p.timestamp = 999;
        p.nsamples = 5;
        pool.release(p);

        let p2 = pool.reserve();
        assert_eq!(p2.timestamp, 0);
        assert_eq!(p2.nsamples, 0);
    }

    #[test]
    fn free_list_is_bounded() {
        let pool = PacketPool::new();
        let mut held = Vec::new();
        for _ in 0..(MAX_FREE + 10) {
            held.push(pool.reserve());
        }
        for p in held {
            pool.release(p);
        }
        assert!(pool.inner.lock().free.len() <= MAX_FREE);
    }
}
