//! The queue thread (§4.3): drains the intake list into the ordered heap.
//!
//! Deliberately the simplest of the long-lived threads: pop with a timeout
//! (so it notices shutdown promptly), insert, repeat. All the ordering and
//! accounting work lives in [`crate::playout::PlayoutCore::insert`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::intake::IntakeList;
use crate::playout::PlayoutCore;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct Queue {
    intake: IntakeList,
    playout: Arc<PlayoutCore>,
    running: Arc<AtomicBool>,
}

impl Queue {
    pub fn new(intake: IntakeList, playout: Arc<PlayoutCore>, running: Arc<AtomicBool>) -> Self {
        Queue {
            intake,
            playout,
            running,
        }
    }

    /// Runs until `running` is cleared.
    pub fn run(self) {
        while self.running.load(Ordering::Relaxed) {
            if let Some(packet) = self.intake.pop_timeout(POLL_INTERVAL) {
                self.playout.insert(packet);
            }
        }
    }
}
