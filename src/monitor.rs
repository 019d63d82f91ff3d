//! `--monitor` support (§6): once-a-minute log line reporting how far above
//! or below the low water-mark the buffer currently sits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::playout::PlayoutCore;

const INTERVAL: Duration = Duration::from_secs(60);
const SAMPLE_RATE: f64 = 44100.0;
const CHANNELS: f64 = 2.0;
const BYTES_PER_SAMPLE: usize = 2;

pub struct Monitor {
    playout: Arc<PlayoutCore>,
    running: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(playout: Arc<PlayoutCore>, running: Arc<AtomicBool>) -> Self {
        Monitor { playout, running }
    }

    /// Runs until `running` is cleared, sleeping in short slices so shutdown
    /// is noticed promptly rather than after a full minute.
    pub fn run(self) {
        let mut elapsed = Duration::ZERO;
        let slice = Duration::from_millis(500);
        while self.running.load(Ordering::Relaxed) {
            std::thread::sleep(slice);
            elapsed += slice;
            if elapsed >= INTERVAL {
                elapsed = Duration::ZERO;
                self.report();
            }
        }
    }

    fn report(&self) {
        let total = self.playout.nsamples_total() as i64;
        let min = self.playout.minbuffer() as i64;
        let delta = total - min;
        // delta is in mono-sample units (2 per stereo frame), so time elapsed
        // divides by rate*channels, not rate alone.
        let seconds = delta as f64 / (SAMPLE_RATE * CHANNELS);
        let bytes = delta * BYTES_PER_SAMPLE as i64;
        log::info!("buffer: {delta} samples ({seconds:.3}s, {bytes} bytes) above minbuffer");
    }
}
