//! A backend that drives the callback at the nominal sample rate and
//! discards whatever it produces. Used by default and by tests so the
//! crate is exercisable without a host audio stack (§4.7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{AudioBackend, AudioCallback};
use crate::error::Result;

/// Samples pulled per callback invocation when driving at the nominal rate.
const CHUNK_SAMPLES: usize = 882; // 10ms at 44100 Hz stereo (441*2)

pub struct NullBackend {
    sample_rate: u32,
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    volume: Arc<Mutex<(u8, u8)>>,
}

impl NullBackend {
    pub fn new() -> Self {
        NullBackend {
            sample_rate: 44100,
            running: Arc::new(AtomicBool::new(false)),
            playing: Arc::new(AtomicBool::new(false)),
            thread: None,
            volume: Arc::new(Mutex::new((100, 100))),
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn configure(&mut self, _device: Option<&str>, sample_rate: u32, _channels: u16) -> Result<()> {
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn start(&mut self, callback: AudioCallback) -> Result<()> {
        self.running.store(true, Ordering::Relaxed);
        let running = self.running.clone();
        let playing = self.playing.clone();
        let sample_rate = self.sample_rate.max(1);
        let pace = Duration::from_millis((CHUNK_SAMPLES as u64 * 1000) / (2 * sample_rate as u64));

        self.thread = Some(thread::spawn(move || {
            let mut buf = vec![0i16; CHUNK_SAMPLES];
            while running.load(Ordering::Relaxed) {
                if playing.load(Ordering::Relaxed) {
                    callback(&mut buf);
                }
                thread::sleep(pace);
            }
        }));
        Ok(())
    }

    fn activate(&mut self) -> Result<()> {
        self.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.playing.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn get_volume(&self) -> Option<(u8, u8)> {
        Some(*self.volume.lock())
    }

    fn set_volume(&mut self, left: u8, right: u8) -> Result<(u8, u8)> {
        let clamped = (left.min(100), right.min(100));
        *self.volume.lock() = clamped;
        Ok(clamped)
    }
}

impl Drop for NullBackend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn drives_callback_only_while_activated() {
        let mut backend = NullBackend::new();
        backend.configure(None, 44100, 2).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let cb: AudioCallback = Arc::new(move |buf: &mut [i16]| {
            counted.fetch_add(1, Ordering::Relaxed);
            buf.fill(0);
            buf.len()
        });
        backend.start(cb).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::Relaxed), 0, "should not call back before activate");

        backend.activate().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(calls.load(Ordering::Relaxed) > 0, "should call back once activated");

        backend.deactivate().unwrap();
    }

    #[test]
    fn volume_round_trips_and_clamps() {
        let mut backend = NullBackend::new();
        assert_eq!(backend.set_volume(150, 50).unwrap(), (100, 50));
        assert_eq!(backend.get_volume(), Some((100, 50)));
    }
}
