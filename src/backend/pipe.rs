//! Grounded in the original's `-e`/`--command` option: spawns a child
//! process and writes produced PCM to its stdin on a driving thread. Gives
//! the crate a genuinely runnable audio path without a platform audio crate
//! (§4.7), e.g. `--api pipe --command 'aplay -f S16_LE -r 44100 -c 2'`.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{AudioBackend, AudioCallback};
use crate::error::{PlayerError, Result};

const CHUNK_SAMPLES: usize = 882; // 10ms at 44100 Hz stereo

pub struct PipeBackend {
    command: String,
    sample_rate: u32,
    child: Option<Child>,
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    volume: Arc<Mutex<(u8, u8)>>,
}

impl PipeBackend {
    pub fn new(command: String) -> Self {
        PipeBackend {
            command,
            sample_rate: 44100,
            child: None,
            running: Arc::new(AtomicBool::new(false)),
            playing: Arc::new(AtomicBool::new(false)),
            thread: None,
            volume: Arc::new(Mutex::new((100, 100))),
        }
    }
}

#[cfg(unix)]
fn spawn_shell(command: &str) -> std::io::Result<Child> {
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

#[cfg(not(unix))]
fn spawn_shell(command: &str) -> std::io::Result<Child> {
    Command::new("cmd")
        .arg("/C")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

impl AudioBackend for PipeBackend {
    fn configure(&mut self, _device: Option<&str>, sample_rate: u32, _channels: u16) -> Result<()> {
        self.sample_rate = sample_rate;
        let child = spawn_shell(&self.command)
            .map_err(|e| PlayerError::Backend(format!("spawning '{}': {e}", self.command)))?;
        self.child = Some(child);
        Ok(())
    }

    fn start(&mut self, callback: AudioCallback) -> Result<()> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| PlayerError::Backend("configure() must run before start()".into()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlayerError::Backend("child process has no stdin".into()))?;

        self.running.store(true, Ordering::Relaxed);
        let running = self.running.clone();
        let playing = self.playing.clone();
        let sample_rate = self.sample_rate.max(1);
        let pace = Duration::from_millis((CHUNK_SAMPLES as u64 * 1000) / (2 * sample_rate as u64));

        self.thread = Some(thread::spawn(move || {
            let mut samples = vec![0i16; CHUNK_SAMPLES];
            let mut bytes = vec![0u8; CHUNK_SAMPLES * 2];
            while running.load(Ordering::Relaxed) {
                if playing.load(Ordering::Relaxed) {
                    let produced = callback(&mut samples);
                    for (i, &s) in samples[..produced].iter().enumerate() {
                        let b = s.to_le_bytes();
                        bytes[i * 2] = b[0];
                        bytes[i * 2 + 1] = b[1];
                    }
                    if let Err(e) = stdin.write_all(&bytes[..produced * 2]) {
                        log::error!("pipe backend: write failed, stopping: {e}");
                        break;
                    }
                }
                thread::sleep(pace);
            }
            let _ = child.wait();
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

impl Drop for PipeBackend {
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

    #[test]
    fn volume_round_trips_and_clamps() {
        let mut backend = PipeBackend::new("cat".to_string());
        assert_eq!(backend.set_volume(200, 10).unwrap(), (100, 10));
        assert_eq!(backend.get_volume(), Some((100, 10)));
    }

    #[test]
    #[cfg(unix)]
    fn runs_command_end_to_end() {
        let mut backend = PipeBackend::new("cat > /dev/null".to_string());
        backend.configure(None, 44100, 2).unwrap();
        let cb: AudioCallback = Arc::new(|buf: &mut [i16]| {
            buf.fill(0);
            buf.len()
        });
        backend.start(cb).unwrap();
        backend.activate().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        backend.deactivate().unwrap();
    }
}
