//! Audio backend facade (§4.7, §9 "backend abstraction").
//!
//! The real device driver is out of scope for this crate (ALSA/CoreAudio/OSS
//! internals are explicitly excluded); what's modeled here is the capability
//! set the playout core needs from one: `configure`, `start(callback)`,
//! `activate`, `deactivate`, and optional volume control. Two backends ship:
//! [`null::NullBackend`] (discards audio, used by default and by tests) and
//! [`pipe::PipeBackend`] (writes PCM to a child process's stdin).

pub mod null;
pub mod pipe;

use std::sync::Arc;

use crate::error::Result;

/// The callback signature the backend drives on its own thread, serially.
/// Returns the number of samples actually produced into `buffer`.
pub type AudioCallback = Arc<dyn Fn(&mut [i16]) -> usize + Send + Sync>;

/// Capability set a pluggable audio device exposes to the player (§9).
pub trait AudioBackend: Send {
    /// One-time setup: device name (if any), sample rate, channel count.
    fn configure(&mut self, device: Option<&str>, sample_rate: u32, channels: u16) -> Result<()>;

    /// Install the pull callback and start the backend's own driving thread.
    /// Must be called once, after `configure`.
    fn start(&mut self, callback: AudioCallback) -> Result<()>;

    /// Resume calling the callback (PLAYING state, §4.4).
    fn activate(&mut self) -> Result<()>;

    /// Pause calling the callback (BUFFERING state, §4.4).
    fn deactivate(&mut self) -> Result<()>;

    /// Current left/right volume, 0-100, if the backend supports it.
    fn get_volume(&self) -> Option<(u8, u8)> {
        None
    }

    /// Set left/right volume, clamped to 0-100; returns the post-set
    /// readback. Backends that don't support volume control reject this.
    fn set_volume(&mut self, _left: u8, _right: u8) -> Result<(u8, u8)> {
        Err(crate::error::PlayerError::Backend(
            "backend does not support volume control".to_string(),
        ))
    }
}

/// Select a backend by `--api` name. Unknown names are a `CONFIG_ERROR`.
pub fn by_name(name: &str, command: Option<&str>) -> Result<Box<dyn AudioBackend>> {
    match name {
        "null" => Ok(Box::new(null::NullBackend::new())),
        "pipe" => {
            let command = command.ok_or_else(|| {
                crate::error::PlayerError::Config(
                    "--api pipe requires --command".to_string(),
                )
            })?;
            Ok(Box::new(pipe::PipeBackend::new(command.to_string())))
        }
        other => Err(crate::error::PlayerError::Config(format!(
            "unknown audio backend '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlayerError;

    #[test]
    fn unknown_backend_name_is_config_error() {
        assert!(matches!(by_name("quux", None), Err(PlayerError::Config(_))));
    }

    #[test]
    fn pipe_backend_requires_command() {
        assert!(matches!(by_name("pipe", None), Err(PlayerError::Config(_))));
        assert!(by_name("pipe", Some("cat")).is_ok());
    }

    #[test]
    fn null_backend_selected_by_default_name() {
        assert!(by_name("null", None).is_ok());
    }
}
