//! `disorder-rtp-play`: a jitter-buffered network RTP audio player core.
//!
//! Consumes an RTP stream of linear PCM (payload type 10, L16 stereo,
//! 44100 Hz) arriving over unicast, broadcast or multicast UDP and plays it
//! out of a local audio device in real time, tolerating packet loss,
//! reordering, late arrival and clock drift between sender and receiver.
//!
//! See `SPEC_FULL.md` for the full module-by-module design; `DESIGN.md` for
//! where each piece is grounded.

pub mod backend;
pub mod config;
pub mod control;
pub mod debug_ring;
pub mod error;
pub mod intake;
pub mod monitor;
pub mod packet;
pub mod player;
pub mod playout;
pub mod pool;
pub mod queue;
pub mod receiver;
pub mod rtp;
pub mod timestamp;

pub use config::{Cli, Config};
pub use error::{PlayerError, Result};
pub use player::Player;
