//! Error taxonomy for the player.
//!
//! Every fatal condition the core can hit becomes one variant here; the
//! non-fatal conditions (short packet, bad extension, late packet) are
//! logged in place on the receive path and never constructed as an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported RTP payload type {0}")]
    UnsupportedPayload(u8),

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
