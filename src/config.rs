//! CLI surface and configuration assembly (§6).
//!
//! `Cli` mirrors the original's `getopt_long` table via `clap`'s derive
//! macro. [`Config::assemble`] folds in an optional `key = value` file,
//! CLI always winning, and produces the single `Config` struct the rest of
//! the crate shares as `Arc<Config>` (§3 "Configuration").

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::error::{PlayerError, Result};

/// 0.4s of 44100 Hz stereo audio, in samples (one frame = 2 samples).
const DEFAULT_MINBUFFER_SAMPLES: usize = 2 * 44100 * 4 / 10;
const DEFAULT_MAXBUFFER_SAMPLES: usize = 2 * DEFAULT_MINBUFFER_SAMPLES;
const DEFAULT_SOCKET_PATH: &str = "/tmp/playrtp.socket";
const DEFAULT_API: &str = "null";
const DEFAULT_PAUSE_MODE: &str = "silence";

#[derive(Parser, Debug)]
#[command(name = "playrtp", version, about = "Jitter-buffered network RTP audio player")]
pub struct Cli {
    /// Multicast/unicast address to bind to, or "-" for auto-pick.
    address: Option<String>,
    /// UDP port to bind to, or "-" for an ephemeral port.
    port: Option<String>,

    /// Raise log verbosity to debug.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Audio device name, passed through to the backend.
    #[arg(short = 'D', long)]
    pub device: Option<String>,

    /// Low water-mark, in frames (doubled to samples on ingest).
    #[arg(short = 'm', long)]
    pub min: Option<u64>,

    /// High water-mark, in frames (doubled to samples on ingest).
    #[arg(short = 'x', long)]
    pub max: Option<u64>,

    /// Target SO_RCVBUF size in bytes.
    #[arg(short = 'R', long)]
    pub rcvbuf: Option<usize>,

    /// Audio backend to use (null, pipe).
    #[arg(short = 'A', long)]
    pub api: Option<String>,

    /// Shell command line for the pipe backend.
    #[arg(short = 'e', long)]
    pub command: Option<String>,

    /// Enable the debug ring, writing PCM to PATH.
    #[arg(short = 'r', long)]
    pub dump: Option<PathBuf>,

    /// Control socket path.
    #[arg(short = 's', long)]
    pub socket: Option<PathBuf>,

    /// Additionally tee log output to PATH.
    #[arg(short = 'L', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// System-wide config file, read before CLI parsing finishes.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Per-user config file, read before CLI parsing finishes.
    #[arg(short = 'u', long = "user-config")]
    pub user_config: Option<PathBuf>,

    /// Backend pause behaviour: "silence" or "suspend".
    #[arg(short = 'P', long = "pause-mode")]
    pub pause_mode: Option<String>,

    /// Log buffer depth relative to minbuffer once a minute.
    #[arg(short = 'M', long)]
    pub monitor: bool,

    /// Deprecated: use --api instead.
    #[arg(short = 'a', long, hide = true)]
    pub alsa: bool,
    /// Deprecated: use --api instead.
    #[arg(short = 'o', long, hide = true)]
    pub oss: bool,
    /// Deprecated: use --api instead.
    #[arg(short = 'c', long = "core-audio", hide = true)]
    pub core_audio: bool,
}

/// The fully-resolved, immutable configuration shared by every thread.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: SocketAddr,
    pub debug: bool,
    pub device: Option<String>,
    pub minbuffer: usize,
    pub maxbuffer: usize,
    pub rcvbuf: Option<usize>,
    pub api: String,
    pub command: Option<String>,
    pub dump: Option<PathBuf>,
    pub socket: PathBuf,
    pub log_file: Option<PathBuf>,
    pub pause_mode: String,
    pub monitor: bool,
}

impl Config {
    /// Fold `cli` and any `--config`/`--user-config` file into one `Config`,
    /// CLI values always taking precedence over the file (§8 scenario 8).
    pub fn assemble(cli: Cli) -> Result<Self> {
        if cli.alsa {
            log::warn!("--alsa is deprecated and no longer functional");
            return Err(PlayerError::Config("no ALSA backend ships in this build".into()));
        }
        if cli.oss {
            log::warn!("--oss is deprecated and no longer functional");
            return Err(PlayerError::Config("no OSS backend ships in this build".into()));
        }
        if cli.core_audio {
            log::warn!("--core-audio is deprecated and no longer functional");
            return Err(PlayerError::Config(
                "no CoreAudio backend ships in this build".into(),
            ));
        }

        let mut file_values = HashMap::new();
        if let Some(path) = &cli.user_config {
            file_values.extend(read_key_value_file(path)?);
        }
        if let Some(path) = &cli.config {
            file_values.extend(read_key_value_file(path)?);
        }

        let min_frames = cli
            .min
            .or_else(|| file_values.get("min").and_then(|v| v.parse().ok()))
            .unwrap_or((DEFAULT_MINBUFFER_SAMPLES / 2) as u64);
        let max_frames = cli
            .max
            .or_else(|| file_values.get("max").and_then(|v| v.parse().ok()))
            .unwrap_or((DEFAULT_MAXBUFFER_SAMPLES / 2) as u64);

        let api = cli
            .api
            .clone()
            .or_else(|| file_values.get("api").cloned())
            .unwrap_or_else(|| {
                if cli.command.is_some() {
                    "pipe".to_string()
                } else {
                    DEFAULT_API.to_string()
                }
            });

        let socket = cli
            .socket
            .clone()
            .or_else(|| file_values.get("socket").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));

        let pause_mode = cli
            .pause_mode
            .clone()
            .or_else(|| file_values.get("pause-mode").cloned())
            .unwrap_or_else(|| DEFAULT_PAUSE_MODE.to_string());

        let address = resolve_address(
            cli.address.as_deref().or(file_values.get("address").map(String::as_str)),
            cli.port.as_deref().or(file_values.get("port").map(String::as_str)),
        )?;

        Ok(Config {
            address,
            debug: cli.debug,
            device: cli.device.or_else(|| file_values.get("device").cloned()),
            minbuffer: (min_frames as usize) * 2,
            maxbuffer: (max_frames as usize) * 2,
            rcvbuf: cli
                .rcvbuf
                .or_else(|| file_values.get("rcvbuf").and_then(|v| v.parse().ok())),
            api,
            command: cli.command.or_else(|| file_values.get("command").cloned()),
            dump: cli.dump.or_else(|| file_values.get("dump").map(PathBuf::from)),
            socket,
            log_file: cli.log_file.or_else(|| file_values.get("log-file").map(PathBuf::from)),
            pause_mode,
            monitor: cli.monitor,
        })
    }
}

/// Resolve the positional `[[ADDRESS] PORT]` pair into a bindable address.
/// `-` for the address is a `CONFIG_ERROR` (the companion control client
/// that supplies a peer address isn't part of this crate); `-` for the port
/// means "any" (ephemeral).
fn resolve_address(address: Option<&str>, port: Option<&str>) -> Result<SocketAddr> {
    let ip: IpAddr = match address {
        None | Some("") => IpAddr::from([0, 0, 0, 0]),
        Some("-") => {
            return Err(PlayerError::Config(
                "auto-pick address ('-') requires the control-client collaborator, not supported here"
                    .into(),
            ))
        }
        Some(other) => other
            .parse()
            .map_err(|_| PlayerError::Config(format!("invalid address '{other}'")))?,
    };

    let port: u16 = match port {
        None | Some("-") | Some("") => 0,
        Some(other) => other
            .parse()
            .map_err(|_| PlayerError::Config(format!("invalid port '{other}'")))?,
    };

    Ok(SocketAddr::new(ip, port))
}

/// Minimal `key = value` reader, blank lines and `#`-prefixed lines ignored.
/// Forward-compatible stand-in for DisOrder's own config grammar (§1).
fn read_key_value_file(path: &PathBuf) -> Result<HashMap<String, String>> {
    let contents = fs::read_to_string(path).map_err(PlayerError::Io)?;
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(map)
}
