//! Binary entry point (§6, §4.8): parse the CLI, assemble `Config`,
//! initialize logging, and hand off to [`playrtp::Player`].

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use env_logger::{Builder, Env, Target};

use playrtp::{Cli, Config, Player};

/// Tees every log line to stderr and to the `--log-file` path, if given.
/// Replaces the original's `logfp`-based file logger (§4.8).
struct TeeWriter {
    file: std::fs::File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.debug { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    if let Some(path) = &cli.log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => {
                eprintln!("playrtp: could not open log file {}: {e}", path.display());
            }
        }
    }

    builder.init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match Config::assemble(cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let player = match Player::new(config) {
        Ok(player) => player,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match player.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
