//! Control server (§4.5): a single-exchange line protocol over a local
//! stream socket. No concurrency, no authentication beyond the socket
//! path's own filesystem permissions.
//!
//! `stop` exits the process immediately (§5 "cancellation/shutdown" — no
//! clean drain is attempted, all state here is volatile).

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::AudioBackend;
use crate::error::{PlayerError, Result};

#[cfg(unix)]
mod listener {
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::Path;

    use socket2::{Domain, SockAddr, Socket, Type};

    use crate::error::{PlayerError, Result};

    pub type Listener = UnixListener;
    pub type Stream = UnixStream;

    /// Unlink any stale socket from a prior crashed run, then bind with a
    /// backlog of 128, matching the original.
    pub fn bind(path: &Path) -> Result<Listener> {
        let _ = std::fs::remove_file(path);
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(PlayerError::Io)?;
        let addr = SockAddr::unix(path).map_err(PlayerError::Io)?;
        socket.bind(&addr).map_err(PlayerError::Io)?;
        socket.listen(128).map_err(PlayerError::Io)?;
        Ok(socket.into())
    }
}

#[cfg(not(unix))]
mod listener {
    use std::net::{TcpListener, TcpStream};
    use std::path::Path;

    use crate::error::{PlayerError, Result};

    pub type Listener = TcpListener;
    pub type Stream = TcpStream;

    /// Non-unix targets have no local stream socket; a loopback TCP port
    /// stands in so the control protocol still works cross-platform. `path`
    /// is unused here (logged once so it's not silently ignored).
    pub fn bind(path: &Path) -> Result<Listener> {
        log::warn!(
            "control socket path {} ignored on this platform, binding loopback TCP instead",
            path.display()
        );
        TcpListener::bind("127.0.0.1:0").map_err(PlayerError::Io)
    }
}

pub struct ControlServer {
    backend: Arc<Mutex<Box<dyn AudioBackend>>>,
}

impl ControlServer {
    pub fn new(backend: Arc<Mutex<Box<dyn AudioBackend>>>) -> Self {
        ControlServer { backend }
    }

    /// Accept loop. Runs until a fatal I/O error (EINTR retries).
    pub fn run(self, path: &Path) -> Result<()> {
        let bound = listener::bind(path)?;
        loop {
            let stream = match bound.accept() {
                Ok((stream, _peer)) => stream,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PlayerError::Io(e)),
            };
            self.handle(stream);
        }
    }

    fn handle(&self, stream: listener::Stream) {
        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return;
        }
        let mut writer = &stream;
        let mut parts = line.trim().split_whitespace();

        match parts.next() {
            Some("stop") => {
                log::info!("control: stop requested, exiting");
                std::process::exit(0);
            }
            Some("query") => {
                let _ = writeln!(writer, "running");
            }
            Some("getvol") => {
                let (left, right) = self.backend.lock().get_volume().unwrap_or((0, 0));
                let _ = writeln!(writer, "{left} {right}");
            }
            Some("setvol") => {
                let left = parts.next().and_then(|s| s.parse::<u8>().ok());
                let right = parts.next().and_then(|s| s.parse::<u8>().ok());
                match (left, right) {
                    (Some(l), Some(r)) => match self.backend.lock().set_volume(l, r) {
                        Ok((l, r)) => {
                            let _ = writeln!(writer, "{l} {r}");
                        }
                        Err(e) => log::warn!("control: setvol rejected: {e}"),
                    },
                    _ => log::debug!("control: malformed setvol command"),
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullBackend;
    use std::io::Read;
    use std::thread;
    use std::time::Duration;

    #[cfg(unix)]
    fn socket_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "playrtp-control-test-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[cfg(unix)]
    fn roundtrip(path: &std::path::Path, request: &str) -> String {
        use std::os::unix::net::UnixStream;

        let mut stream = UnixStream::connect(path).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut reply = String::new();
        stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let _ = stream.read_to_string(&mut reply);
        reply
    }

    #[test]
    #[cfg(unix)]
    fn query_replies_running() {
        // Scenario 5 from spec §8: connect, send `query`, expect `running`.
        let path = socket_path();
        let server = ControlServer::new(Arc::new(Mutex::new(
            Box::new(NullBackend::new()) as Box<dyn AudioBackend>
        )));
        let bound_path = path.clone();
        thread::spawn(move || {
            let _ = server.run(&bound_path);
        });
        thread::sleep(Duration::from_millis(50));

        let reply = roundtrip(&path, "query\n");
        assert!(reply.contains("running"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[cfg(unix)]
    fn setvol_then_getvol_round_trips() {
        let path = socket_path();
        let server = ControlServer::new(Arc::new(Mutex::new(
            Box::new(NullBackend::new()) as Box<dyn AudioBackend>
        )));
        let bound_path = path.clone();
        thread::spawn(move || {
            let _ = server.run(&bound_path);
        });
        thread::sleep(Duration::from_millis(50));

        let reply = roundtrip(&path, "setvol 150 40\n");
        assert_eq!(reply.trim(), "100 40");

        let reply = roundtrip(&path, "getvol\n");
        assert_eq!(reply.trim(), "100 40");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[cfg(unix)]
    fn unrecognized_command_closes_connection_silently() {
        let path = socket_path();
        let server = ControlServer::new(Arc::new(Mutex::new(
            Box::new(NullBackend::new()) as Box<dyn AudioBackend>
        )));
        let bound_path = path.clone();
        thread::spawn(move || {
            let _ = server.run(&bound_path);
        });
        thread::sleep(Duration::from_millis(50));

        let reply = roundtrip(&path, "frobnicate\n");
        assert!(reply.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
