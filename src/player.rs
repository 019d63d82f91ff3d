//! Wires the pool, intake list, playout core, receiver, queue, control
//! server and audio backend together, then runs the main thread's
//! BUFFERING ↔ PLAYING state machine (§4.4, §5).
//!
//! The receiver and control threads have no path back to `main` other than
//! abrupt termination: a fatal error on either is logged and ends the
//! process directly, the same way `stop` does, rather than round-tripping
//! through a channel the main thread would have to poll alongside its own
//! condition-variable waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::backend::{self, AudioBackend, AudioCallback};
use crate::config::Config;
use crate::control::ControlServer;
use crate::debug_ring::{DebugRing, DEFAULT_DUMP_SAMPLES};
use crate::error::{PlayerError, Result};
use crate::intake::IntakeList;
use crate::monitor::Monitor;
use crate::playout::PlayoutCore;
use crate::pool::PacketPool;
use crate::queue::Queue;
use crate::receiver::{self, Receiver};

pub struct Player {
    config: Arc<Config>,
    pool: PacketPool,
    intake: IntakeList,
    playout: Arc<PlayoutCore>,
    backend: Arc<Mutex<Box<dyn AudioBackend>>>,
    debug_ring: Option<Arc<DebugRing>>,
    running: Arc<AtomicBool>,
}

impl Player {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let pool = PacketPool::new();
        let playout = Arc::new(PlayoutCore::new(config.minbuffer, config.maxbuffer, pool.clone()));
        let backend = backend::by_name(&config.api, config.command.as_deref())?;

        let debug_ring = match &config.dump {
            Some(path) => Some(Arc::new(DebugRing::create(path, DEFAULT_DUMP_SAMPLES)?)),
            None => None,
        };

        Ok(Player {
            config,
            pool,
            intake: IntakeList::new(),
            playout,
            backend: Arc::new(Mutex::new(backend)),
            debug_ring,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn run(self) -> Result<()> {
        let socket = receiver::bind_socket(self.config.address, self.config.rcvbuf)?;

        self.backend.lock().configure(self.config.device.as_deref(), 44100, 2)?;

        let playout_for_cb = self.playout.clone();
        let debug_ring_for_cb = self.debug_ring.clone();
        let callback: AudioCallback = Arc::new(move |out: &mut [i16]| {
            playout_for_cb.callback(out, debug_ring_for_cb.as_deref())
        });
        self.backend.lock().start(callback)?;

        let receiver = Receiver::new(
            socket,
            self.pool.clone(),
            self.intake.clone(),
            self.playout.clone(),
            self.running.clone(),
        );
        thread::spawn(move || {
            if let Err(e) = receiver.run() {
                log::error!("receiver thread failed: {e}");
                std::process::exit(1);
            }
        });

        let queue = Queue::new(self.intake.clone(), self.playout.clone(), self.running.clone());
        thread::spawn(move || queue.run());

        let control = ControlServer::new(self.backend.clone());
        let socket_path = self.config.socket.clone();
        thread::spawn(move || {
            if let Err(e) = control.run(&socket_path) {
                log::error!("control server failed: {e}");
                std::process::exit(1);
            }
        });

        if self.config.monitor {
            let monitor = Monitor::new(self.playout.clone(), self.running.clone());
            thread::spawn(move || monitor.run());
        }

        self.state_machine()
    }

    /// BUFFERING ↔ PLAYING, driving the backend's `activate`/`deactivate`
    /// as the playout core's water-marks dictate (§4.4).
    fn state_machine(&self) -> Result<()> {
        while self.running.load(Ordering::Relaxed) {
            log::debug!("buffering");
            self.playout.fill_buffer();

            self.backend
                .lock()
                .activate()
                .map_err(|e| PlayerError::Backend(format!("activate: {e}")))?;
            log::info!("playing");

            self.playout.wait_for_underrun();

            self.backend
                .lock()
                .deactivate()
                .map_err(|e| PlayerError::Backend(format!("deactivate: {e}")))?;
        }
        Ok(())
    }
}
