//! Encode sessions
//!
//! An [`EncodeSession`] renders caller textures into a hardware encoder's
//! input surface at a fixed frame rate and muxes the encoded stream into a
//! container file.
//!
//! # Threading
//!
//! Rendering contexts and encoders must only be touched from the thread that
//! created them. Every session runs a dedicated `texenc-encoder` thread and
//! the async methods here only queue work onto it, so callers can hold an
//! `Arc<EncodeSession>` from any task.
//!
//! ```text
//! caller tasks ──▶ job queue ──▶ texenc-encoder thread
//!                                  ├─ RenderingContext (draw, swap)
//!                                  ├─ HardwareEncoder  (drain)
//!                                  └─ ContainerMuxer   (write)
//! ```

mod engine;
mod worker;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use self::engine::SessionCore;
use self::worker::Worker;
use crate::backend::{Backend, SystemBackend};
use crate::config::EncoderConfig;
use crate::error::{EncodeError, Result};
use crate::gpu::GlApi;
use crate::types::{SessionState, Texture};

/// Counters shared between the session handle and its thread
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    frames_submitted: AtomicU64,
    frames_dropped: AtomicU64,
    samples_written: AtomicU64,
    config_buffers_discarded: AtomicU64,
    drain_stalls: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sample(&self) {
        self.samples_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_config_discarded(&self) {
        self.config_buffers_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stall(&self) {
        self.drain_stalls.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, state: SessionState) -> SessionStats {
        SessionStats {
            state,
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            config_buffers_discarded: self.config_buffers_discarded.load(Ordering::Relaxed),
            drain_stalls: self.drain_stalls.load(Ordering::Relaxed),
        }
    }
}

/// Lifecycle flags and counters visible from any thread
#[derive(Debug)]
pub(crate) struct SharedState {
    state: AtomicU8,
    input_ended: AtomicBool,
    init_attempted: AtomicBool,
    pub(crate) stats: StatsCounters,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Uninitialized.as_u8()),
            input_ended: AtomicBool::new(false),
            init_attempted: AtomicBool::new(false),
            stats: StatsCounters::default(),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; false if the state was something else
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter the terminal state, returning the previous one
    fn destroy(&self) -> SessionState {
        SessionState::from_u8(
            self.state
                .swap(SessionState::Destroyed.as_u8(), Ordering::AcqRel),
        )
    }

    /// Whether `stop_encoding` has been requested
    pub(crate) fn input_ended(&self) -> bool {
        self.input_ended.load(Ordering::Acquire)
    }

    /// Mark input as ended; true if it already was
    fn end_input(&self) -> bool {
        self.input_ended.swap(true, Ordering::AcqRel)
    }
}

/// Snapshot of session counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    /// Frames handed to the encoder thread
    pub frames_submitted: u64,
    /// Frames ignored because the session was not running
    pub frames_dropped: u64,
    /// Encoded samples written to the container
    pub samples_written: u64,
    /// Codec-config buffers released without writing
    pub config_buffers_discarded: u64,
    /// Drains where the encoder produced nothing in time
    pub drain_stalls: u64,
}

/// Texture-to-file encode session
///
/// Lifecycle: `init` once, any number of `encode_frame` calls, optionally
/// `stop_encoding`, then `release`. After `release` the session is inert.
pub struct EncodeSession {
    shared: Arc<SharedState>,
    backend: Mutex<Option<Box<dyn Backend>>>,
    worker: Mutex<Option<Worker>>,
    config: Mutex<Option<EncoderConfig>>,
}

impl EncodeSession {
    /// Create an uninitialized session on `backend`
    pub fn new(backend: impl Backend) -> Self {
        Self {
            shared: Arc::new(SharedState::new()),
            backend: Mutex::new(Some(Box::new(backend))),
            worker: Mutex::new(None),
            config: Mutex::new(None),
        }
    }

    /// Session on libEGL and FFmpeg
    pub fn system() -> Self {
        Self::new(SystemBackend::new())
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Configuration passed to `init`, if any
    pub fn config(&self) -> Option<EncoderConfig> {
        self.config.lock().clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot(self.state())
    }

    /// Queue a job on the encoder thread
    fn submit<R, F>(&self, job: F) -> Result<impl Future<Output = Result<R>> + Send + use<R, F>>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionCore) -> R + Send + 'static,
    {
        let worker = self.worker.lock();
        worker.as_ref().ok_or(EncodeError::SessionClosed)?.run(job)
    }

    /// Start the encoder thread and bring up encoder, context and muxer
    ///
    /// Only one `init` is accepted per session, even if it fails. An invalid
    /// configuration is rejected before that attempt is consumed.
    pub async fn init(&self, config: EncoderConfig) -> Result<()> {
        if self.state() == SessionState::Destroyed {
            return Err(EncodeError::SessionClosed);
        }
        config.validate()?;
        if self.shared.init_attempted.swap(true, Ordering::AcqRel) {
            return Err(EncodeError::init("Session was already initialized"));
        }

        let backend = self
            .backend
            .lock()
            .take()
            .ok_or(EncodeError::SessionClosed)?;

        info!(
            "Initializing encode session: {}x{} @ {} fps, {} at {} bps -> {:?}",
            config.width,
            config.height,
            config.frame_rate,
            config.mime_type,
            config.bit_rate,
            config.output_path
        );
        *self.config.lock() = Some(config.clone());

        let pending = {
            let mut slot = self.worker.lock();
            let worker = slot.insert(Worker::spawn(backend, Arc::clone(&self.shared))?);
            worker.run(move |core| core.init(config))?
        };
        pending.await?
    }

    /// Render `texture` into the encoder and drain ready output
    ///
    /// `width` and `height` are the source texture size, used to letterbox
    /// it into the output. Frames arriving while the session is not running,
    /// or after `stop_encoding`, are dropped without error.
    pub async fn encode_frame(&self, texture: Texture, width: u32, height: u32) -> Result<()> {
        if !self.is_running() || self.shared.input_ended() {
            self.shared.stats.record_dropped();
            trace!("Dropping frame: session is {}", self.state());
            return Ok(());
        }
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidFrame(format!(
                "Source size {}x{} is empty",
                width, height
            )));
        }

        self.shared.stats.record_submitted();
        self.submit(move |core| core.encode_frame(texture, width, height))?
            .await?
    }

    /// Run `action` on the encoder thread with the session's context current
    ///
    /// Use it to create or update source textures that share the session's
    /// GL objects. Fails with `SessionClosed` unless the session is running.
    pub async fn with_rendering_context<R, F>(&self, action: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn GlApi) -> R + Send + 'static,
    {
        if !self.is_running() {
            return Err(EncodeError::SessionClosed);
        }
        self.submit(move |core| core.with_rendering_context(action))?
            .await?
    }

    /// Signal end of stream and drain the encoder's remaining output
    ///
    /// No-op unless running; only the first call does anything.
    pub async fn stop_encoding(&self) -> Result<()> {
        if !self.is_running() || self.shared.end_input() {
            return Ok(());
        }
        self.submit(|core| core.stop_encoding())?.await?
    }

    /// Tear down muxer, encoder, shaders and context, then stop the thread
    ///
    /// Idempotent. Jobs still queued observe the destroyed state and do
    /// nothing.
    pub async fn release(&self) {
        let previous = self.shared.destroy();
        let worker = self.worker.lock().take();

        if let Some(mut worker) = worker {
            match worker.run(|core| core.teardown()) {
                Ok(pending) => {
                    if let Err(e) = pending.await {
                        warn!("Encoder thread exited before teardown: {}", e);
                    }
                }
                Err(e) => warn!("Could not queue teardown: {}", e),
            }

            if let Some(exiting) = worker.shutdown() {
                if exiting.join().await {
                    debug!("Encoder thread joined");
                } else {
                    error!("Encoder thread panicked");
                }
            }
        }
        self.backend.lock().take();

        if previous != SessionState::Destroyed {
            let stats = self.stats();
            info!(
                "Encode session released: {} samples written, {} frames dropped, {} stalls",
                stats.samples_written, stats.frames_dropped, stats.drain_stalls
            );
        }
    }
}

impl std::fmt::Debug for EncodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeSession")
            .field("state", &self.state())
            .field("config", &*self.config.lock())
            .finish_non_exhaustive()
    }
}
