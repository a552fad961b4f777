//! Encode session state owned by the confinement thread

use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use super::SharedState;
use crate::backend::Backend;
use crate::codec::{
    ContainerMuxer, DequeueResult, EncoderFormat, HardwareEncoder, DRAIN_TIMEOUT,
    EOS_DRAIN_TIMEOUT,
};
use crate::config::EncoderConfig;
use crate::error::{EncodeError, Result, ResultExt};
use crate::gpu::{
    aspect_fit, GlApi, RenderingContext, ShaderKind, ShaderProgram, SurfaceTarget,
    DEFAULT_API_VERSION,
};
use crate::types::{EncodedBufferInfo, SessionState, Texture, TextureKind, IDENTITY};

/// At most one blit program per texture kind
#[derive(Debug, Default)]
struct Shaders {
    two_d: Option<ShaderProgram>,
    external: Option<ShaderProgram>,
}

impl Shaders {
    fn slot(&mut self, kind: ShaderKind) -> &mut Option<ShaderProgram> {
        match kind {
            TextureKind::Texture2D => &mut self.two_d,
            TextureKind::External => &mut self.external,
        }
    }

    /// Program for `kind`, compiled on first use
    fn get_or_compile(&mut self, gl: &dyn GlApi, kind: ShaderKind) -> Result<&ShaderProgram> {
        let slot = self.slot(kind);
        if slot.is_none() {
            *slot = Some(ShaderProgram::compile(gl, kind)?);
        }
        slot.as_ref()
            .ok_or_else(|| EncodeError::context_error("Shader program missing"))
    }

    fn release(&mut self, gl: &dyn GlApi) {
        for program in [self.two_d.as_mut(), self.external.as_mut()]
            .into_iter()
            .flatten()
        {
            program.release(gl);
        }
        self.two_d = None;
        self.external = None;
    }

    fn is_empty(&self) -> bool {
        self.two_d.is_none() && self.external.is_none()
    }
}

/// Map an init failure to a fatal error tagged with the failing step
fn init_step<T>(result: Result<T>, step: &str) -> Result<T> {
    result.map_err(|e| {
        let e = if e.is_fatal() {
            e
        } else {
            EncodeError::init(e.to_string())
        };
        e.with_context(step)
    })
}

/// Encoder, muxer, context and shaders for one session
pub(crate) struct SessionCore {
    backend: Box<dyn Backend>,
    shared: Arc<SharedState>,
    config: Option<EncoderConfig>,
    encoder: Option<Box<dyn HardwareEncoder>>,
    encoder_started: bool,
    muxer: Option<Box<dyn ContainerMuxer>>,
    track: Option<usize>,
    muxer_started: bool,
    context: Option<RenderingContext>,
    shaders: Shaders,
    timestamp_us: i64,
    input_ended: bool,
    end_of_stream_received: bool,
}

impl SessionCore {
    pub(crate) fn new(backend: Box<dyn Backend>, shared: Arc<SharedState>) -> Self {
        Self {
            backend,
            shared,
            config: None,
            encoder: None,
            encoder_started: false,
            muxer: None,
            track: None,
            muxer_started: false,
            context: None,
            shaders: Shaders::default(),
            timestamp_us: 0,
            input_ended: false,
            end_of_stream_received: false,
        }
    }

    /// Bring up encoder, rendering context and muxer
    ///
    /// Partially created resources stay owned for `teardown`.
    pub(crate) fn init(&mut self, config: EncoderConfig) -> Result<()> {
        let result = self.bring_up(&config);
        self.config = Some(config);

        match result {
            Ok(()) => {
                // release may have raced ahead of us
                if !self
                    .shared
                    .transition(SessionState::Uninitialized, SessionState::Running)
                {
                    return Err(EncodeError::SessionClosed);
                }
                info!("Encode session running");
                Ok(())
            }
            Err(e) => {
                warn!("Encode session init failed: {}", e);
                Err(e)
            }
        }
    }

    fn bring_up(&mut self, config: &EncoderConfig) -> Result<()> {
        let format = init_step(EncoderFormat::from_config(config), "Building encoder format")?;

        let encoder = init_step(
            self.backend.create_encoder(&config.mime_type),
            "Creating encoder",
        )?;
        debug!("Created encoder {} for {}", encoder.name(), config.mime_type);
        let encoder = self.encoder.insert(encoder);

        init_step(encoder.configure(&format), "Configuring encoder")?;
        let surface = init_step(encoder.create_input_surface(), "Creating input surface")?;

        let driver = init_step(self.backend.display_driver(), "Loading display driver")?;
        let context = init_step(
            RenderingContext::create(
                driver,
                SurfaceTarget::Encoder {
                    surface,
                    width: config.width,
                    height: config.height,
                },
                None,
                DEFAULT_API_VERSION,
            ),
            "Creating rendering context",
        )?;
        let context = self.context.insert(context);
        debug!(
            "Rendering into {} encoder surface",
            if context.is_readback() { "read-back" } else { "native" }
        );

        let shaders = &mut self.shaders;
        let compiled = context.with_current(|ctx| {
            let gl = ctx.gl()?;
            shaders.get_or_compile(gl, ShaderKind::Texture2D).map(|_| ())
        });
        init_step(compiled.and_then(|r| r), "Compiling shader program")?;

        if let Some(encoder) = self.encoder.as_mut() {
            init_step(encoder.start(), "Starting encoder")?;
            self.encoder_started = true;
        }

        if let Some(parent) = config.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                init_step(
                    std::fs::create_dir_all(parent).map_err(EncodeError::from),
                    "Creating output directory",
                )?;
            }
        }
        init_step(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&config.output_path)
                .map(|_| ())
                .map_err(EncodeError::from),
            "Creating output file",
        )?;

        let muxer = init_step(
            self.backend
                .create_muxer(&config.output_path, config.container()),
            "Creating muxer",
        )?;
        self.muxer = Some(muxer);
        debug!("Output ready at {:?}", config.output_path);
        Ok(())
    }

    fn accepting_frames(&self) -> bool {
        self.shared.state() == SessionState::Running && !self.input_ended
    }

    /// Blit one texture into the encoder surface and drain
    pub(crate) fn encode_frame(&mut self, texture: Texture, src_w: u32, src_h: u32) -> Result<()> {
        if !self.accepting_frames() {
            self.shared.stats.record_dropped();
            return Ok(());
        }
        if src_w == 0 || src_h == 0 {
            return Err(EncodeError::InvalidFrame(format!(
                "Source size {}x{} is empty",
                src_w, src_h
            )));
        }
        let (Some(config), Some(context)) = (self.config.as_ref(), self.context.as_mut()) else {
            return Err(EncodeError::SessionClosed);
        };

        let viewport = aspect_fit(src_w, src_h, config.width, config.height);
        let interval = config.frame_interval_us() as i64;

        {
            let mut current = context.current()?;
            let gl = current.gl()?;
            let shader = self
                .shaders
                .get_or_compile(gl, texture.kind)
                .context("Compiling shader program")?;
            shader.draw_from(gl, texture.id, viewport, &IDENTITY, true);

            // only a presented frame consumes a timestamp slot
            let timestamp_us = self.timestamp_us + interval;
            current.set_presentation_timestamp(timestamp_us)?;
            current.swap_buffers()?;
            self.timestamp_us = timestamp_us;
        }
        trace!(
            "Frame at {} us: {}x{} -> {:?}",
            self.timestamp_us,
            src_w,
            src_h,
            viewport
        );

        self.drain(false)
    }

    /// Run `action` with the rendering context current
    ///
    /// Only while running; a context left over from a failed `init` is not
    /// handed out.
    pub(crate) fn with_rendering_context<R>(
        &mut self,
        action: impl FnOnce(&dyn GlApi) -> R,
    ) -> Result<R> {
        if self.shared.state() != SessionState::Running {
            return Err(EncodeError::SessionClosed);
        }
        let context = self.context.as_mut().ok_or(EncodeError::SessionClosed)?;
        context.with_current(|ctx| ctx.gl().map(action))?
    }

    /// Signal end of stream and drain until the encoder confirms it
    pub(crate) fn stop_encoding(&mut self) -> Result<()> {
        if self.shared.state() != SessionState::Running || self.input_ended {
            return Ok(());
        }
        self.input_ended = true;
        let encoder = self.encoder.as_mut().ok_or(EncodeError::SessionClosed)?;
        encoder.signal_end_of_input_stream()?;
        info!("End of stream signalled, draining encoder");
        self.drain(true)
    }

    /// Move ready encoded buffers into the muxer
    ///
    /// The first poll waits up to the drain timeout; later polls do not wait.
    /// An end-of-stream drain waits on every poll until the final buffer.
    fn drain(&mut self, end_of_stream: bool) -> Result<()> {
        if self.end_of_stream_received {
            return Ok(());
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(EncodeError::SessionClosed);
        };
        let mut polled_any = false;

        loop {
            let timeout = if end_of_stream {
                EOS_DRAIN_TIMEOUT
            } else if !polled_any {
                DRAIN_TIMEOUT
            } else {
                Duration::ZERO
            };

            match encoder.dequeue_output_buffer(timeout)? {
                DequeueResult::TryAgainLater => {
                    if end_of_stream || !polled_any {
                        self.shared.stats.record_stall();
                        warn!(
                            "Encoder produced nothing within {} ms",
                            timeout.as_millis()
                        );
                        return Err(EncodeError::DrainStall {
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                    return Ok(());
                }
                DequeueResult::OutputFormatChanged => {
                    polled_any = true;
                    match encoder.output_format() {
                        Ok(format) => debug!(
                            "Encoder output format: {} {}x{}, {} bytes of codec data",
                            format.codec,
                            format.width,
                            format.height,
                            format.extradata.len()
                        ),
                        Err(e) => debug!("Encoder output format changed ({})", e),
                    }
                }
                DequeueResult::Buffer { index, info } => {
                    polled_any = true;
                    let written = write_buffer(
                        &**encoder,
                        self.muxer.as_deref_mut(),
                        &mut self.track,
                        &mut self.muxer_started,
                        &self.shared,
                        index,
                        &info,
                    );
                    let released = encoder.release_output_buffer(index);
                    written?;
                    released?;

                    if info.flags.is_end_of_stream() {
                        self.end_of_stream_received = true;
                        info!("Encoder reached end of stream");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Release everything in reverse acquisition order; idempotent
    pub(crate) fn teardown(&mut self) {
        let current = match self.context.as_mut() {
            Some(context) => match context.make_current() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Could not make context current for teardown: {}", e);
                    false
                }
            },
            None => false,
        };

        if let Some(mut muxer) = self.muxer.take() {
            if self.muxer_started {
                if let Err(e) = muxer.stop() {
                    error!("Failed to stop muxer: {}", e);
                }
            }
            muxer.release();
            debug!("Muxer released");
        }
        self.muxer_started = false;
        self.track = None;

        if let Some(mut encoder) = self.encoder.take() {
            if self.encoder_started {
                if let Err(e) = encoder.stop() {
                    error!("Failed to stop encoder: {}", e);
                }
            }
            encoder.release();
            debug!("Encoder released");
        }
        self.encoder_started = false;

        if !self.shaders.is_empty() {
            match self.context.as_ref().map(|c| c.gl()) {
                Some(Ok(gl)) if current => self.shaders.release(gl),
                _ => {
                    warn!("Dropping shader programs without a current context");
                    self.shaders = Shaders::default();
                }
            }
        }

        if let Some(mut context) = self.context.take() {
            if current {
                if let Err(e) = context.detach_current() {
                    warn!("Failed to detach context: {}", e);
                }
            }
            context.release();
        }
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Write one dequeued buffer, starting the muxer on the first media sample
fn write_buffer(
    encoder: &dyn HardwareEncoder,
    muxer: Option<&mut (dyn ContainerMuxer + 'static)>,
    track: &mut Option<usize>,
    muxer_started: &mut bool,
    shared: &SharedState,
    index: usize,
    info: &EncodedBufferInfo,
) -> Result<()> {
    if info.flags.is_codec_config() {
        shared.stats.record_config_discarded();
        trace!("Discarding {} bytes of codec config", info.size);
        return Ok(());
    }
    if info.size == 0 {
        return Ok(());
    }

    let payload = encoder
        .output_buffer(index)
        .zip(info.range())
        .and_then(|(buffer, range)| buffer.get(range))
        .ok_or_else(|| {
            EncodeError::encoder(format!(
                "Output buffer {} has no bytes at offset {} size {}",
                index, info.offset, info.size
            ))
        })?;
    let muxer = muxer.ok_or_else(|| EncodeError::muxer("Muxer is not open"))?;

    if !*muxer_started {
        let track_index = match *track {
            Some(track_index) => track_index,
            None => {
                let format = encoder.output_format()?;
                let track_index = muxer.add_track(&format)?;
                *track = Some(track_index);
                track_index
            }
        };
        muxer.start()?;
        *muxer_started = true;
        info!("Muxer started with track {}", track_index);
    }

    let track_index = track.ok_or_else(|| EncodeError::muxer("Muxer has no track"))?;
    muxer.write_sample(track_index, payload, info)?;
    shared.stats.record_sample();
    trace!(
        "Wrote sample: pts={} size={} key={}",
        info.presentation_time_us,
        info.size,
        info.flags.is_key_frame()
    );
    Ok(())
}
