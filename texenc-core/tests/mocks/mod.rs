//! Mock infrastructure for testing
//!
//! Provides an in-memory backend (display driver, GL, encoder and muxer) that
//! records every call into a shared [`Probe`] so tests can check ordering,
//! thread confinement and resource lifetimes without a GPU.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use texenc_core::backend::Backend;
use texenc_core::codec::{
    ContainerMuxer, DequeueResult, EncoderFormat, FrameSink, HardwareEncoder, InputSurface,
};
use texenc_core::config::{Codec, Container};
use texenc_core::error::{EncodeError, Result};
use texenc_core::gpu::{
    ConfigAttributes, ConfigHandle, ContextHandle, DisplayDriver, DisplayHandle, GlApi,
    GlShaderKind, SurfaceHandle, SurfaceKind,
};
use texenc_core::codec::NativeWindow;
use texenc_core::types::{BufferFlags, EncodedBufferInfo, MediaFormat};

/// Codec config bytes the fake encoder reports (an H.264 SPS prefix)
pub const FAKE_EXTRADATA: [u8; 8] = [0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e];

/// Bytes of payload per encoded frame
pub const FAKE_SAMPLE_SIZE: usize = 32;

/// Behaviour switches for the fake backend
#[derive(Debug, Clone)]
pub struct FakeOptions {
    /// Codec-config buffers emitted after start
    pub config_buffers: usize,
    /// Shader compilation fails with a driver log
    pub fail_compile: bool,
    /// Backend refuses to create an encoder
    pub fail_encoder: bool,
    /// Driver honours presentation timestamps
    pub presentation_time: bool,
    /// Final buffer carries payload instead of being empty
    pub eos_payload: bool,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            config_buffers: 1,
            fail_compile: false,
            fail_encoder: false,
            presentation_time: true,
            eos_payload: false,
        }
    }
}

/// A sample as seen by the fake muxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSample {
    pub track: usize,
    pub presentation_time_us: i64,
    pub size: usize,
    pub key_frame: bool,
    pub end_of_stream: bool,
}

/// Everything the fakes observed
#[derive(Debug, Default)]
pub struct Probe {
    /// Ordered call log, e.g. `encoder.start`, `egl.terminate`
    pub events: Vec<String>,
    /// Names of the threads that touched the driver, GL or encoder
    pub threads: Vec<String>,

    pub live_displays: i64,
    pub live_contexts: i64,
    pub live_surfaces: i64,
    pub live_programs: i64,
    pub live_shaders: i64,
    pub live_buffers: i64,
    pub live_textures: i64,
    pub live_framebuffers: i64,
    pub next_name: u32,

    pub viewports: Vec<(i32, i32, i32, i32)>,
    pub draws: usize,
    pub presentation_times_ns: Vec<i64>,
    pub recordable_requested: Option<bool>,
    pub config_surfaces: Vec<SurfaceKind>,
    pub pbuffer_sizes: Vec<(u32, u32)>,
    pub shared_contexts: Vec<Option<ContextHandle>>,
    pub bound_framebuffer: Option<u32>,
    /// Framebuffers report incomplete while set
    pub incomplete_framebuffers: bool,
    /// Upcoming make-current calls that fail
    pub fail_make_currents: usize,
    /// Upcoming swaps that fail
    pub fail_swaps: usize,

    pub configured: Option<EncoderFormat>,
    pub dequeue_timeouts: Vec<Duration>,
    pub outstanding_buffers: i64,
    pub config_buffers_released: usize,
    pub end_of_stream_signalled: usize,
    /// While set the encoder holds back frames
    pub stall: bool,
    /// Upcoming encoded frames reported with an out-of-range offset
    pub corrupt_buffers: usize,

    pub tracks_added: usize,
    pub muxer_starts: usize,
    pub muxer_stops: usize,
    pub samples: Vec<WrittenSample>,
}

impl Probe {
    fn record(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
        let name = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        self.threads.push(name);
    }

    fn next_name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }

    /// Position of the first occurrence of `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    /// Sum of every live driver and GL object
    pub fn live_handles(&self) -> i64 {
        self.live_displays
            + self.live_contexts
            + self.live_surfaces
            + self.live_programs
            + self.live_shaders
            + self.live_buffers
    }
}

pub type SharedProbe = Arc<Mutex<Probe>>;

pub fn new_probe() -> SharedProbe {
    Arc::new(Mutex::new(Probe::default()))
}

/// Backend handing out fakes that share one probe
pub struct FakeBackend {
    pub probe: SharedProbe,
    pub options: FakeOptions,
}

impl FakeBackend {
    pub fn new(probe: SharedProbe) -> Self {
        Self::with_options(probe, FakeOptions::default())
    }

    pub fn with_options(probe: SharedProbe, options: FakeOptions) -> Self {
        Self { probe, options }
    }
}

impl Backend for FakeBackend {
    fn display_driver(&mut self) -> Result<Box<dyn DisplayDriver>> {
        Ok(Box::new(FakeDriver::new(
            Arc::clone(&self.probe),
            self.options.clone(),
        )))
    }

    fn create_encoder(&mut self, mime_type: &str) -> Result<Box<dyn HardwareEncoder>> {
        if self.options.fail_encoder {
            return Err(EncodeError::encoder(format!("No encoder for {}", mime_type)));
        }
        let codec = Codec::from_mime(mime_type)
            .ok_or_else(|| EncodeError::encoder(format!("Unknown MIME type {}", mime_type)))?;
        Ok(Box::new(FakeEncoder::new(
            Arc::clone(&self.probe),
            codec,
            self.options.clone(),
        )))
    }

    fn create_muxer(&mut self, path: &Path, container: Container) -> Result<Box<dyn ContainerMuxer>> {
        self.probe
            .lock()
            .record(format!("muxer.create {:?}", container));
        Ok(Box::new(FakeMuxer {
            probe: Arc::clone(&self.probe),
            path: path.to_path_buf(),
            track: None,
            started: false,
            stopped: false,
        }))
    }
}

/// Display driver handing out counted handles
pub struct FakeDriver {
    probe: SharedProbe,
    options: FakeOptions,
}

impl FakeDriver {
    pub fn new(probe: SharedProbe, options: FakeOptions) -> Self {
        Self { probe, options }
    }
}

impl DisplayDriver for FakeDriver {
    fn open_display(&mut self) -> Result<DisplayHandle> {
        let mut probe = self.probe.lock();
        probe.record("egl.open_display");
        probe.live_displays += 1;
        Ok(DisplayHandle(probe.next_name() as usize))
    }

    fn has_extension(&self, _display: DisplayHandle, name: &str) -> bool {
        name == "EGL_ANDROID_recordable"
    }

    fn choose_config(&mut self, _display: DisplayHandle, attrs: &ConfigAttributes) -> Result<ConfigHandle> {
        let mut probe = self.probe.lock();
        probe.record("egl.choose_config");
        probe.recordable_requested = Some(attrs.recordable);
        probe.config_surfaces.push(attrs.surface);
        Ok(ConfigHandle(1))
    }

    fn create_context(
        &mut self,
        _display: DisplayHandle,
        _config: ConfigHandle,
        shared: Option<ContextHandle>,
        _api_version: i32,
    ) -> Result<ContextHandle> {
        let mut probe = self.probe.lock();
        probe.record("egl.create_context");
        probe.shared_contexts.push(shared);
        probe.live_contexts += 1;
        Ok(ContextHandle(probe.next_name() as usize))
    }

    fn create_window_surface(
        &mut self,
        _display: DisplayHandle,
        _config: ConfigHandle,
        _window: &NativeWindow,
    ) -> Result<SurfaceHandle> {
        Err(EncodeError::context_error("Fake driver has no windows"))
    }

    fn create_pbuffer_surface(
        &mut self,
        _display: DisplayHandle,
        _config: ConfigHandle,
        width: u32,
        height: u32,
    ) -> Result<SurfaceHandle> {
        let mut probe = self.probe.lock();
        probe.record("egl.create_surface");
        probe.pbuffer_sizes.push((width, height));
        probe.live_surfaces += 1;
        Ok(SurfaceHandle(probe.next_name() as usize))
    }

    fn make_current(
        &mut self,
        _display: DisplayHandle,
        binding: Option<(SurfaceHandle, ContextHandle)>,
    ) -> Result<()> {
        let mut probe = self.probe.lock();
        if binding.is_none() {
            probe.record("egl.detach");
            return Ok(());
        }
        if probe.fail_make_currents > 0 {
            probe.fail_make_currents -= 1;
            probe.record("egl.make_current failed");
            return Err(EncodeError::context_error("eglMakeCurrent failed: EGL_BAD_ACCESS"));
        }
        probe.record("egl.make_current");
        Ok(())
    }

    fn swap_buffers(&mut self, _display: DisplayHandle, _surface: SurfaceHandle) -> Result<()> {
        let mut probe = self.probe.lock();
        if probe.fail_swaps > 0 {
            probe.fail_swaps -= 1;
            probe.record("egl.swap_buffers failed");
            return Err(EncodeError::context_error("eglSwapBuffers failed: EGL_BAD_SURFACE"));
        }
        probe.record("egl.swap_buffers");
        Ok(())
    }

    fn set_presentation_time(
        &mut self,
        _display: DisplayHandle,
        _surface: SurfaceHandle,
        time_ns: i64,
    ) -> Result<bool> {
        if !self.options.presentation_time {
            return Ok(false);
        }
        self.probe.lock().presentation_times_ns.push(time_ns);
        Ok(true)
    }

    fn load_gl(&mut self) -> Result<Box<dyn GlApi>> {
        Ok(Box::new(FakeGl::new(
            Arc::clone(&self.probe),
            self.options.fail_compile,
        )))
    }

    fn destroy_surface(&mut self, _display: DisplayHandle, _surface: SurfaceHandle) {
        let mut probe = self.probe.lock();
        probe.record("egl.destroy_surface");
        probe.live_surfaces -= 1;
    }

    fn destroy_context(&mut self, _display: DisplayHandle, _context: ContextHandle) {
        let mut probe = self.probe.lock();
        probe.record("egl.destroy_context");
        probe.live_contexts -= 1;
    }

    fn release_thread(&mut self) {
        self.probe.lock().record("egl.release_thread");
    }

    fn terminate(&mut self, _display: DisplayHandle) {
        let mut probe = self.probe.lock();
        probe.record("egl.terminate");
        probe.live_displays -= 1;
    }
}

/// GL table that only counts objects
pub struct FakeGl {
    probe: SharedProbe,
    fail_compile: bool,
}

impl FakeGl {
    pub fn new(probe: SharedProbe, fail_compile: bool) -> Self {
        Self {
            probe,
            fail_compile,
        }
    }
}

impl GlApi for FakeGl {
    fn create_shader(&self, _kind: GlShaderKind) -> std::result::Result<u32, String> {
        let mut probe = self.probe.lock();
        probe.live_shaders += 1;
        Ok(probe.next_name())
    }

    fn shader_source(&self, _shader: u32, _source: &str) {}

    fn compile_shader(&self, _shader: u32) {}

    fn shader_compile_status(&self, _shader: u32) -> bool {
        !self.fail_compile
    }

    fn shader_info_log(&self, _shader: u32) -> String {
        "0:1: error: syntax error".to_string()
    }

    fn delete_shader(&self, _shader: u32) {
        self.probe.lock().live_shaders -= 1;
    }

    fn create_program(&self) -> std::result::Result<u32, String> {
        let mut probe = self.probe.lock();
        probe.record("gl.create_program");
        probe.live_programs += 1;
        Ok(probe.next_name())
    }

    fn attach_shader(&self, _program: u32, _shader: u32) {}

    fn detach_shader(&self, _program: u32, _shader: u32) {}

    fn link_program(&self, _program: u32) {}

    fn program_link_status(&self, _program: u32) -> bool {
        true
    }

    fn program_info_log(&self, _program: u32) -> String {
        String::new()
    }

    fn use_program(&self, _program: Option<u32>) {}

    fn delete_program(&self, _program: u32) {
        let mut probe = self.probe.lock();
        probe.record("gl.delete_program");
        probe.live_programs -= 1;
    }

    fn uniform_location(&self, _program: u32, _name: &str) -> Option<u32> {
        Some(0)
    }

    fn uniform_1i(&self, _location: u32, _value: i32) {}

    fn uniform_matrix_4fv(&self, _location: u32, _matrix: &[f32; 16]) {}

    fn create_vertex_buffer(&self, _data: &[f32]) -> std::result::Result<u32, String> {
        let mut probe = self.probe.lock();
        probe.live_buffers += 1;
        Ok(probe.next_name())
    }

    fn delete_buffer(&self, _buffer: u32) {
        self.probe.lock().live_buffers -= 1;
    }

    fn enable_vertex_attrib(&self, _location: u32, _buffer: u32, _components: i32) {}

    fn disable_vertex_attrib(&self, _location: u32) {}

    fn active_texture(&self, _unit: u32) {}

    fn bind_texture(&self, _target: u32, _texture: Option<u32>) {}

    fn create_texture(&self) -> std::result::Result<u32, String> {
        let mut probe = self.probe.lock();
        probe.live_textures += 1;
        Ok(probe.next_name())
    }

    fn tex_parameter(&self, _target: u32, _parameter: u32, _value: i32) {}

    fn tex_image_2d_rgba(&self, _width: i32, _height: i32, _pixels: Option<&[u8]>) {}

    fn delete_texture(&self, _texture: u32) {
        self.probe.lock().live_textures -= 1;
    }

    fn create_framebuffer(&self) -> std::result::Result<u32, String> {
        let mut probe = self.probe.lock();
        probe.live_framebuffers += 1;
        Ok(probe.next_name())
    }

    fn bind_framebuffer(&self, framebuffer: Option<u32>) {
        self.probe.lock().bound_framebuffer = framebuffer;
    }

    fn framebuffer_texture_2d(&self, _texture: u32) {}

    fn framebuffer_complete(&self) -> bool {
        !self.probe.lock().incomplete_framebuffers
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        let mut probe = self.probe.lock();
        probe.live_framebuffers -= 1;
        if probe.bound_framebuffer == Some(framebuffer) {
            probe.bound_framebuffer = None;
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.probe.lock().viewports.push((x, y, width, height));
    }

    fn clear_color_buffer(&self) {}

    fn draw_triangle_strip(&self, _first: i32, _count: i32) {
        let mut probe = self.probe.lock();
        probe.record("gl.draw");
        probe.draws += 1;
    }

    fn read_pixels_rgba(&self, _x: i32, _y: i32, _width: i32, _height: i32, out: &mut [u8]) {
        out.fill(0x80);
    }

    fn get_error(&self) -> u32 {
        0
    }
}

/// Encoder that turns every read-back frame into one fixed-size sample
pub struct FakeEncoder {
    probe: SharedProbe,
    codec: Codec,
    options: FakeOptions,
    sink: FrameSink,
    format: Option<EncoderFormat>,
    started: bool,
    input_ended: bool,
    end_of_stream_sent: bool,
    pending: VecDeque<DequeueResult>,
    slots: Vec<Option<Vec<u8>>>,
    frames_encoded: u64,
}

impl FakeEncoder {
    fn new(probe: SharedProbe, codec: Codec, options: FakeOptions) -> Self {
        Self {
            probe,
            codec,
            options,
            sink: FrameSink::new(),
            format: None,
            started: false,
            input_ended: false,
            end_of_stream_sent: false,
            pending: VecDeque::new(),
            slots: Vec::new(),
            frames_encoded: 0,
        }
    }

    fn push_buffer(&mut self, payload: Vec<u8>, presentation_time_us: i64, flags: BufferFlags) -> DequeueResult {
        let corrupt = {
            let mut probe = self.probe.lock();
            let corrupt = probe.corrupt_buffers > 0 && flags == BufferFlags::NONE;
            if corrupt {
                probe.corrupt_buffers -= 1;
            }
            corrupt
        };
        let info = EncodedBufferInfo {
            offset: if corrupt { usize::MAX } else { 0 },
            size: payload.len(),
            presentation_time_us,
            flags,
        };
        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(payload);
                index
            }
            None => {
                self.slots.push(Some(payload));
                self.slots.len() - 1
            }
        };
        self.probe.lock().outstanding_buffers += 1;
        DequeueResult::Buffer { index, info }
    }
}

impl HardwareEncoder for FakeEncoder {
    fn name(&self) -> &str {
        "fake"
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<()> {
        let mut probe = self.probe.lock();
        probe.record("encoder.configure");
        probe.configured = Some(format.clone());
        self.format = Some(format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<InputSurface> {
        self.probe.lock().record("encoder.create_input_surface");
        Ok(InputSurface::Readback(self.sink.clone()))
    }

    fn start(&mut self) -> Result<()> {
        self.probe.lock().record("encoder.start");
        self.started = true;
        self.pending.push_back(DequeueResult::OutputFormatChanged);
        for _ in 0..self.options.config_buffers {
            let buffer = self.push_buffer(FAKE_EXTRADATA.to_vec(), 0, BufferFlags::CODEC_CONFIG);
            self.pending.push_back(buffer);
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<DequeueResult> {
        if !self.started {
            return Err(EncodeError::encoder("dequeue before start"));
        }
        let stall = {
            let mut probe = self.probe.lock();
            probe.record("encoder.dequeue");
            probe.dequeue_timeouts.push(timeout);
            probe.stall
        };

        if let Some(result) = self.pending.pop_front() {
            return Ok(result);
        }
        if stall {
            return Ok(DequeueResult::TryAgainLater);
        }
        if let Some(frame) = self.sink.pop() {
            let gop = self.format.as_ref().map(|f| f.gop_size() as u64).unwrap_or(1).max(1);
            let flags = if self.frames_encoded % gop == 0 {
                BufferFlags::KEY_FRAME
            } else {
                BufferFlags::NONE
            };
            self.frames_encoded += 1;
            let payload = vec![(self.frames_encoded & 0xff) as u8; FAKE_SAMPLE_SIZE];
            return Ok(self.push_buffer(payload, frame.presentation_time_us, flags));
        }
        if self.input_ended && !self.end_of_stream_sent {
            self.end_of_stream_sent = true;
            let payload = if self.options.eos_payload {
                vec![0xee; FAKE_SAMPLE_SIZE]
            } else {
                Vec::new()
            };
            return Ok(self.push_buffer(payload, 0, BufferFlags::END_OF_STREAM));
        }
        Ok(DequeueResult::TryAgainLater)
    }

    fn output_format(&self) -> Result<MediaFormat> {
        let format = self
            .format
            .as_ref()
            .filter(|_| self.started)
            .ok_or_else(|| EncodeError::encoder("Output format not available"))?;
        Ok(MediaFormat {
            codec: self.codec,
            width: format.width,
            height: format.height,
            frame_rate: format.frame_rate,
            bit_rate: format.bit_rate,
            extradata: FAKE_EXTRADATA.to_vec(),
        })
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(index).and_then(|slot| slot.as_deref())
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        let payload = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| EncodeError::encoder(format!("Buffer {} is not dequeued", index)))?;
        let mut probe = self.probe.lock();
        probe.outstanding_buffers -= 1;
        if payload == FAKE_EXTRADATA {
            probe.config_buffers_released += 1;
        }
        Ok(())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        let mut probe = self.probe.lock();
        probe.record("encoder.signal_eos");
        probe.end_of_stream_signalled += 1;
        self.input_ended = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.probe.lock().record("encoder.stop");
        self.started = false;
        Ok(())
    }

    fn release(&mut self) {
        self.probe.lock().record("encoder.release");
        self.slots.clear();
    }
}

/// Muxer appending raw sample bytes to the output file
pub struct FakeMuxer {
    probe: SharedProbe,
    path: PathBuf,
    track: Option<usize>,
    started: bool,
    stopped: bool,
}

impl FakeMuxer {
    fn append(&self, bytes: &[u8]) -> Result<()> {
        let mut file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(bytes)?;
        Ok(())
    }
}

impl ContainerMuxer for FakeMuxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        let mut probe = self.probe.lock();
        probe.record("muxer.add_track");
        probe.tracks_added += 1;
        if self.track.is_some() {
            return Err(EncodeError::muxer("Track already added"));
        }
        if format.extradata.is_empty() {
            return Err(EncodeError::muxer("Missing codec data"));
        }
        self.track = Some(0);
        Ok(0)
    }

    fn start(&mut self) -> Result<()> {
        {
            let mut probe = self.probe.lock();
            probe.record("muxer.start");
            probe.muxer_starts += 1;
        }
        if self.started {
            return Err(EncodeError::muxer("Muxer already started"));
        }
        self.started = true;
        self.append(b"HDR\n")
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &EncodedBufferInfo) -> Result<()> {
        if !self.started || self.stopped {
            return Err(EncodeError::muxer("Muxer is not accepting samples"));
        }
        self.probe.lock().samples.push(WrittenSample {
            track,
            presentation_time_us: info.presentation_time_us,
            size: data.len(),
            key_frame: info.flags.is_key_frame(),
            end_of_stream: info.flags.is_end_of_stream(),
        });
        self.append(data)
    }

    fn stop(&mut self) -> Result<()> {
        {
            let mut probe = self.probe.lock();
            probe.record("muxer.stop");
            probe.muxer_stops += 1;
        }
        if !self.started || self.stopped {
            return Err(EncodeError::muxer("Muxer is not running"));
        }
        self.stopped = true;
        self.append(b"TRL\n")
    }

    fn release(&mut self) {
        self.probe.lock().record("muxer.release");
    }
}
