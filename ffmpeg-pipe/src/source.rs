use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::{Dictionary, media};

use crate::error::PipeError;
use crate::watchdog::Watchdog;

/// How long a single device read may block before it is aborted and surfaced
/// as a capture fault.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(target_os = "macos")]
const CAMERA_FORMAT: &str = "avfoundation";
#[cfg(not(target_os = "macos"))]
const CAMERA_FORMAT: &str = "v4l2";

#[derive(Clone, Debug)]
pub enum SourceConfig {
    /// A local camera opened by index (`/dev/videoN` on Linux, device index
    /// on macOS). Requested dimensions are advisory; a device that delivers
    /// anything else fails fast at open.
    Camera {
        index: u32,
        width: u32,
        height: u32,
        fps: u32,
    },
    /// A lavfi filter graph standing in for a camera (e.g. `testsrc=...`).
    /// Finite graphs end the stream cleanly instead of faulting.
    Virtual { graph: String },
}

impl SourceConfig {
    fn format_name(&self) -> &'static str {
        match self {
            SourceConfig::Camera { .. } => CAMERA_FORMAT,
            SourceConfig::Virtual { .. } => "lavfi",
        }
    }

    fn target(&self) -> String {
        match self {
            #[cfg(target_os = "macos")]
            SourceConfig::Camera { index, .. } => index.to_string(),
            #[cfg(not(target_os = "macos"))]
            SourceConfig::Camera { index, .. } => format!("/dev/video{}", index),
            SourceConfig::Virtual { graph } => graph.clone(),
        }
    }

    fn options(&self) -> Dictionary<'static> {
        let mut opts = Dictionary::new();
        if let SourceConfig::Camera { width, height, fps, .. } = self {
            opts.set("video_size", &format!("{}x{}", width, height));
            opts.set("framerate", &fps.to_string());
        }
        opts
    }
}

/// One frame's worth of capture output.
pub enum Capture<'a> {
    Frame(&'a ffmpeg_next::frame::Video),
    /// The source has no more frames (finite virtual graphs only).
    End,
}

/// Owns the camera device context and the decoder that unwraps its packets
/// (rawvideo, mjpeg, ...) into frames. A single frame buffer is reused for
/// every capture; no frame survives past the next call.
pub struct CameraSource {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    frame: ffmpeg_next::frame::Video,
    stream_index: usize,
    eof_sent: bool,
    config: SourceConfig,
    watchdog: Arc<Watchdog>,
}

impl CameraSource {
    pub fn open(config: &SourceConfig) -> Result<Self, PipeError> {
        let watchdog = Arc::new(Watchdog::new());
        let (input, stream_index, decoder) = open_device(config, &watchdog)?;

        let source = Self {
            input,
            decoder,
            frame: ffmpeg_next::frame::Video::empty(),
            stream_index,
            eof_sent: false,
            config: config.clone(),
            watchdog,
        };
        source.check_dimensions()?;

        log::info!(
            "capture source open: {} {} ({}x{} {:?})",
            source.config.format_name(),
            source.config.target(),
            source.width(),
            source.height(),
            source.pixel_format(),
        );
        Ok(source)
    }

    /// Re-establishes the same device after a capture fault. The current
    /// context is kept if the open fails, so a later attempt can retry.
    pub fn reopen(&mut self) -> Result<(), PipeError> {
        log::warn!("re-opening capture source {}", self.config.target());
        let (input, stream_index, decoder) = open_device(&self.config, &self.watchdog)?;
        self.input = input;
        self.stream_index = stream_index;
        self.decoder = decoder;
        self.eof_sent = false;
        self.check_dimensions()
    }

    /// Blocks for at most the capture timeout and yields the next raw frame.
    /// The returned frame borrows the internal buffer and is overwritten by
    /// the next call.
    pub fn capture(&mut self) -> Result<Capture<'_>, PipeError> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        loop {
            if self.eof_sent {
                if self.receive_frame()? {
                    return Ok(Capture::Frame(&self.frame));
                }
                return Ok(Capture::End);
            }

            self.watchdog.arm(CAPTURE_TIMEOUT);
            let read = packet.read(&mut self.input);
            self.watchdog.disarm();

            match read {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if packet.size() == 0 {
                        return Err(PipeError::capture("empty frame from device"));
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| PipeError::capture_io("unwrapping device packet", e))?;
                    if self.receive_frame()? {
                        return Ok(Capture::Frame(&self.frame));
                    }
                    // Decoder wants more input before producing a frame.
                }
                Err(ffmpeg_next::Error::Eof) => {
                    let _ = self.decoder.send_eof();
                    self.eof_sent = true;
                }
                Err(ffmpeg_next::Error::Exit) => {
                    return Err(PipeError::capture(format!(
                        "device read exceeded {:?}",
                        CAPTURE_TIMEOUT
                    )));
                }
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    continue;
                }
                Err(e) => return Err(PipeError::capture_io("reading from device", e)),
            }
        }
    }

    fn receive_frame(&mut self) -> Result<bool, PipeError> {
        match self.decoder.receive_frame(&mut self.frame) {
            Ok(()) => {
                if self.frame.width() == 0 || self.frame.height() == 0 {
                    return Err(PipeError::capture("short frame from device"));
                }
                Ok(true)
            }
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(false)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(false),
            Err(e) => Err(PipeError::capture_io("decoding device packet", e)),
        }
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    pub fn pixel_format(&self) -> ffmpeg_next::format::Pixel {
        self.decoder.format()
    }

    /// Downstream buffers are sized from the requested dimensions, so a
    /// device that negotiates a different size must fail here rather than
    /// feed mismatched frames into the converter.
    fn check_dimensions(&self) -> Result<(), PipeError> {
        if let SourceConfig::Camera { width, height, .. } = self.config {
            if self.width() != width || self.height() != height {
                return Err(PipeError::device(format!(
                    "device delivers {}x{}, requested {}x{}",
                    self.width(),
                    self.height(),
                    width,
                    height
                )));
            }
        }
        Ok(())
    }
}

fn open_device(
    config: &SourceConfig,
    watchdog: &Arc<Watchdog>,
) -> Result<
    (
        ffmpeg_next::format::context::Input,
        usize,
        ffmpeg_next::codec::decoder::Video,
    ),
    PipeError,
> {
    use ffmpeg_next::format::format::Format;

    let format = find_input_format(config.format_name())?;
    let target = config.target();
    let mut input = ffmpeg_next::format::open_with(
        Path::new(&target),
        &Format::Input(format),
        config.options(),
    )
    .map_err(|e| PipeError::device_io(format!("opening {}", target), e))?
    .input();
    watchdog.install(&mut input);

    let stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or_else(|| PipeError::device(format!("no video stream on {}", target)))?;
    let stream_index = stream.index();
    let parameters = stream.parameters();

    let mut decoder_ctx = ffmpeg_next::codec::Context::new();
    decoder_ctx
        .set_parameters(parameters)
        .map_err(|e| PipeError::device_io("applying device codec parameters", e))?;
    let decoder = decoder_ctx
        .decoder()
        .video()
        .map_err(|e| PipeError::device_io("opening device frame decoder", e))?;

    if decoder.format() == ffmpeg_next::format::Pixel::None
        || decoder.width() == 0
        || decoder.height() == 0
    {
        return Err(PipeError::device(format!(
            "device {} reports no frame geometry",
            target
        )));
    }

    Ok((input, stream_index, decoder))
}

/// Resolve an input format by name (e.g. "v4l2", "lavfi") via FFmpeg's
/// av_find_input_format.
fn find_input_format(name: &str) -> Result<ffmpeg_next::format::format::Input, PipeError> {
    let cname = CString::new(name)
        .map_err(|_| PipeError::device(format!("invalid format name {:?}", name)))?;
    let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
    if ptr.is_null() {
        return Err(PipeError::device(format!("input format not found: {}", name)));
    }
    Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
}
