/// Registers FFmpeg components (formats, devices, codecs). Call once at
/// process start, before opening any capture device or network sink.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod encoder;
pub mod error;
pub mod frame;
pub mod output;
pub mod packet;
pub mod pipeline;
pub mod probe;
pub mod scaler;
pub mod source;
pub mod transport;
mod watchdog;
