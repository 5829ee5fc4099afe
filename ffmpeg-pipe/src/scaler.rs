use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use crate::error::PipeError;

/// Pixel format and size converter between the capture layout and the
/// encoder's input. The swscale context is expensive to build, so one is
/// constructed per source/target pairing and reused for every frame.
pub struct Converter {
    context: scaling::Context,
}

impl Converter {
    pub fn new(
        src_format: Pixel,
        src_width: u32,
        src_height: u32,
        dst_format: Pixel,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<Self, PipeError> {
        let context = scaling::Context::get(
            src_format,
            src_width,
            src_height,
            dst_format,
            dst_width,
            dst_height,
            scaling::flag::Flags::BICUBIC,
        )
        .map_err(|e| {
            PipeError::conversion_io(
                format!(
                    "unsupported pairing {:?} {}x{} -> {:?} {}x{}",
                    src_format, src_width, src_height, dst_format, dst_width, dst_height
                ),
                e,
            )
        })?;

        Ok(Self { context })
    }

    pub fn convert(
        &mut self,
        src: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> Result<(), PipeError> {
        self.context
            .run(src, dst)
            .map_err(|e| PipeError::conversion_io("rescaling frame", e))
    }
}
