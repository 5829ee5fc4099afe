use ffmpeg_next::format::Pixel;

/// Reused encoder-input frame. Allocated once at the encoder's pixel format
/// and resolution; the converter overwrites the pixel data in place every
/// cycle and `stamp` assigns one presentation tick per frame.
///
/// The tick sequence increments by exactly one encoder-time-base unit per
/// stamped frame, never skipped and never duplicated, so the container sees
/// a strictly increasing timestamp per captured frame.
pub struct ConvertedFrame {
    frame: ffmpeg_next::frame::Video,
    next_pts: i64,
}

impl ConvertedFrame {
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            frame: ffmpeg_next::frame::Video::new(format, width, height),
            next_pts: 0,
        }
    }

    /// Assigns the next presentation tick to the buffered frame and returns it.
    pub fn stamp(&mut self) -> i64 {
        let pts = self.next_pts;
        self.frame.set_pts(Some(pts));
        self.next_pts += 1;
        pts
    }

    /// Ticks stamped so far; equals the number of frames pushed downstream.
    pub fn ticks(&self) -> i64 {
        self.next_pts
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }

    pub(crate) fn frame_mut(&mut self) -> &mut ffmpeg_next::frame::Video {
        &mut self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_ticks_by_one() {
        let mut frame = ConvertedFrame::new(Pixel::YUV420P, 64, 48);
        assert_eq!(frame.stamp(), 0);
        assert_eq!(frame.stamp(), 1);
        assert_eq!(frame.stamp(), 2);
        assert_eq!(frame.ticks(), 3);
        assert_eq!(frame.as_video().pts(), Some(2));
    }
}
