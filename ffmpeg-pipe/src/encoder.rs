use std::str::FromStr;

use bytes::Bytes;
use ffmpeg_next::{Dictionary, Rational, codec};

use crate::error::PipeError;
use crate::packet::EncodedPacket;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum H264Profile {
    Baseline,
    Main,
    #[default]
    High,
    High10,
    High422,
    High444,
}

impl H264Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            H264Profile::Baseline => "baseline",
            H264Profile::Main => "main",
            H264Profile::High => "high",
            H264Profile::High10 => "high10",
            H264Profile::High422 => "high422",
            H264Profile::High444 => "high444",
        }
    }
}

impl FromStr for H264Profile {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(H264Profile::Baseline),
            "main" => Ok(H264Profile::Main),
            "high" => Ok(H264Profile::High),
            "high10" => Ok(H264Profile::High10),
            "high422" => Ok(H264Profile::High422),
            "high444" => Ok(H264Profile::High444),
            other => Err(PipeError::Config(format!(
                "unknown h264 profile {:?}, expected one of baseline|main|high|high10|high422|high444",
                other
            ))),
        }
    }
}

/// Static stream configuration, fixed for the lifetime of a session. The
/// parameter sets the encoder derives from these values are attached to the
/// container before its header is written and never change afterwards.
#[derive(Clone, Debug)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate: usize,
    /// Keyframe interval in frames.
    pub gop: u32,
    pub profile: H264Profile,
    pub preset: String,
    pub tune: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fps: 30,
            bitrate: 400_000,
            gop: 12,
            profile: H264Profile::default(),
            preset: "superfast".to_string(),
            tune: "zerolatency".to_string(),
        }
    }
}

impl StreamSettings {
    pub fn pixel_format(&self) -> ffmpeg_next::format::Pixel {
        ffmpeg_next::format::Pixel::YUV420P
    }

    /// Encoder time base: one tick per frame.
    pub fn time_base(&self) -> Rational {
        Rational(1, self.fps as i32)
    }

    fn x264_options(&self) -> Dictionary<'static> {
        let mut opts = Dictionary::new();
        opts.set("profile", self.profile.as_str());
        opts.set("preset", &self.preset);
        opts.set("tune", &self.tune);
        opts
    }

    fn validate(&self) -> Result<(), PipeError> {
        if self.width == 0 || self.height == 0 {
            return Err(PipeError::Config(format!(
                "invalid resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(PipeError::Config("frame rate must be positive".into()));
        }
        Ok(())
    }
}

/// A live libx264 session bound to one `StreamSettings`. An encode call may
/// yield no packet while the codec fills internal buffers; `send_eof` plus
/// draining `receive` until `None` flushes the remainder at end of stream.
pub struct H264Encoder {
    inner: codec::encoder::Video,
    time_base: Rational,
}

impl H264Encoder {
    pub fn open(settings: &StreamSettings) -> Result<Self, PipeError> {
        settings.validate()?;

        let codec = ffmpeg_next::encoder::find_by_name("libx264")
            .ok_or_else(|| PipeError::encoder("libx264 not available in this ffmpeg build"))?;
        let ctx = codec::Context::new_with_codec(codec);
        let mut video = ctx
            .encoder()
            .video()
            .map_err(|e| PipeError::encoder_io("allocating encoder context", e))?;

        video.set_width(settings.width);
        video.set_height(settings.height);
        video.set_format(settings.pixel_format());
        video.set_frame_rate(Some(Rational(settings.fps as i32, 1)));
        video.set_time_base(settings.time_base());
        video.set_bit_rate(settings.bitrate);
        video.set_gop(settings.gop);
        video.set_max_b_frames(0);
        // FLV carries parameter sets in the codec configuration record, not
        // inline in the bitstream.
        video.set_flags(codec::Flags::GLOBAL_HEADER);

        let opened = video
            .open_with(settings.x264_options())
            .map_err(|e| PipeError::encoder_io("opening libx264 session", e))?;

        let time_base: Rational = unsafe { (*opened.0.as_ptr()).time_base.into() };

        let encoder = Self { inner: opened, time_base };
        log::info!(
            "encoder open: libx264 {}x{}@{} {}bps profile={} preset={} tune={} ({} bytes side data)",
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate,
            settings.profile.as_str(),
            settings.preset,
            settings.tune,
            encoder.extradata().map(|d| d.len()).unwrap_or(0),
        );
        Ok(encoder)
    }

    pub fn send(&mut self, frame: &ffmpeg_next::frame::Video) -> Result<(), PipeError> {
        self.inner
            .send_frame(frame)
            .map_err(|e| PipeError::encoder_io("sending frame to encoder", e))
    }

    pub fn send_eof(&mut self) -> Result<(), PipeError> {
        self.inner
            .send_eof()
            .map_err(|e| PipeError::encoder_io("signalling end of stream", e))
    }

    /// Next buffered access unit, or `None` when the codec has nothing ready.
    pub fn receive(&mut self) -> Result<Option<EncodedPacket>, PipeError> {
        let mut packet = codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => {
                let mut packet = EncodedPacket::new(packet, self.time_base);
                // One frame lasts one tick of the 1/fps encoder time base.
                packet.set_duration(1);
                Ok(Some(packet))
            }
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => Err(PipeError::encoder_io("receiving packet from encoder", e)),
        }
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Parameter-set side data (the AVC configuration record) produced when
    /// the session opened with a global header.
    pub fn extradata(&self) -> Option<Bytes> {
        unsafe {
            let ctx = self.inner.0.as_ptr();
            let ptr = (*ctx).extradata;
            let len = (*ctx).extradata_size;
            if ptr.is_null() || len <= 0 {
                None
            } else {
                Some(Bytes::copy_from_slice(std::slice::from_raw_parts(
                    ptr,
                    len as usize,
                )))
            }
        }
    }

    pub(crate) fn as_video(&self) -> &codec::encoder::Video {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_round_trip() {
        for name in ["baseline", "main", "high", "high10", "high422", "high444"] {
            let profile: H264Profile = name.parse().unwrap();
            assert_eq!(profile.as_str(), name);
        }
    }

    #[test]
    fn unknown_profile_is_a_config_error() {
        let err = "ultra".parse::<H264Profile>().unwrap_err();
        assert!(matches!(err, PipeError::Config(_)));
    }

    #[test]
    fn settings_reject_zero_dimensions() {
        let settings = StreamSettings { width: 0, ..StreamSettings::default() };
        assert!(settings.validate().is_err());

        let settings = StreamSettings { fps: 0, ..StreamSettings::default() };
        assert!(settings.validate().is_err());
    }
}
