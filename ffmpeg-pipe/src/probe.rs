//! Container inspection helpers, used by the test suite to verify muxed
//! output by re-opening it with FFmpeg.

use std::path::Path;

use ffmpeg_next::media;

#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: ffmpeg_next::codec::Id,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// Demuxer name, e.g. "flv".
    pub format_name: String,
    pub nb_streams: u32,
    pub video: Option<VideoStreamInfo>,
}

pub fn probe<P: AsRef<Path>>(path: P) -> anyhow::Result<MediaInfo> {
    let input = ffmpeg_next::format::input(&path)?;
    let format_name = input.format().name().to_string();
    let nb_streams = input.nb_streams();

    let video = input.streams().best(media::Type::Video).map(|stream| {
        let parameters = stream.parameters();
        let (width, height) = unsafe {
            let ptr = parameters.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
            ((*ptr).width.max(0) as u32, (*ptr).height.max(0) as u32)
        };
        VideoStreamInfo {
            index: stream.index(),
            codec: parameters.id(),
            width,
            height,
        }
    });

    Ok(MediaInfo {
        format_name,
        nb_streams,
        video,
    })
}

/// Container-time-base timestamps (dts, falling back to pts) of every video
/// packet, in file order.
pub fn video_packet_timestamps<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<i64>> {
    let mut input = ffmpeg_next::format::input(&path)?;
    let video_index = input
        .streams()
        .best(media::Type::Video)
        .map(|s| s.index())
        .ok_or_else(|| anyhow::anyhow!("no video stream in {:?}", path.as_ref()))?;

    let mut timestamps = Vec::new();
    for (stream, packet) in input.packets() {
        if stream.index() != video_index {
            continue;
        }
        if let Some(ts) = packet.dts().or(packet.pts()) {
            timestamps.push(ts);
        }
    }
    Ok(timestamps)
}
