use std::path::PathBuf;
use std::time::Duration;

use crate::encoder::{H264Encoder, StreamSettings};
use crate::error::PipeError;
use crate::output::FlvWriter;
use crate::pipeline::{PipelineConfig, PipelineDriver, RetryPolicy};
use crate::probe::{probe, video_packet_timestamps};
use crate::source::{CameraSource, Capture, SourceConfig};
use crate::transport::{Sink, Transport};

fn settings(width: u32, height: u32, fps: u32) -> StreamSettings {
    StreamSettings {
        width,
        height,
        fps,
        bitrate: 300_000,
        ..StreamSettings::default()
    }
}

/// Finite lavfi test pattern producing exactly `frames` frames.
fn test_pattern(frames: u32, width: u32, height: u32, fps: u32) -> SourceConfig {
    SourceConfig::Virtual {
        graph: format!(
            "testsrc=duration={}:size={}x{}:rate={}",
            frames / fps,
            width,
            height,
            fps
        ),
    }
}

fn out_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("camcast_{}.flv", name));
    if path.exists() {
        std::fs::remove_file(&path).unwrap();
    }
    path
}

#[tokio::test]
async fn streams_virtual_source_to_flv_file() -> anyhow::Result<()> {
    crate::init()?;

    let path = out_path("stream_100");
    let config = PipelineConfig {
        source: test_pattern(100, 320, 240, 25),
        settings: settings(320, 240, 25),
        sink: Sink::parse(path.to_str().unwrap()),
    };

    let report = PipelineDriver::new(config, RetryPolicy::default())
        .run()
        .await?;

    assert_eq!(report.frames_captured, 100);
    assert_eq!(report.packets_written, 100);
    assert_eq!(report.sessions, 1);

    let info = probe(&path)?;
    assert_eq!(info.format_name, "flv");
    assert_eq!(info.nb_streams, 1);
    let video = info.video.expect("video stream");
    assert_eq!(video.codec, ffmpeg_next::codec::Id::H264);
    assert_eq!((video.width, video.height), (320, 240));

    // Every cycle produced exactly one packet and the container sees a
    // strictly increasing timestamp sequence.
    let timestamps = video_packet_timestamps(&path)?;
    assert_eq!(timestamps.len(), 100);
    assert!(
        timestamps.windows(2).all(|w| w[0] < w[1]),
        "timestamps not strictly increasing: {:?}",
        timestamps
    );
    Ok(())
}

#[tokio::test]
async fn rescales_to_target_resolution() -> anyhow::Result<()> {
    crate::init()?;

    let path = out_path("rescale");
    let config = PipelineConfig {
        source: test_pattern(20, 320, 240, 10),
        settings: settings(160, 120, 10),
        sink: Sink::parse(path.to_str().unwrap()),
    };

    let report = PipelineDriver::new(config, RetryPolicy::default())
        .run()
        .await?;
    assert_eq!(report.frames_captured, 20);

    let video = probe(&path)?.video.expect("video stream");
    assert_eq!((video.width, video.height), (160, 120));
    Ok(())
}

#[tokio::test]
async fn unavailable_device_fails_before_header() -> anyhow::Result<()> {
    crate::init()?;

    let path = out_path("no_device");
    let config = PipelineConfig {
        source: SourceConfig::Camera {
            index: 250,
            width: 640,
            height: 480,
            fps: 30,
        },
        settings: settings(640, 480, 30),
        sink: Sink::parse(path.to_str().unwrap()),
    };

    let err = PipelineDriver::new(config, RetryPolicy::default())
        .run()
        .await
        .expect_err("device 250 should not open");
    let fault = err
        .downcast_ref::<PipeError>()
        .expect("typed pipeline fault");
    assert_eq!(fault.stage(), "device");

    // The sink is dialed after the camera opens, so nothing was written.
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn cancel_drains_and_writes_trailer() -> anyhow::Result<()> {
    crate::init()?;

    let path = out_path("cancel");
    let config = PipelineConfig {
        // No duration: this source only stops when the driver is told to.
        source: SourceConfig::Virtual {
            graph: "testsrc=size=160x120:rate=30".to_string(),
        },
        settings: settings(160, 120, 30),
        sink: Sink::parse(path.to_str().unwrap()),
    };

    let driver = PipelineDriver::new(config, RetryPolicy::default());
    let cancel = driver.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let report = driver.run().await?;
    assert!(report.frames_captured > 0);
    assert_eq!(report.sessions, 1);

    let timestamps = video_packet_timestamps(&path)?;
    assert_eq!(timestamps.len() as u64, report.packets_written);
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn reopen_continues_capture() -> anyhow::Result<()> {
    crate::init()?;

    let config = SourceConfig::Virtual {
        graph: "testsrc=size=160x120:rate=30".to_string(),
    };
    let mut source = CameraSource::open(&config)?;

    for _ in 0..2 {
        match source.capture()? {
            Capture::Frame(frame) => assert_eq!(frame.width(), 160),
            Capture::End => panic!("infinite source ended"),
        }
    }

    source.reopen()?;
    match source.capture()? {
        Capture::Frame(frame) => assert_eq!(frame.height(), 120),
        Capture::End => panic!("infinite source ended after reopen"),
    }
    Ok(())
}

#[test]
fn parameter_sets_are_derived_and_deterministic() -> anyhow::Result<()> {
    crate::init()?;

    let settings = settings(320, 240, 25);
    let first = H264Encoder::open(&settings)?
        .extradata()
        .expect("global header side data");
    let second = H264Encoder::open(&settings)?
        .extradata()
        .expect("global header side data");

    assert!(!first.is_empty());
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn container_headers_are_byte_identical_across_runs() -> anyhow::Result<()> {
    crate::init()?;

    let mut headers = Vec::new();
    for name in ["determinism_a", "determinism_b"] {
        let path = out_path(name);
        let config = PipelineConfig {
            source: test_pattern(10, 160, 120, 10),
            settings: settings(160, 120, 10),
            sink: Sink::parse(path.to_str().unwrap()),
        };
        PipelineDriver::new(config, RetryPolicy::default())
            .run()
            .await?;
        let bytes = std::fs::read(&path)?;
        assert!(bytes.len() > 13);
        // FLV signature, version, type flags and header size.
        headers.push(bytes[..13].to_vec());
    }
    assert_eq!(headers[0], headers[1]);
    Ok(())
}

#[test]
fn header_and_trailer_are_written_once() -> anyhow::Result<()> {
    crate::init()?;

    let path = out_path("once");
    let settings = settings(160, 120, 10);
    let encoder = H264Encoder::open(&settings)?;
    let transport = Transport::connect(&Sink::parse(path.to_str().unwrap()))?;
    let mut writer = FlvWriter::new(transport, &settings, &encoder)?;

    assert!(!writer.header_written());
    writer.write_header()?;
    writer.write_header()?;
    assert!(writer.header_written());

    writer.write_trailer()?;
    writer.write_trailer()?;

    let info = probe(&path)?;
    assert_eq!(info.format_name, "flv");
    assert!(info.video.is_some());
    Ok(())
}
