use std::env;

use anyhow::Context;

use ffmpeg_pipe::encoder::{H264Profile, StreamSettings};
use ffmpeg_pipe::pipeline::{PipelineConfig, RetryPolicy};
use ffmpeg_pipe::source::SourceConfig;
use ffmpeg_pipe::transport::Sink;

/// Runtime configuration. Argument parsing lives outside this program;
/// values arrive through `CAMCAST_*` environment variables, with defaults
/// for everything.
#[derive(Clone, Debug)]
pub struct Config {
    pub device: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: usize,
    pub profile: H264Profile,
    pub output: String,
    pub verbose: bool,
    pub capture_retries: u32,
    pub reconnects: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: 0,
            width: 800,
            height: 600,
            fps: 30,
            bitrate: 400_000,
            profile: H264Profile::default(),
            output: "rtmp://localhost/live/stream".to_string(),
            verbose: false,
            capture_retries: 3,
            reconnects: 0,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Config::default();
        Ok(Self {
            device: parsed(&get, "CAMCAST_DEVICE")?.unwrap_or(defaults.device),
            width: parsed(&get, "CAMCAST_WIDTH")?.unwrap_or(defaults.width),
            height: parsed(&get, "CAMCAST_HEIGHT")?.unwrap_or(defaults.height),
            fps: parsed(&get, "CAMCAST_FPS")?.unwrap_or(defaults.fps),
            bitrate: parsed(&get, "CAMCAST_BITRATE")?.unwrap_or(defaults.bitrate),
            profile: match get("CAMCAST_PROFILE") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("CAMCAST_PROFILE={:?}", raw))?,
                None => defaults.profile,
            },
            output: get("CAMCAST_OUTPUT").unwrap_or(defaults.output),
            verbose: flag(&get, "CAMCAST_VERBOSE"),
            capture_retries: parsed(&get, "CAMCAST_CAPTURE_RETRIES")?
                .unwrap_or(defaults.capture_retries),
            reconnects: parsed(&get, "CAMCAST_RECONNECTS")?.unwrap_or(defaults.reconnects),
        })
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            source: SourceConfig::Camera {
                index: self.device,
                width: self.width,
                height: self.height,
                fps: self.fps,
            },
            settings: StreamSettings {
                width: self.width,
                height: self.height,
                fps: self.fps,
                bitrate: self.bitrate,
                profile: self.profile,
                ..StreamSettings::default()
            },
            sink: Sink::parse(&self.output),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_capture_reopens: self.capture_retries,
            max_reconnects: self.reconnects,
            ..RetryPolicy::default()
        }
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{}={:?}", key, raw)),
        None => Ok(None),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    matches!(
        get(key).as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.device, 0);
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.fps, 30);
        assert_eq!(config.bitrate, 400_000);
        assert_eq!(config.profile, H264Profile::High);
        assert_eq!(config.output, "rtmp://localhost/live/stream");
        assert!(!config.verbose);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("CAMCAST_DEVICE", "2"),
            ("CAMCAST_WIDTH", "1280"),
            ("CAMCAST_HEIGHT", "720"),
            ("CAMCAST_FPS", "60"),
            ("CAMCAST_BITRATE", "2500000"),
            ("CAMCAST_PROFILE", "main"),
            ("CAMCAST_OUTPUT", "rtmp://ingest/live/key"),
            ("CAMCAST_VERBOSE", "1"),
            ("CAMCAST_RECONNECTS", "5"),
        ])
        .unwrap();
        assert_eq!(config.device, 2);
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.fps, 60);
        assert_eq!(config.bitrate, 2_500_000);
        assert_eq!(config.profile, H264Profile::Main);
        assert!(config.verbose);
        assert_eq!(config.retry_policy().max_reconnects, 5);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config_from(&[("CAMCAST_FPS", "fast")]).is_err());
        assert!(config_from(&[("CAMCAST_PROFILE", "ultra")]).is_err());
    }
}
