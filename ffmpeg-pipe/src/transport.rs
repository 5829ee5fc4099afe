use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use ffmpeg_next::{Dictionary, format};

use crate::error::PipeError;

/// How long a blocked socket write may stall before FFmpeg gives up on it,
/// in microseconds.
const WRITE_TIMEOUT_US: &str = "5000000";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Faulted,
}

/// Where the muxed stream goes. File sinks share the whole write path with
/// RTMP, which keeps capture-to-disk runs byte-comparable with live ones.
#[derive(Clone, Debug)]
pub enum Sink {
    Rtmp(String),
    File(PathBuf),
}

impl Sink {
    pub fn parse(uri: &str) -> Self {
        if uri.starts_with("rtmp://") || uri.starts_with("rtmps://") {
            Sink::Rtmp(uri.to_string())
        } else {
            Sink::File(PathBuf::from(uri))
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Sink::Rtmp(_))
    }
}

impl Display for Sink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Rtmp(url) => write!(f, "{}", url),
            Sink::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Owns the byte path to the sink: the FLV muxing context and, for RTMP, the
/// connected publish session underneath it. Dropping it closes the
/// underlying I/O exactly once.
pub struct Transport {
    output: format::context::Output,
    state: ConnectionState,
    sink: Sink,
}

impl Transport {
    /// Dials the sink and allocates the FLV context over it. The container
    /// header is the writer's job, not ours.
    pub fn connect(sink: &Sink) -> Result<Self, PipeError> {
        let output = match sink {
            Sink::Rtmp(url) => {
                let mut opts = Dictionary::new();
                opts.set("rw_timeout", WRITE_TIMEOUT_US);
                format::output_as_with(url, "flv", opts)
            }
            Sink::File(path) => format::output_as(path, "flv"),
        }
        .map_err(|e| PipeError::transport_io(format!("connecting to {}", sink), e))?;

        log::info!("transport connected: {}", sink);
        Ok(Self {
            output,
            state: ConnectionState::Connected,
            sink: sink.clone(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub(crate) fn fault(&mut self) {
        self.state = ConnectionState::Faulted;
    }

    pub(crate) fn output(&self) -> &format::context::Output {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut format::context::Output {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_uris() {
        assert!(matches!(Sink::parse("rtmp://host/live/key"), Sink::Rtmp(_)));
        assert!(matches!(Sink::parse("rtmps://host/live/key"), Sink::Rtmp(_)));
        assert!(matches!(Sink::parse("/tmp/out.flv"), Sink::File(_)));
        assert!(matches!(Sink::parse("relative.flv"), Sink::File(_)));
    }

    #[test]
    fn network_flag() {
        assert!(Sink::parse("rtmp://host/live/key").is_network());
        assert!(!Sink::parse("out.flv").is_network());
    }
}
