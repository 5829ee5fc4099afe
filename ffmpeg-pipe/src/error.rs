use thiserror::Error;

/// Stage-level fault taxonomy. Each variant names the pipeline stage that
/// failed and carries the underlying FFmpeg cause when there is one.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("camera device: {context}")]
    Device {
        context: String,
        #[source]
        cause: Option<ffmpeg_next::Error>,
    },

    #[error("frame capture: {context}")]
    Capture {
        context: String,
        #[source]
        cause: Option<ffmpeg_next::Error>,
    },

    #[error("pixel conversion: {context}")]
    Conversion {
        context: String,
        #[source]
        cause: Option<ffmpeg_next::Error>,
    },

    #[error("h264 encoder: {context}")]
    Encoder {
        context: String,
        #[source]
        cause: Option<ffmpeg_next::Error>,
    },

    #[error("container writer: {context}")]
    Container {
        context: String,
        #[source]
        cause: Option<ffmpeg_next::Error>,
    },

    #[error("transport: {context}")]
    Transport {
        context: String,
        #[source]
        cause: Option<ffmpeg_next::Error>,
    },
}

/// What the driver may do about a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Re-open the capture device and continue the current session.
    RetryCapture,
    /// Tear down encoder/writer/transport and start a fresh session.
    Reinitialize,
    /// Not recoverable; surface to the operator.
    Fatal,
}

impl PipeError {
    pub(crate) fn device(context: impl Into<String>) -> Self {
        Self::Device { context: context.into(), cause: None }
    }

    pub(crate) fn device_io(context: impl Into<String>, cause: ffmpeg_next::Error) -> Self {
        Self::Device { context: context.into(), cause: Some(cause) }
    }

    pub(crate) fn capture(context: impl Into<String>) -> Self {
        Self::Capture { context: context.into(), cause: None }
    }

    pub(crate) fn capture_io(context: impl Into<String>, cause: ffmpeg_next::Error) -> Self {
        Self::Capture { context: context.into(), cause: Some(cause) }
    }

    pub(crate) fn conversion_io(context: impl Into<String>, cause: ffmpeg_next::Error) -> Self {
        Self::Conversion { context: context.into(), cause: Some(cause) }
    }

    pub(crate) fn encoder(context: impl Into<String>) -> Self {
        Self::Encoder { context: context.into(), cause: None }
    }

    pub(crate) fn encoder_io(context: impl Into<String>, cause: ffmpeg_next::Error) -> Self {
        Self::Encoder { context: context.into(), cause: Some(cause) }
    }

    pub(crate) fn container(context: impl Into<String>) -> Self {
        Self::Container { context: context.into(), cause: None }
    }

    pub(crate) fn container_io(context: impl Into<String>, cause: ffmpeg_next::Error) -> Self {
        Self::Container { context: context.into(), cause: Some(cause) }
    }

    pub(crate) fn transport(context: impl Into<String>) -> Self {
        Self::Transport { context: context.into(), cause: None }
    }

    pub(crate) fn transport_io(context: impl Into<String>, cause: ffmpeg_next::Error) -> Self {
        Self::Transport { context: context.into(), cause: Some(cause) }
    }

    /// The stage name, for operator-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            PipeError::Config(_) => "config",
            PipeError::Device { .. } => "device",
            PipeError::Capture { .. } => "capture",
            PipeError::Conversion { .. } => "conversion",
            PipeError::Encoder { .. } => "encoder",
            PipeError::Container { .. } => "container",
            PipeError::Transport { .. } => "transport",
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            PipeError::Capture { .. } => Recovery::RetryCapture,
            PipeError::Encoder { .. }
            | PipeError::Container { .. }
            | PipeError::Transport { .. } => Recovery::Reinitialize,
            PipeError::Config(_)
            | PipeError::Device { .. }
            | PipeError::Conversion { .. } => Recovery::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_classes() {
        assert_eq!(PipeError::capture("x").recovery(), Recovery::RetryCapture);
        assert_eq!(PipeError::encoder("x").recovery(), Recovery::Reinitialize);
        assert_eq!(PipeError::container("x").recovery(), Recovery::Reinitialize);
        assert_eq!(PipeError::transport("x").recovery(), Recovery::Reinitialize);
        assert_eq!(PipeError::device("x").recovery(), Recovery::Fatal);
        assert_eq!(
            PipeError::Config("bad".into()).recovery(),
            Recovery::Fatal
        );
    }

    #[test]
    fn display_names_the_stage() {
        let err = PipeError::capture("empty frame from device");
        assert_eq!(err.to_string(), "frame capture: empty frame from device");
        assert_eq!(err.stage(), "capture");
    }
}
