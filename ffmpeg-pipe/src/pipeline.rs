use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::encoder::{H264Encoder, StreamSettings};
use crate::error::{PipeError, Recovery};
use crate::frame::ConvertedFrame;
use crate::output::FlvWriter;
use crate::scaler::Converter;
use crate::source::{CameraSource, Capture, SourceConfig};
use crate::transport::{Sink, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeState {
    Idle,
    Initializing,
    Streaming,
    Draining,
    Faulted,
    Terminated,
}

/// Fault recovery limits for a running pipeline.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Consecutive capture-fault device re-opens before the fault escalates.
    pub max_capture_reopens: u32,
    /// Full session re-initializations after an encoder/container/transport
    /// fault. Zero means a lost sink ends the process: nothing buffers
    /// frames across an outage.
    pub max_reconnects: u32,
    /// Pause before each re-open or re-initialization attempt.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_capture_reopens: 3,
            max_reconnects: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub settings: StreamSettings,
    pub sink: Sink,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineReport {
    pub frames_captured: u64,
    pub packets_written: u64,
    pub sessions: u32,
}

/// Drives capture -> convert -> encode -> mux -> transmit, one cycle at a
/// time, until cancelled, the source ends, or a fault exhausts the policy.
pub struct PipelineDriver {
    config: PipelineConfig,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, policy: RetryPolicy) -> Self {
        Self {
            config,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that requests a stop; observed between cycles, never mid-cycle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the pipeline to completion on a blocking worker thread.
    pub async fn run(self) -> anyhow::Result<PipelineReport> {
        let Self { config, policy, cancel } = self;
        let report =
            tokio::task::spawn_blocking(move || run_blocking(&config, &policy, &cancel)).await??;
        Ok(report)
    }
}

/// One session's stateful tail: encoder, muxer and the reused encoder-input
/// frame whose tick counter is the session's timestamp source.
struct Session {
    encoder: H264Encoder,
    writer: FlvWriter,
    scratch: ConvertedFrame,
}

fn open_session(config: &PipelineConfig) -> Result<Session, PipeError> {
    let encoder = H264Encoder::open(&config.settings)?;
    let transport = Transport::connect(&config.sink)?;
    let mut writer = FlvWriter::new(transport, &config.settings, &encoder)?;
    writer.write_header()?;

    let scratch = ConvertedFrame::new(
        config.settings.pixel_format(),
        config.settings.width,
        config.settings.height,
    );
    Ok(Session { encoder, writer, scratch })
}

enum CycleOutcome {
    Streamed,
    SourceEnded,
}

fn cycle(
    source: &mut CameraSource,
    converter: &mut Converter,
    session: &mut Session,
) -> Result<CycleOutcome, PipeError> {
    let raw = match source.capture()? {
        Capture::Frame(frame) => frame,
        Capture::End => return Ok(CycleOutcome::SourceEnded),
    };

    converter.convert(raw, session.scratch.frame_mut())?;
    session.scratch.stamp();

    session.encoder.send(session.scratch.as_video())?;
    while let Some(packet) = session.encoder.receive()? {
        session.writer.write_packet(packet)?;
    }
    Ok(CycleOutcome::Streamed)
}

/// Flushes the encoder's buffered packets through the writer, then closes
/// the container. Only called on a clean stop.
fn drain(session: &mut Session) -> Result<(), PipeError> {
    session.encoder.send_eof()?;
    while let Some(packet) = session.encoder.receive()? {
        session.writer.write_packet(packet)?;
    }
    session.writer.write_trailer()
}

fn transition(state: &mut PipeState, to: PipeState) {
    log::debug!("pipeline state {:?} -> {:?}", *state, to);
    *state = to;
}

fn run_blocking(
    config: &PipelineConfig,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<PipelineReport, PipeError> {
    let mut state = PipeState::Idle;
    let mut report = PipelineReport::default();

    transition(&mut state, PipeState::Initializing);

    // The camera outlives sessions: a sink reconnect reuses the open device.
    let mut source = CameraSource::open(&config.source)?;
    let mut converter = Converter::new(
        source.pixel_format(),
        source.width(),
        source.height(),
        config.settings.pixel_format(),
        config.settings.width,
        config.settings.height,
    )?;

    let mut reconnects = 0u32;

    'session: loop {
        let mut session = match open_session(config) {
            Ok(session) => session,
            Err(e) if report.sessions == 0 => return Err(e),
            Err(e) => {
                reconnects += 1;
                if reconnects > policy.max_reconnects {
                    return Err(e);
                }
                log::warn!(
                    "session rebuild failed ({}), retry {}/{} in {:?}",
                    e,
                    reconnects,
                    policy.max_reconnects,
                    policy.retry_delay
                );
                std::thread::sleep(policy.retry_delay);
                continue 'session;
            }
        };
        report.sessions += 1;
        transition(&mut state, PipeState::Streaming);

        let mut capture_failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                transition(&mut state, PipeState::Draining);
                drain(&mut session)?;
                report.packets_written += session.writer.packets_written();
                transition(&mut state, PipeState::Terminated);
                return Ok(report);
            }

            let fault = match cycle(&mut source, &mut converter, &mut session) {
                Ok(CycleOutcome::Streamed) => {
                    report.frames_captured += 1;
                    capture_failures = 0;
                    continue;
                }
                Ok(CycleOutcome::SourceEnded) => {
                    transition(&mut state, PipeState::Draining);
                    drain(&mut session)?;
                    report.packets_written += session.writer.packets_written();
                    transition(&mut state, PipeState::Terminated);
                    return Ok(report);
                }
                Err(e) => e,
            };

            match fault.recovery() {
                Recovery::RetryCapture => {
                    capture_failures += 1;
                    if capture_failures > policy.max_capture_reopens {
                        log::error!(
                            "capture stage exhausted {} re-opens",
                            policy.max_capture_reopens
                        );
                        return Err(fault);
                    }
                    log::warn!(
                        "capture fault ({}), re-open {}/{}",
                        fault,
                        capture_failures,
                        policy.max_capture_reopens
                    );
                    std::thread::sleep(policy.retry_delay);
                    if let Err(e) = source.reopen() {
                        log::warn!("device re-open failed: {}", e);
                    }
                    // Header stays, timestamps continue: still the same session.
                }
                Recovery::Reinitialize => {
                    transition(&mut state, PipeState::Faulted);
                    report.packets_written += session.writer.packets_written();
                    drop(session);
                    reconnects += 1;
                    if reconnects > policy.max_reconnects {
                        return Err(fault);
                    }
                    log::warn!(
                        "{} fault ({}), rebuilding session {}/{}",
                        fault.stage(),
                        fault,
                        reconnects,
                        policy.max_reconnects
                    );
                    std::thread::sleep(policy.retry_delay);
                    continue 'session;
                }
                Recovery::Fatal => return Err(fault),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_aborts_on_lost_sink() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_reconnects, 0);
        assert_eq!(policy.max_capture_reopens, 3);
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
