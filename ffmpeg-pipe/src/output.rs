use ffmpeg_next::codec;

use crate::encoder::{H264Encoder, StreamSettings};
use crate::error::PipeError;
use crate::packet::EncodedPacket;
use crate::transport::{ConnectionState, Transport};

/// FLV muxer over an established transport. Owns the container lifecycle:
/// codec parameters (parameter-set side data included) attached exactly once
/// before the header, one header, strictly increasing packet timestamps,
/// one trailer on clean shutdown.
pub struct FlvWriter {
    transport: Transport,
    have_written_header: bool,
    have_written_trailer: bool,
    last_ts: Option<i64>,
    packets_written: u64,
}

impl FlvWriter {
    /// Adds the single video stream and copies the open encoder's codec
    /// parameters onto it, AVC configuration record included. Must run
    /// before `write_header`; afterwards the stream metadata is frozen.
    pub fn new(
        mut transport: Transport,
        settings: &StreamSettings,
        encoder: &H264Encoder,
    ) -> Result<Self, PipeError> {
        if encoder.extradata().is_none() {
            return Err(PipeError::container(
                "encoder produced no parameter sets for the stream header",
            ));
        }

        let codec = ffmpeg_next::encoder::find(codec::Id::H264);
        let mut stream = transport
            .output_mut()
            .add_stream(codec)
            .map_err(|e| PipeError::container_io("adding video stream", e))?;
        stream.set_parameters(encoder.as_video());

        log::debug!(
            "flv stream configured: {}x{}@{}, time base {:?}",
            settings.width,
            settings.height,
            settings.fps,
            settings.time_base(),
        );

        Ok(Self {
            transport,
            have_written_header: false,
            have_written_trailer: false,
            last_ts: None,
            packets_written: 0,
        })
    }

    pub fn write_header(&mut self) -> Result<(), PipeError> {
        if self.have_written_header {
            return Ok(());
        }
        let written = if self.transport.sink().is_network() {
            // Live sink: never seek back to patch duration/filesize.
            let mut opts = ffmpeg_next::Dictionary::new();
            opts.set("flvflags", "no_duration_filesize");
            self.transport.output_mut().write_header_with(opts).map(|_| ())
        } else {
            self.transport.output_mut().write_header()
        };
        written.map_err(|e| PipeError::container_io("writing container header", e))?;
        self.have_written_header = true;
        log::info!("container header written to {}", self.transport.sink());
        Ok(())
    }

    /// Rescales the packet from encoder time base to the container's and
    /// hands it to the interleaved write path. Timestamps must be strictly
    /// increasing; a violation is an upstream contract breach and is
    /// rejected, not repaired.
    pub fn write_packet(&mut self, mut packet: EncodedPacket) -> Result<(), PipeError> {
        if !self.have_written_header {
            return Err(PipeError::container("packet written before header"));
        }
        if self.transport.state() != ConnectionState::Connected {
            return Err(PipeError::transport("sink is not connected"));
        }

        log::trace!(
            "packet: pts {:?} dts {:?} {} bytes{}",
            packet.pts(),
            packet.dts(),
            packet.size(),
            if packet.is_key() { " [key]" } else { "" }
        );

        let source_tb = packet.time_base();
        let stream_tb = self
            .transport
            .output()
            .stream(0)
            .ok_or_else(|| PipeError::container("output stream missing"))?
            .time_base();

        let p = packet.get_mut();
        p.set_stream(0);
        p.set_position(-1);
        p.rescale_ts(source_tb, stream_tb);

        let ts = p.dts().or(p.pts());
        if let (Some(previous), Some(current)) = (self.last_ts, ts) {
            if current <= previous {
                return Err(PipeError::container(format!(
                    "non-monotonic timestamp {} after {}",
                    current, previous
                )));
            }
        }

        match p.write_interleaved(self.transport.output_mut()) {
            Ok(()) => {
                if ts.is_some() {
                    self.last_ts = ts;
                }
                self.packets_written += 1;
                Ok(())
            }
            Err(e) => {
                if self.transport.sink().is_network() {
                    self.transport.fault();
                    Err(PipeError::transport_io("writing packet to sink", e))
                } else {
                    Err(PipeError::container_io("writing packet to sink", e))
                }
            }
        }
    }

    pub fn write_trailer(&mut self) -> Result<(), PipeError> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.transport
                .output_mut()
                .write_trailer()
                .map_err(|e| PipeError::container_io("writing container trailer", e))?;
            log::info!(
                "container trailer written after {} packets",
                self.packets_written
            );
        }
        Ok(())
    }

    pub fn header_written(&self) -> bool {
        self.have_written_header
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }
}
