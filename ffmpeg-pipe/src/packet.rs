use bytes::Bytes;
use ffmpeg_next::Rational;

/// One compressed access unit together with the time base its timestamps
/// are expressed in. Produced by the encoder, consumed (and retimed) by the
/// container writer; nothing retains it past the write.
pub struct EncodedPacket {
    packet: ffmpeg_next::codec::packet::Packet,
    time_base: Rational,
}

impl EncodedPacket {
    pub(crate) fn new(packet: ffmpeg_next::codec::packet::Packet, time_base: Rational) -> Self {
        Self { packet, time_base }
    }

    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub(crate) fn set_duration(&mut self, duration: i64) {
        self.packet.set_duration(duration);
    }

    pub(crate) fn get_mut(&mut self) -> &mut ffmpeg_next::codec::packet::Packet {
        &mut self.packet
    }
}
