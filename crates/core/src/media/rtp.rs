/// Size of the RTP fixed header in bytes.
pub const RTP_HEADER_LEN: usize = 12;

/// Per-stream RTP state and fixed header builder (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// One instance exists per elementary stream and lives as long as its
/// packetizer, so SSRC and sequence numbering stay continuous across
/// encoder restarts.
///
/// - **Sequence number**: 16-bit, wrapping, +1 for every written header.
/// - **Timestamp**: derived from the producer's microsecond clock and the
///   stream's clock rate; stored as u64, the lower 32 bits go on the wire.
/// - **SSRC**: fixed for the lifetime of the stream.
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    clock_rate: u32,
    sequence: u16,
    timestamp: u64,
}

impl RtpHeader {
    /// Create header state with explicit SSRC and initial sequence number.
    pub fn new(pt: u8, clock_rate: u32, ssrc: u32, sequence: u16) -> Self {
        tracing::debug!(
            pt,
            clock_rate,
            ssrc = format_args!("{:#010X}", ssrc),
            sequence,
            "RTP stream state created"
        );
        Self {
            pt,
            ssrc,
            clock_rate,
            sequence,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC and a random initial sequence number.
    ///
    /// Per RFC 3550 §5.1 and §8.1 both should be unpredictable.
    pub fn random(pt: u8, clock_rate: u32) -> Self {
        Self::new(pt, clock_rate, rand::random::<u32>(), rand::random::<u16>())
    }

    /// Sequence number the next [`write`](Self::write) call will use.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Last timestamp set via [`set_timestamp_micros`](Self::set_timestamp_micros),
    /// in clock-rate units.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Convert a presentation time in microseconds to this stream's clock
    /// and retain it as the last-known timestamp.
    ///
    /// Integer truncation: `micros * clock_rate / 1_000_000`.
    pub fn set_timestamp_micros(&mut self, micros: u64) -> u64 {
        self.timestamp = micros_to_rtp(micros, self.clock_rate);
        self.timestamp
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence number.
    ///
    /// The `marker` bit (RFC 3550 §5.1) flags the last packet of a unit.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_LEN] {
        let first_byte: u8 = 2 << 6;
        let second_byte: u8 = ((marker as u8) << 7) | (self.pt & 0x7f);

        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&(self.timestamp as u32).to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }
}

/// `micros * clock_rate / 1_000_000`, computed without intermediate overflow.
pub fn micros_to_rtp(micros: u64, clock_rate: u32) -> u64 {
    (u128::from(micros) * u128::from(clock_rate) / 1_000_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> RtpHeader {
        RtpHeader::new(96, 90_000, 0xAABBCCDD, 0)
    }

    #[test]
    fn first_byte_is_0x80() {
        let mut h = make_header();
        let buf = h.write(false);
        assert_eq!(buf[0], 0x80);
    }

    #[test]
    fn marker_bit() {
        let mut h = make_header();
        let no_marker = h.write(false);
        assert_eq!(no_marker[1] & 0x80, 0);

        let with_marker = h.write(true);
        assert_eq!(with_marker[1] & 0x80, 0x80);
    }

    #[test]
    fn payload_type() {
        let mut h = make_header();
        let buf = h.write(false);
        assert_eq!(buf[1] & 0x7f, 96);
    }

    #[test]
    fn sequence_increments() {
        let mut h = RtpHeader::new(96, 90_000, 1, 41);
        let b1 = h.write(false);
        let b2 = h.write(false);
        assert_eq!(u16::from_be_bytes([b1[2], b1[3]]), 41);
        assert_eq!(u16::from_be_bytes([b2[2], b2[3]]), 42);
    }

    #[test]
    fn sequence_wraps() {
        let mut h = RtpHeader::new(96, 90_000, 1, u16::MAX);
        let buf = h.write(false);
        let seq = u16::from_be_bytes([buf[2], buf[3]]);
        assert_eq!(seq, u16::MAX);
        assert_eq!(h.sequence(), 0);
    }

    #[test]
    fn ssrc_written() {
        let mut h = make_header();
        let buf = h.write(false);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        assert_eq!(ssrc, 0xAABBCCDD);
    }

    #[test]
    fn video_clock_conversion() {
        let mut h = make_header();
        assert_eq!(h.set_timestamp_micros(0), 0);
        assert_eq!(h.set_timestamp_micros(1_000_000), 90_000);
        assert_eq!(h.set_timestamp_micros(2_000_000), 180_000);
        // 11 µs * 90 / 1000 = 0.99 -> truncated
        assert_eq!(h.set_timestamp_micros(11), 0);
    }

    #[test]
    fn timestamp_written_truncated_to_32_bits() {
        let mut h = make_header();
        // 2^32 + 5 ticks at 90 kHz
        let micros = ((1u64 << 32) + 5) * 1_000_000 / 90_000 + 1;
        h.set_timestamp_micros(micros);
        let buf = h.write(true);
        let ts = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(ts, h.timestamp() as u32);
    }

    #[test]
    fn audio_clock_conversion() {
        assert_eq!(micros_to_rtp(1_000_000, 48_000), 48_000);
        assert_eq!(micros_to_rtp(21_333, 48_000), 1023);
    }

    #[test]
    fn random_ssrc_differs() {
        let h1 = RtpHeader::random(96, 90_000);
        let h2 = RtpHeader::random(96, 90_000);
        assert_ne!(h1.ssrc, h2.ssrc);
    }
}
