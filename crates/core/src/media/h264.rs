use super::nal::strip_start_code;
use super::rtp::{RTP_HEADER_LEN, RtpHeader};
use super::{DEFAULT_MTU, Packetizer};

/// Conventional dynamic payload type for the video track.
pub const H264_PAYLOAD_TYPE: u8 = 96;

/// 90 kHz clock rate per RFC 6184 §8.1.
pub const H264_CLOCK_RATE: u32 = 90_000;

/// FU indicator + FU header.
const FU_A_HEADER_LEN: usize = 2;

/// NAL unit type of an FU-A fragment (RFC 6184 §5.8).
const FU_A_TYPE: u8 = 28;

/// H.264 RTP packetizer (RFC 6184, packetization-mode=1).
///
/// Takes one NAL unit at a time, optionally prefixed by an Annex B start
/// code, and produces the RTP packets carrying it:
///
/// - **Single NAL Unit** (§5.6): a NAL that fits within `MTU - 12` bytes
///   is sent as-is (12-byte header + NAL bytes), marker bit set.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across several
///   packets. Each fragment carries a 2-byte FU header before its slice of
///   the NAL payload:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 12 - 2 bytes)
///   ```
///
///   The original NAL header byte is not repeated; its F/NRI bits move to
///   the FU indicator and its type to the FU header. Only the final
///   fragment carries the marker bit.
///
/// Packets must be sent in the returned order.
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    mtu: usize,
}

impl H264Packetizer {
    /// Create with explicit payload type, SSRC, and initial sequence number.
    pub fn new(pt: u8, ssrc: u32, sequence: u16) -> Self {
        Self {
            header: RtpHeader::new(pt, H264_CLOCK_RATE, ssrc, sequence),
            mtu: DEFAULT_MTU,
        }
    }

    /// Create with random SSRC and initial sequence number (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::random(pt, H264_CLOCK_RATE),
            mtu: DEFAULT_MTU,
        }
    }

    /// Largest NAL (after start-code removal) sent as a single packet.
    pub fn max_single_nal(&self) -> usize {
        self.mtu - RTP_HEADER_LEN
    }

    /// Largest slice of NAL payload carried by one FU-A fragment.
    pub fn max_fragment_payload(&self) -> usize {
        self.mtu - RTP_HEADER_LEN - FU_A_HEADER_LEN
    }

    /// Packetize one NAL unit stamped with a presentation time in microseconds.
    ///
    /// Accepts a 4-byte start code, a 3-byte start code, or none; all three
    /// produce identical payload bytes. An empty NAL yields no packets.
    pub fn packetize_nal(&mut self, nal_unit: &[u8], timestamp_micros: u64) -> Vec<Vec<u8>> {
        self.header.set_timestamp_micros(timestamp_micros);

        let payload = strip_start_code(nal_unit);
        if payload.is_empty() {
            return Vec::new();
        }

        if payload.len() <= self.max_single_nal() {
            let hdr = self.header.write(true);
            let mut packet = Vec::with_capacity(RTP_HEADER_LEN + payload.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(payload);
            return vec![packet];
        }

        self.fragment(payload)
    }

    /// FU-A fragmentation (RFC 6184 §5.8).
    fn fragment(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        let nal_header = payload[0];
        let nal_type = nal_header & 0x1f;
        let nri = nal_header & 0x60;
        let fu_indicator = nri | FU_A_TYPE;

        let body = &payload[1..];
        let max_fragment = self.max_fragment_payload();
        let mut packets = Vec::with_capacity(body.len().div_ceil(max_fragment));
        let mut offset = 0usize;

        while offset < body.len() {
            let chunk_size = max_fragment.min(body.len() - offset);
            let first = offset == 0;
            let last = offset + chunk_size >= body.len();

            // FU header: S=start, E=end, R=0, Type=original NAL type
            let start_bit = if first { 0x80 } else { 0x00 };
            let end_bit = if last { 0x40 } else { 0x00 };
            let fu_header = start_bit | end_bit | nal_type;

            let hdr = self.header.write(last);
            let mut packet = Vec::with_capacity(RTP_HEADER_LEN + FU_A_HEADER_LEN + chunk_size);
            packet.extend_from_slice(&hdr);
            packet.push(fu_indicator);
            packet.push(fu_header);
            packet.extend_from_slice(&body[offset..offset + chunk_size]);
            packets.push(packet);

            offset += chunk_size;
        }

        tracing::trace!(
            nal_type,
            nal_size = payload.len(),
            fragments = packets.len(),
            "FU-A fragmented NAL unit"
        );

        packets
    }
}

impl Packetizer for H264Packetizer {
    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn last_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}
