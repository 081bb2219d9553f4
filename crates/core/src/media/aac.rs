use super::rtp::{RTP_HEADER_LEN, RtpHeader};
use super::{DEFAULT_MTU, Packetizer};
use crate::error::{Result, RtspError};

/// Conventional dynamic payload type for the audio track.
pub const AAC_PAYLOAD_TYPE: u8 = 97;

/// AU-headers-length field (16 bits) + one AU-header (16 bits).
const AU_HEADER_SECTION_LEN: usize = 4;

/// Bit length of the single AU-header that follows AU-headers-length.
const AU_HEADERS_LENGTH_BITS: u16 = 16;

/// `sizelength=13` in the SDP fmtp line.
const AU_SIZE_MAX: usize = (1 << 13) - 1;

/// AAC RTP packetizer (RFC 3640, mode=AAC-hbr).
///
/// Every access unit travels in its own RTP packet; there is no
/// multi-AU aggregation and no fragmentation:
///
/// ```text
/// +------------+--------------------+-----------+---------------+
/// | RTP header | AU-headers-length  | AU-header | raw AAC frame |
/// |  12 bytes  |  16 bits, = 16     | size<<3|0 |               |
/// +------------+--------------------+-----------+---------------+
/// ```
///
/// The AU-header holds the access-unit size in its upper 13 bits and a
/// zero AU-index in its lower 3 bits (`sizelength=13;indexlength=3`).
///
/// The AudioSpecificConfig, sent once at stream start, goes out verbatim
/// after the RTP header. Frames and config share one sequence/timestamp
/// space, separate from the video stream's. All packets carry the marker
/// bit.
#[derive(Debug)]
pub struct AacPacketizer {
    header: RtpHeader,
    mtu: usize,
}

impl AacPacketizer {
    /// Create with explicit payload type, clock (sample) rate, SSRC, and
    /// initial sequence number.
    pub fn new(pt: u8, sample_rate: u32, ssrc: u32, sequence: u16) -> Self {
        Self {
            header: RtpHeader::new(pt, sample_rate, ssrc, sequence),
            mtu: DEFAULT_MTU,
        }
    }

    /// Create with random SSRC and initial sequence number.
    pub fn with_random_ssrc(pt: u8, sample_rate: u32) -> Self {
        Self {
            header: RtpHeader::random(pt, sample_rate),
            mtu: DEFAULT_MTU,
        }
    }

    /// Largest raw AAC frame that still fits one RTP packet.
    pub fn max_frame_len(&self) -> usize {
        (self.mtu - RTP_HEADER_LEN - AU_HEADER_SECTION_LEN).min(AU_SIZE_MAX)
    }

    /// Packetize one raw (ADTS-free) AAC access unit.
    ///
    /// Frames too large for a single packet are rejected with
    /// [`RtspError::FrameTooLarge`]; they are never truncated, and a
    /// rejected frame consumes no sequence number.
    pub fn packetize_frame(&mut self, frame: &[u8], timestamp_micros: u64) -> Result<Vec<u8>> {
        let max = self.max_frame_len();
        if frame.len() > max {
            return Err(RtspError::FrameTooLarge {
                size: frame.len(),
                max,
            });
        }

        self.header.set_timestamp_micros(timestamp_micros);
        let au_header = (frame.len() as u16) << 3;

        let mut packet = Vec::with_capacity(RTP_HEADER_LEN + AU_HEADER_SECTION_LEN + frame.len());
        packet.extend_from_slice(&self.header.write(true));
        packet.extend_from_slice(&AU_HEADERS_LENGTH_BITS.to_be_bytes());
        packet.extend_from_slice(&au_header.to_be_bytes());
        packet.extend_from_slice(frame);

        tracing::trace!(
            frame_bytes = frame.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "AAC frame packetized"
        );

        Ok(packet)
    }

    /// Packetize an AudioSpecificConfig blob (payload = config bytes verbatim).
    pub fn packetize_config(&mut self, config: &[u8], timestamp_micros: u64) -> Result<Vec<u8>> {
        let max = self.mtu - RTP_HEADER_LEN;
        if config.len() > max {
            return Err(RtspError::FrameTooLarge {
                size: config.len(),
                max,
            });
        }

        self.header.set_timestamp_micros(timestamp_micros);

        let mut packet = Vec::with_capacity(RTP_HEADER_LEN + config.len());
        packet.extend_from_slice(&self.header.write(true));
        packet.extend_from_slice(config);

        tracing::debug!(config_bytes = config.len(), "AAC config packetized");

        Ok(packet)
    }
}

impl Packetizer for AacPacketizer {
    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn last_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packetizer() -> AacPacketizer {
        AacPacketizer::new(97, 48_000, 0x0BADF00D, 7)
    }

    #[test]
    fn frame_packet_layout() {
        let mut p = make_packetizer();
        let frame = vec![0x21; 371];
        let packet = p.packetize_frame(&frame, 0).unwrap();

        assert_eq!(packet.len(), 12 + 4 + 371);
        assert_eq!(packet[0], 0x80);
        assert_eq!(packet[1], 0x80 | 97);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 7);
        assert_eq!(&packet[8..12], &0x0BADF00Du32.to_be_bytes());
        assert_eq!(u16::from_be_bytes([packet[12], packet[13]]), 16);

        let au_header = u16::from_be_bytes([packet[14], packet[15]]);
        assert_eq!(au_header >> 3, 371);
        assert_eq!(au_header & 0x7, 0);
        assert_eq!(&packet[16..], frame.as_slice());
    }

    #[test]
    fn config_packet_layout() {
        let mut p = make_packetizer();
        let config = [0x11, 0x90];
        let packet = p.packetize_config(&config, 0).unwrap();
        assert_eq!(packet.len(), 14);
        assert_eq!(packet[1] & 0x80, 0x80);
        assert_eq!(&packet[12..], &config);
    }

    #[test]
    fn timestamp_at_48khz() {
        let mut p = make_packetizer();
        let packet = p.packetize_frame(&[0x01], 1_000_000).unwrap();
        let ts = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        assert_eq!(ts, 48_000);
        assert_eq!(p.last_rtp_timestamp(), 48_000);
    }

    #[test]
    fn config_and_frames_share_sequence_space() {
        let mut p = AacPacketizer::new(97, 48_000, 1, u16::MAX);
        let a = p.packetize_config(&[0x11, 0x90], 0).unwrap();
        let b = p.packetize_frame(&[0x01, 0x02], 21_333).unwrap();
        assert_eq!(u16::from_be_bytes([a[2], a[3]]), u16::MAX);
        assert_eq!(u16::from_be_bytes([b[2], b[3]]), 0);
        assert_eq!(p.next_sequence(), 1);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut p = make_packetizer();
        let max = p.max_frame_len();
        assert_eq!(max, 1384);
        assert!(p.packetize_frame(&vec![0; max], 0).is_ok());

        let err = p.packetize_frame(&vec![0; max + 1], 0).unwrap_err();
        assert!(matches!(err, RtspError::FrameTooLarge { size, .. } if size == max + 1));
        assert_eq!(p.next_sequence(), 8, "rejected frame must not consume a sequence number");
    }

    #[test]
    fn header_carries_payload_type_and_ssrc() {
        let mut p = make_packetizer();
        let packet = p.packetize_frame(&[0xAA; 10], 0).unwrap();
        assert_eq!(packet[1] & 0x7f, 97);
        assert_eq!(&packet[8..12], &0x0BADF00Du32.to_be_bytes());
    }
}
