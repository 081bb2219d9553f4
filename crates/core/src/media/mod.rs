//! Elementary-stream scanning and RTP packetization.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded unit is carried in one or more RTP packets. Every packet
//! starts with a 12-byte fixed header ([`rtp::RtpHeader`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping): +1 per packet, per stream.
//! - **Timestamp** (32-bit): media clock derived from the producer's
//!   microsecond presentation time.
//! - **SSRC** (32-bit): random, fixed for the stream's lifetime.
//! - **Marker bit**: set on the last packet of a unit.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Payload type |
//! |-------|--------|-----|--------------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) FU-A | 96 |
//! | AAC | [`aac`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) AAC-hbr | 97 |

pub mod aac;
pub mod h264;
pub mod nal;
pub mod rtp;

/// Maximum size of any emitted RTP packet, header included.
pub const DEFAULT_MTU: usize = 1400;

/// RTP stream state exposed by a codec packetizer.
///
/// A packetizer owns the [`rtp::RtpHeader`] state of one elementary
/// stream, so it must outlive any encoder feeding it: replacing the
/// encoder never resets SSRC or sequence numbering.
pub trait Packetizer: Send {
    /// Sequence number the next packet will carry (for `RTP-Info`).
    fn next_sequence(&self) -> u16;

    /// Most recent RTP timestamp (for `RTP-Info`).
    fn last_rtp_timestamp(&self) -> u32;
}
