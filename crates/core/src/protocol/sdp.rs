//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses:
//!
//! ```text
//! v=0                                              ← protocol version
//! o=- 0 0 IN IP4 127.0.0.1                         ← origin
//! s=MonkeySee Camera                               ← session name
//! c=IN IP4 0.0.0.0                                 ← connection address
//! t=0 0                                            ← timing (live stream)
//! m=video 0 RTP/AVP 96                             ← video media description
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1
//! b=AS:2000                                        ← bandwidth, kbps
//! a=control:track0
//! m=audio 0 RTP/AVP 97                             ← audio media description
//! a=rtpmap:97 MPEG4-GENERIC/48000/2
//! a=fmtp:97 streamtype=5;profile-level-id=1;mode=AAC-hbr;sizelength=13;indexlength=3;indexdeltalength=3
//! b=AS:128
//! a=control:track1
//! ```
//!
//! The body is a pure function of the [`StreamingConfig`] and session name; it holds no
//! state and is safe to call from any thread.

use crate::config::StreamingConfig;
use crate::media::aac::AAC_PAYLOAD_TYPE;
use crate::media::h264::{H264_CLOCK_RATE, H264_PAYLOAD_TYPE};

/// Default session name advertised in the `s=` line.
pub const SESSION_NAME: &str = "MonkeySee Camera";

/// Control URL suffix of the video track.
pub const VIDEO_CONTROL: &str = "track0";

/// Control URL suffix of the audio track.
pub const AUDIO_CONTROL: &str = "track1";

/// Generate the SDP session description for the given configuration.
pub fn generate_sdp(config: &StreamingConfig, session_name: &str) -> String {
    let sdp = [
        "v=0".to_string(),
        "o=- 0 0 IN IP4 127.0.0.1".to_string(),
        format!("s={}", session_name),
        "c=IN IP4 0.0.0.0".to_string(),
        "t=0 0".to_string(),
        // Video track (H.264, RFC 6184 §8.2.1: rtpmap before fmtp)
        format!("m=video 0 RTP/AVP {}", H264_PAYLOAD_TYPE),
        format!("a=rtpmap:{} H264/{}", H264_PAYLOAD_TYPE, H264_CLOCK_RATE),
        format!("a=fmtp:{} packetization-mode=1", H264_PAYLOAD_TYPE),
        format!("b=AS:{}", config.video_bitrate / 1000),
        format!("a=control:{}", VIDEO_CONTROL),
        // Audio track (AAC-hbr, RFC 3640 §4.1)
        format!("m=audio 0 RTP/AVP {}", AAC_PAYLOAD_TYPE),
        format!(
            "a=rtpmap:{} MPEG4-GENERIC/{}/{}",
            AAC_PAYLOAD_TYPE, config.audio_sample_rate, config.audio_channels
        ),
        format!(
            "a=fmtp:{} streamtype=5;profile-level-id=1;mode=AAC-hbr;sizelength=13;indexlength=3;indexdeltalength=3",
            AAC_PAYLOAD_TYPE
        ),
        format!("b=AS:{}", config.audio_bitrate / 1000),
        format!("a=control:{}", AUDIO_CONTROL),
    ];

    tracing::trace!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
