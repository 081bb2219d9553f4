//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling. One
//!   control connection is served at a time, on the accept thread.
//!
//! - **UDP** ([`udp`]): carries RTP media packets. A single ephemeral
//!   socket is shared by the video and audio tracks.
//!
//! Interleaved TCP transport (RFC 2326 §10.12) is not offered; SETUP
//! requests asking for it are answered with 461.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
