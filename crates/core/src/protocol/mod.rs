//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol: parsing
//! requests, building responses, routing methods, and generating SDP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! SET_PARAMETER rtsp://server/camera RTSP/1.0\r\n
//! CSeq: 6\r\n
//! Session: 1700000000000\r\n
//! quality: ultra\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport (UDP ports), per track or aggregate |
//! | PLAY | §10.5 | Start media delivery |
//! | SET_PARAMETER | §10.9 | Switch quality preset mid-session |
//! | TEARDOWN | §10.7 | Destroy session and close the connection |
//!
//! Any other method is answered with `400 Bad Request`.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::{MethodHandler, Reply, Transaction};
pub use request::RtspRequest;
pub use response::RtspResponse;
