//! Encoder wiring and media delivery.
//!
//! ```text
//! Encoder thread ──▶ MediaSink ──▶ MediaPipeline ──▶ H264/AAC packetizer ──▶ UDP
//!                      (generation-tagged)      (SSRC/seq survive restarts)
//!
//! SET_PARAMETER ──▶ StreamController::apply_preset
//!                     stop encoder → new generation → start encoder
//! ```
//!
//! The [`Encoder`] is an external collaborator. The server only knows how
//! to create one for a [`StreamingConfig`](crate::config::StreamingConfig),
//! start it with a [`MediaSink`], and stop it.

pub mod controller;
pub mod encoder;
pub mod pipeline;

pub use controller::{QualityObserver, StreamController};
pub use encoder::{Encoder, EncoderFactory, MediaSink};
pub use pipeline::{MediaPipeline, RtpInfo};
