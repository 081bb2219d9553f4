pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::{QualityPreset, StreamingConfig};
pub use error::{Result, RtspError};
pub use media::Packetizer;
pub use server::{Server, ServerConfig};
pub use stream::{Encoder, EncoderFactory, MediaSink};
