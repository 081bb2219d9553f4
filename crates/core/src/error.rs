//! Error types for the streaming server.

use std::fmt;

/// Errors that can occur anywhere in the server.
///
/// Variants map to the failure modes of each layer:
///
/// - **Protocol**: [`Parse`](Self::Parse) for malformed RTSP requests,
///   [`UnsupportedParameter`](Self::UnsupportedParameter) for SET_PARAMETER
///   values that name no known quality preset.
/// - **Transport**: [`Io`](Self::Io) for socket/network failures.
/// - **Media**: [`FrameTooLarge`](Self::FrameTooLarge) when an audio unit
///   cannot fit a single RTP packet.
/// - **Encoder**: [`Encoder`](Self::Encoder) when the encoder refuses to start.
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// SET_PARAMETER carried no `quality` value, or one that maps to no preset.
    #[error("parameter not understood: {0}")]
    UnsupportedParameter(String),

    /// The encoder collaborator failed to start.
    #[error("encoder failure: {0}")]
    Encoder(String),

    /// An access unit (or codec config) would not fit in one RTP packet.
    #[error("unit of {size} bytes exceeds the {max} byte payload limit")]
    FrameTooLarge { size: usize, max: usize },

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was present but not a non-negative integer.
    InvalidContentLength,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
