//! RTSP session state (RFC 2326 §3, §12.37).
//!
//! The server serves one control connection at a time, and that
//! connection owns at most one session. The session tracks:
//!
//! - The session ID, assigned by the first SETUP (time-derived string).
//! - The protocol phase: Init -> Ready -> Playing -> TornDown.
//! - The negotiated destination of each track (video `track0`,
//!   audio `track1`), each written once by SETUP.
//!
//! ## Lifecycle
//!
//! ```text
//! accept        -> Init
//! SETUP         -> Ready
//! PLAY          -> Playing
//! TEARDOWN      -> TornDown (terminal, connection closed)
//! TCP disconnect -> dropped
//! ```

pub mod transport;

use std::time::{SystemTime, UNIX_EPOCH};

pub use transport::{ClientTransport, TransportHeader};

/// Timeout advertised in the `Session` header, in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// RTSP protocol phase (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, no SETUP yet.
    Init,
    /// At least one track set up, not yet playing.
    Ready,
    /// Media is being delivered.
    Playing,
    /// TEARDOWN received. Terminal.
    TornDown,
}

/// Elementary stream addressed by a SETUP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Video,
    Audio,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Video, Track::Audio];

    /// Resolve the track named by a SETUP URI's control suffix.
    ///
    /// `rtsp://host/camera/track0` → video, `.../track1` → audio,
    /// anything else (aggregate URI) → `None`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let last = uri.trim_end_matches('/').rsplit('/').next()?;
        if last.eq_ignore_ascii_case(crate::protocol::sdp::VIDEO_CONTROL) {
            Some(Track::Video)
        } else if last.eq_ignore_ascii_case(crate::protocol::sdp::AUDIO_CONTROL) {
            Some(Track::Audio)
        } else {
            None
        }
    }

    pub fn control(self) -> &'static str {
        match self {
            Track::Video => crate::protocol::sdp::VIDEO_CONTROL,
            Track::Audio => crate::protocol::sdp::AUDIO_CONTROL,
        }
    }
}

/// The RTSP session of the active control connection.
#[derive(Debug)]
pub struct Session {
    id: Option<String>,
    state: SessionState,
    video: Option<ClientTransport>,
    audio: Option<ClientTransport>,
    /// Base URI used for `RTP-Info` track URLs.
    base_uri: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            id: None,
            state: SessionState::Init,
            video: None,
            audio: None,
            base_uri: None,
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the session ID, assigning a time-derived one on first use.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(|| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            millis.to_string()
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transition to a new protocol phase.
    pub fn set_state(&mut self, state: SessionState) {
        tracing::debug!(session_id = ?self.id, old_state = ?self.state, new_state = ?state, "state transition");
        self.state = state;
    }

    pub fn transport(&self, track: Track) -> Option<ClientTransport> {
        match track {
            Track::Video => self.video,
            Track::Audio => self.audio,
        }
    }

    /// Record a track's destination. Returns `false` (and changes nothing)
    /// when that track was already bound: transports are immutable once set.
    pub fn bind(&mut self, track: Track, transport: ClientTransport) -> bool {
        let slot = match track {
            Track::Video => &mut self.video,
            Track::Audio => &mut self.audio,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(transport);
        tracing::debug!(session_id = ?self.id, ?track, client = %transport.rtp_addr(), "transport configured");
        true
    }

    /// Tracks with a negotiated destination.
    pub fn bound_tracks(&self) -> impl Iterator<Item = (Track, ClientTransport)> + '_ {
        Track::ALL
            .into_iter()
            .filter_map(|track| self.transport(track).map(|t| (track, t)))
    }

    pub fn set_base_uri(&mut self, uri: &str) {
        if self.base_uri.is_none() {
            let base = match Track::from_uri(uri) {
                Some(_) => uri.trim_end_matches('/').rsplit_once('/').map_or(uri, |(b, _)| b),
                None => uri.trim_end_matches('/'),
            };
            self.base_uri = Some(base.to_string());
        }
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Format the `Session` response header value per RFC 2326 §12.37.
    ///
    /// Example: `"1700000000000;timeout=60"`
    pub fn session_header_value(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("{};timeout={}", id, self.timeout_secs))
    }

    /// Whether a request's `Session` header names this session. A request
    /// without the header is accepted (single-client server).
    pub fn matches(&self, header: Option<&str>) -> bool {
        match (header, self.id.as_deref()) {
            (None, _) => true,
            (Some(value), Some(id)) => value.split(';').next().unwrap_or(value).trim() == id,
            (Some(_), None) => false,
        }
    }
}
