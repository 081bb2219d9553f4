use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::QualityPreset;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::server::ServerConfig;
use crate::session::transport::TransportHeader;
use crate::session::{ClientTransport, Session, SessionState, Track};
use crate::stream::{MediaPipeline, StreamController};

/// Methods advertised in the OPTIONS `Public` header.
pub const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, SET_PARAMETER, TEARDOWN";

/// Per-request context threaded through the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// `CSeq` echoed on the response.
    pub cseq: String,
}

impl Transaction {
    /// Build the transaction for `request`. When its `CSeq` is absent or
    /// unparsable, `last_cseq` (the last valid value on this connection)
    /// is echoed instead.
    pub fn for_request(request: &RtspRequest, last_cseq: Option<&str>) -> Self {
        let cseq = request.cseq().or(last_cseq).unwrap_or("0");
        Self {
            cseq: cseq.to_string(),
        }
    }
}

/// A response plus whether the connection closes after it is written.
#[must_use]
pub struct Reply {
    pub response: RtspResponse,
    pub close: bool,
}

impl From<RtspResponse> for Reply {
    fn from(response: RtspResponse) -> Self {
        Reply {
            response,
            close: false,
        }
    }
}

/// Handles RTSP method requests for the active control connection.
///
/// Owns the connection's [`Session`]. Media destinations negotiated here
/// are pushed into the shared [`MediaPipeline`]; quality changes go
/// through the [`StreamController`].
pub struct MethodHandler {
    session: Session,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
    controller: Arc<StreamController>,
    pipeline: Arc<MediaPipeline>,
}

impl MethodHandler {
    pub fn new(
        client_addr: SocketAddr,
        config: Arc<ServerConfig>,
        controller: Arc<StreamController>,
        pipeline: Arc<MediaPipeline>,
    ) -> Self {
        MethodHandler {
            session: Session::new(),
            client_addr,
            config,
            controller,
            pipeline,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handle(&mut self, request: &RtspRequest, tx: &Transaction) -> Reply {
        let cseq = tx.cseq.as_str();

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(cseq).into(),
            "DESCRIBE" => self.handle_describe(cseq, &request.uri).into(),
            "SETUP" => self.handle_setup(cseq, request).into(),
            "PLAY" => self.handle_play(cseq, request).into(),
            "SET_PARAMETER" => self.handle_set_parameter(cseq, request).into(),
            "TEARDOWN" => self.handle_teardown(cseq),
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                RtspResponse::bad_request().add_header("CSeq", cseq).into()
            }
        }
    }

    /// Release media delivery when the connection goes away without TEARDOWN.
    pub fn on_disconnect(&mut self) {
        if self.session.state() != SessionState::TornDown {
            self.pipeline.reset();
        }
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", PUBLIC_METHODS)
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");

        let sdp = sdp::generate_sdp(&self.controller.config(), &self.config.sdp_session_name);
        let content_base = format!("{}/", uri.trim_end_matches('/'));

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", &content_base)
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let transport_header = request.get_header("Transport").unwrap_or_default();
        let requested = TransportHeader::parse(transport_header);

        // Only RTP/AVP over UDP is implemented; TCP interleaving (RFC 2326 §10.12) is not.
        if requested.interleaved {
            tracing::warn!(%cseq, transport = %transport_header, "client requested TCP transport (not implemented)");
            return RtspResponse::unsupported_transport()
                .add_header("CSeq", cseq)
                .add_header("Unsupported", "RTP/AVP/TCP");
        }

        // The first SETUP creates the session, whatever id the client sends.
        if self.session.id().is_some() && !self.session.matches(request.get_header("Session")) {
            tracing::warn!(%cseq, "SETUP for unknown session");
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        }

        let tracks: Vec<Track> = match Track::from_uri(&request.uri) {
            Some(track) => vec![track],
            None => Track::ALL.to_vec(),
        };
        if tracks.iter().any(|t| self.session.transport(*t).is_some()) {
            tracing::warn!(%cseq, uri = %request.uri, "SETUP for a track that is already set up");
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }

        let transport = ClientTransport::new(self.client_addr.ip(), requested.rtp_port_or_default());
        self.session.ensure_id();
        self.session.set_base_uri(&request.uri);
        for track in &tracks {
            self.session.bind(*track, transport);
            self.pipeline.set_destination(*track, transport.rtp_addr());
        }
        if self.session.state() == SessionState::Init {
            self.session.set_state(SessionState::Ready);
        }

        tracing::info!(
            session_id = ?self.session.id(),
            uri = %request.uri,
            ?tracks,
            client_rtp = %transport.rtp_addr(),
            "track set up"
        );

        let mut response = RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport.header_value());
        if let Some(session) = self.session.session_header_value() {
            response = response.add_header("Session", &session);
        }
        response
    }

    fn handle_play(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let set_up = self.session.id().is_some() && self.session.bound_tracks().next().is_some();
        if !set_up || !self.session.matches(request.get_header("Session")) {
            tracing::warn!(%cseq, "PLAY without a set-up session");
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        }

        if self.session.state() != SessionState::Playing {
            self.pipeline.start_playing();
            self.session.set_state(SessionState::Playing);
            tracing::info!(session_id = ?self.session.id(), "session started playing");
        }

        let base = self.session.base_uri().unwrap_or(request.uri.as_str());
        let rtp_info = self
            .session
            .bound_tracks()
            .map(|(track, _)| {
                let info = self.pipeline.rtp_info(track);
                format!(
                    "url={}/{};seq={};rtptime={}",
                    base,
                    track.control(),
                    info.sequence,
                    info.rtp_time
                )
            })
            .collect::<Vec<_>>()
            .join(",");

        let mut response = RtspResponse::ok().add_header("CSeq", cseq);
        if let Some(session) = self.session.session_header_value() {
            response = response.add_header("Session", &session);
        }
        response
            .add_header("Range", "npt=0.000-")
            .add_header("RTP-Info", &rtp_info)
    }

    /// SET_PARAMETER carries a `quality: <preset>` line (RFC 2326 §10.9).
    fn handle_set_parameter(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        if !matches!(
            self.session.state(),
            SessionState::Ready | SessionState::Playing
        ) {
            tracing::warn!(%cseq, state = ?self.session.state(), "SET_PARAMETER before SETUP");
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }
        if !self.session.matches(request.get_header("Session")) {
            return RtspResponse::session_not_found().add_header("CSeq", cseq);
        }

        let preset = match request
            .parameter("quality")
            .ok_or_else(|| crate::RtspError::UnsupportedParameter("missing quality".into()))
            .and_then(str::parse::<QualityPreset>)
        {
            Ok(preset) => preset,
            Err(e) => {
                tracing::warn!(%cseq, error = %e, "SET_PARAMETER rejected");
                return RtspResponse::parameter_not_understood().add_header("CSeq", cseq);
            }
        };

        let mut response = match self.controller.apply_preset(preset) {
            Ok(_) => RtspResponse::ok().add_header("CSeq", cseq),
            Err(e) => {
                tracing::error!(%cseq, %preset, error = %e, "quality change failed");
                RtspResponse::internal_error().add_header("CSeq", cseq)
            }
        };
        if let Some(session) = self.session.session_header_value() {
            response = response.add_header("Session", &session);
        }
        response
    }

    fn handle_teardown(&mut self, cseq: &str) -> Reply {
        self.pipeline.reset();
        self.session.set_state(SessionState::TornDown);
        tracing::info!(session_id = ?self.session.id(), "session terminated via TEARDOWN");

        Reply {
            response: RtspResponse::ok().add_header("CSeq", cseq),
            close: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamingConfig;
    use crate::error::Result;
    use crate::stream::{Encoder, MediaSink};
    use std::net::{IpAddr, Ipv4Addr};

    struct IdleEncoder;

    impl Encoder for IdleEncoder {
        fn start(&mut self, _config: &StreamingConfig, _sink: MediaSink) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn handler() -> MethodHandler {
        let pipeline = Arc::new(MediaPipeline::new(48_000));
        let factory = |_: &StreamingConfig| -> Box<dyn Encoder> { Box::new(IdleEncoder) };
        let controller = Arc::new(StreamController::new(
            pipeline.clone(),
            Box::new(factory),
            QualityPreset::High,
        ));
        controller.start().unwrap();
        MethodHandler::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000),
            Arc::new(ServerConfig::default()),
            controller,
            pipeline,
        )
    }

    fn send(handler: &mut MethodHandler, raw: &str) -> Reply {
        let request = RtspRequest::parse(raw).unwrap();
        let tx = Transaction::for_request(&request, Some("9"));
        handler.handle(&request, &tx)
    }

    const SETUP: &str = "SETUP rtsp://h/camera RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n";

    #[test]
    fn options_lists_public_methods() {
        let reply = send(&mut handler(), "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n");
        assert_eq!(reply.response.status_code, 200);
        assert_eq!(
            reply.response.header("Public"),
            Some("OPTIONS, DESCRIBE, SETUP, PLAY, SET_PARAMETER, TEARDOWN")
        );
        assert!(!reply.close);
    }

    #[test]
    fn unknown_method_is_bad_request() {
        let reply = send(&mut handler(), "PAUSE rtsp://h/camera RTSP/1.0\r\nCSeq: 4\r\n\r\n");
        assert_eq!(reply.response.status_code, 400);
        assert_eq!(reply.response.header("CSeq"), Some("4"));
    }

    #[test]
    fn missing_cseq_reuses_last() {
        let reply = send(&mut handler(), "OPTIONS * RTSP/1.0\r\nCSeq: nope\r\n\r\n");
        assert_eq!(reply.response.header("CSeq"), Some("9"));
    }

    #[test]
    fn setup_echoes_client_ports() {
        let mut h = handler();
        let reply = send(&mut h, SETUP);
        assert_eq!(reply.response.status_code, 200);
        assert_eq!(
            reply.response.header("Transport"),
            Some("RTP/AVP;unicast;client_port=6000-6001")
        );
        let session = reply.response.header("Session").unwrap();
        assert!(session.ends_with(";timeout=60"));
        assert!(session.len() > ";timeout=60".len());
        assert_eq!(h.session().state(), SessionState::Ready);
    }

    #[test]
    fn setup_without_port_defaults_to_5000() {
        let mut h = handler();
        let reply = send(
            &mut h,
            "SETUP rtsp://h/camera RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast\r\n\r\n",
        );
        assert_eq!(
            reply.response.header("Transport"),
            Some("RTP/AVP;unicast;client_port=5000-5001")
        );
    }

    #[test]
    fn setup_interleaved_unsupported() {
        let reply = send(
            &mut handler(),
            "SETUP rtsp://h/camera/track0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        assert_eq!(reply.response.status_code, 461);
    }

    #[test]
    fn first_setup_ignores_client_session_id() {
        let mut h = handler();
        let reply = send(
            &mut h,
            "SETUP rtsp://h/camera RTSP/1.0\r\nCSeq: 3\r\nSession: 12345\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n",
        );
        assert_eq!(reply.response.status_code, 200);
        let id = h.session().id().unwrap().to_string();
        assert_ne!(id, "12345");
        assert_eq!(
            reply.response.header("Session"),
            Some(format!("{id};timeout=60").as_str())
        );
    }

    #[test]
    fn later_setup_with_foreign_session_rejected() {
        let mut h = handler();
        let _ = send(
            &mut h,
            "SETUP rtsp://h/camera/track0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n",
        );
        let reply = send(
            &mut h,
            "SETUP rtsp://h/camera/track1 RTSP/1.0\r\nCSeq: 4\r\nSession: 12345\r\nTransport: RTP/AVP;unicast;client_port=6002-6003\r\n\r\n",
        );
        assert_eq!(reply.response.status_code, 454);
        assert!(h.session().transport(Track::Audio).is_none());
    }

    #[test]
    fn setup_picks_udp_among_transport_alternatives() {
        let mut h = handler();
        let reply = send(
            &mut h,
            "SETUP rtsp://h/camera RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001,RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        assert_eq!(reply.response.status_code, 200);
        assert_eq!(
            reply.response.header("Transport"),
            Some("RTP/AVP;unicast;client_port=6000-6001")
        );
    }

    #[test]
    fn per_track_setup_and_resetup() {
        let mut h = handler();
        let video = send(
            &mut h,
            "SETUP rtsp://h/camera/track0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n",
        );
        let session = video.response.header("Session").unwrap().to_string();
        let id = session.split(';').next().unwrap();

        let audio = send(
            &mut h,
            &format!(
                "SETUP rtsp://h/camera/track1 RTSP/1.0\r\nCSeq: 4\r\nSession: {id}\r\nTransport: RTP/AVP;unicast;client_port=6002-6003\r\n\r\n"
            ),
        );
        assert_eq!(audio.response.status_code, 200);
        assert_eq!(audio.response.header("Session"), Some(session.as_str()));
        assert_eq!(h.session().transport(Track::Audio).unwrap().rtp_port, 6002);

        let again = send(
            &mut h,
            "SETUP rtsp://h/camera/track0 RTSP/1.0\r\nCSeq: 5\r\nTransport: RTP/AVP;unicast;client_port=7000-7001\r\n\r\n",
        );
        assert_eq!(again.response.status_code, 455);
        assert_eq!(h.session().transport(Track::Video).unwrap().rtp_port, 6000);
    }

    #[test]
    fn play_before_setup_is_session_not_found() {
        let reply = send(&mut handler(), "PLAY rtsp://h/camera RTSP/1.0\r\nCSeq: 4\r\n\r\n");
        assert_eq!(reply.response.status_code, 454);
    }

    #[test]
    fn play_reports_range_and_rtp_info() {
        let mut h = handler();
        let _ = send(&mut h, SETUP);
        let reply = send(&mut h, "PLAY rtsp://h/camera RTSP/1.0\r\nCSeq: 4\r\n\r\n");
        assert_eq!(reply.response.status_code, 200);
        assert_eq!(reply.response.header("Range"), Some("npt=0.000-"));
        let rtp_info = reply.response.header("RTP-Info").unwrap();
        assert!(rtp_info.starts_with("url=rtsp://h/camera/track0;seq="));
        assert!(rtp_info.contains(",url=rtsp://h/camera/track1;seq="));
        assert_eq!(h.session().state(), SessionState::Playing);
        assert!(h.pipeline.is_playing());
    }

    #[test]
    fn set_parameter_before_setup_not_valid() {
        let mut h = handler();
        let reply = send(
            &mut h,
            "SET_PARAMETER rtsp://h/camera RTSP/1.0\r\nCSeq: 5\r\nquality: low\r\n\r\n",
        );
        assert_eq!(reply.response.status_code, 455);
        assert_eq!(h.controller.preset(), QualityPreset::High);
    }

    #[test]
    fn set_parameter_applies_quality() {
        let mut h = handler();
        let _ = send(&mut h, SETUP);
        let reply = send(
            &mut h,
            "SET_PARAMETER rtsp://h/camera RTSP/1.0\r\nCSeq: 5\r\nquality: ULTRA\r\n\r\n",
        );
        assert_eq!(reply.response.status_code, 200);
        assert_eq!(h.controller.config().video_width, 1920);

        let describe = send(&mut h, "DESCRIBE rtsp://h/camera RTSP/1.0\r\nCSeq: 6\r\n\r\n");
        assert!(describe.response.body.unwrap().contains("b=AS:4000\r\n"));
    }

    #[test]
    fn set_parameter_unknown_quality_rejected() {
        let mut h = handler();
        let _ = send(&mut h, SETUP);
        for raw in [
            "SET_PARAMETER rtsp://h/camera RTSP/1.0\r\nCSeq: 5\r\nquality: potato\r\n\r\n",
            "SET_PARAMETER rtsp://h/camera RTSP/1.0\r\nCSeq: 6\r\n\r\n",
        ] {
            let reply = send(&mut h, raw);
            assert_eq!(reply.response.status_code, 451);
        }
        assert_eq!(h.controller.config(), StreamingConfig::default());
    }

    #[test]
    fn teardown_closes_connection() {
        let mut h = handler();
        let _ = send(&mut h, SETUP);
        let _ = send(&mut h, "PLAY rtsp://h/camera RTSP/1.0\r\nCSeq: 4\r\n\r\n");
        let reply = send(&mut h, "TEARDOWN rtsp://h/camera RTSP/1.0\r\nCSeq: 7\r\n\r\n");
        assert_eq!(reply.response.status_code, 200);
        assert!(reply.close);
        assert_eq!(h.session().state(), SessionState::TornDown);
        assert!(!h.pipeline.is_playing());
    }
}
