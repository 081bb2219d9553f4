use std::net::{IpAddr, SocketAddr};

/// Client RTP port used when SETUP names none, or names 0 or 65535.
pub const DEFAULT_CLIENT_RTP_PORT: u16 = 5000;

/// Negotiated destination of one track's RTP packets (RFC 2326 §12.39).
///
/// Created during SETUP from the client's `Transport` header and the
/// control connection's peer address; immutable afterwards.
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=6000-6001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=6000-6001
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTransport {
    /// Client host, taken from the control connection.
    pub address: IpAddr,
    /// Client's RTP receive port.
    pub rtp_port: u16,
}

impl ClientTransport {
    pub fn new(address: IpAddr, rtp_port: u16) -> Self {
        Self { address, rtp_port }
    }

    /// Full socket address for RTP delivery.
    pub fn rtp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.rtp_port)
    }

    /// Value of the `Transport` response header: RTCP is always `rtp + 1`.
    pub fn header_value(&self) -> String {
        format!(
            "RTP/AVP;unicast;client_port={}-{}",
            self.rtp_port,
            self.rtp_port.wrapping_add(1)
        )
    }
}

/// Parsed client-side transport info from the RTSP `Transport` header.
///
/// Extracts `client_port=RTP[-RTCP]` and notes whether the client asked
/// for TCP-interleaved delivery, which this server does not provide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeader {
    /// Client's requested RTP port, if a non-zero one was given.
    pub client_rtp_port: Option<u16>,
    /// Every alternative offered asks for `RTP/AVP/TCP` or `interleaved=`.
    pub interleaved: bool,
}

impl TransportHeader {
    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// The header may list comma-separated alternatives in order of
    /// preference. The first one that is not TCP-interleaved is used;
    /// `interleaved` is set only when every alternative is.
    ///
    /// ## Examples
    ///
    /// ```
    /// use monkeysee::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001");
    /// assert_eq!(th.client_rtp_port, Some(8000));
    /// assert_eq!(th.rtp_port_or_default(), 8000);
    ///
    /// assert_eq!(TransportHeader::parse("RTP/AVP;unicast").rtp_port_or_default(), 5000);
    /// ```
    pub fn parse(header: &str) -> Self {
        let Some(alternative) = header.split(',').find(|alt| !is_interleaved(alt)) else {
            return Self {
                client_rtp_port: None,
                interleaved: true,
            };
        };

        let client_rtp_port = alternative
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("client_port="))
            .next()
            .and_then(|ports| ports.split('-').next())
            .and_then(|rtp| rtp.trim().parse::<u16>().ok())
            // RTCP goes to rtp + 1, so the last port cannot carry RTP.
            .filter(|port| *port != 0 && *port != u16::MAX);

        Self {
            client_rtp_port,
            interleaved: false,
        }
    }

    pub fn rtp_port_or_default(&self) -> u16 {
        self.client_rtp_port.unwrap_or(DEFAULT_CLIENT_RTP_PORT)
    }
}

fn is_interleaved(alternative: &str) -> bool {
    alternative.split(';').map(str::trim).any(|param| {
        param.eq_ignore_ascii_case("RTP/AVP/TCP") || param.starts_with("interleaved=")
    })
}
