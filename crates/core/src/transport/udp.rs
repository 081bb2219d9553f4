use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::Result;

/// UDP sender for outbound RTP packets.
///
/// Binds a single ephemeral socket (`0.0.0.0:0`) shared by the video and
/// audio tracks. The socket knows nothing about sessions: the
/// [`MediaPipeline`](crate::stream::MediaPipeline) resolves each track's
/// destination before calling [`send_to`](Self::send_to).
///
/// Delivery is fire-and-forget: a failed send is reported to the caller
/// and never retried.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for outbound RTP.
    pub fn bind() -> Result<Self> {
        Self::bind_to("0.0.0.0:0")
    }

    pub fn bind_to(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        tracing::debug!(local = ?socket.local_addr().ok(), "RTP socket bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Send one RTP packet to `addr`.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }
}
