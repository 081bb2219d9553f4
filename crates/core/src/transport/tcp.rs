use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::protocol::handler::Transaction;
use crate::protocol::{MethodHandler, RtspRequest};
use crate::server::ServerConfig;
use crate::stream::{MediaPipeline, StreamController};

/// Largest request body accepted (SET_PARAMETER parameter lists are tiny).
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// Largest request line plus header block accepted.
pub const MAX_HEADER_LEN: usize = 8 * 1024;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State shared between the [`Server`](crate::Server) and its control thread.
#[derive(Clone)]
pub(crate) struct ControlContext {
    pub config: Arc<ServerConfig>,
    pub controller: Arc<StreamController>,
    pub pipeline: Arc<MediaPipeline>,
    pub running: Arc<AtomicBool>,
    /// Handle on the connection being served, so `stop` can unblock its read.
    pub active: Arc<Mutex<Option<TcpStream>>>,
}

/// Non-blocking TCP accept loop serving one client at a time.
///
/// The connection is served inline: a second client waits in the listen
/// backlog until the first disconnects. Checks the `running` flag between
/// accepts with a 50ms poll interval so that
/// [`Server::stop`](crate::Server::stop) can terminate it promptly.
pub(crate) fn accept_loop(listener: TcpListener, ctx: ControlContext) {
    while ctx.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(e) = prepare(&stream, &ctx.config) {
                    tracing::warn!(error = %e, "failed to configure control connection");
                    continue;
                }
                *ctx.active.lock() = stream.try_clone().ok();
                Connection::handle(stream, &ctx);
                *ctx.active.lock() = None;
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                if ctx.running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

fn prepare(stream: &TcpStream, config: &ServerConfig) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(config.read_timeout)?;
    stream.set_nodelay(true)
}

/// The active RTSP client connection.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handler: MethodHandler,
    peer_addr: SocketAddr,
    /// Last valid `CSeq`, echoed when a request carries none.
    last_cseq: Option<String>,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    fn handle(stream: TcpStream, ctx: &ControlContext) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let handler = MethodHandler::new(
            peer_addr,
            ctx.config.clone(),
            ctx.controller.clone(),
            ctx.pipeline.clone(),
        );

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handler,
            peer_addr,
            last_cseq: None,
        };

        let reason = conn.run(&ctx.running);
        conn.handler.on_disconnect();
        // Best effort: the peer may already be gone.
        let _ = conn.writer.shutdown(Shutdown::Both);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &AtomicBool) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let mut request_text = String::new();
            loop {
                let remaining = MAX_HEADER_LEN - request_text.len();
                if remaining == 0 {
                    tracing::warn!(peer = %self.peer_addr, "request header too large");
                    return "request header too large";
                }
                let mut line = String::new();
                match (&mut self.reader).take(remaining as u64).read_line(&mut line) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&line);
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                    }
                    Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        return "read timeout";
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            let request = match RtspRequest::parse(&request_text) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    return "parse error";
                }
            };

            let request = match request.content_length() {
                Ok(0) => request,
                Ok(len) if len > MAX_BODY_LEN => {
                    tracing::warn!(peer = %self.peer_addr, len, "request body too large");
                    return "request body too large";
                }
                Ok(len) => {
                    let mut body = vec![0u8; len];
                    if self.reader.read_exact(&mut body).is_err() {
                        return "read error";
                    }
                    request.with_body(String::from_utf8_lossy(&body).into_owned())
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    return "parse error";
                }
            };

            let tx = Transaction::for_request(&request, self.last_cseq.as_deref());
            if let Some(cseq) = request.cseq() {
                self.last_cseq = Some(cseq.to_string());
            }

            tracing::debug!(
                peer = %self.peer_addr,
                method = %request.method,
                uri = %request.uri,
                cseq = %tx.cseq,
                "request"
            );

            let reply = self.handler.handle(&request, &tx);

            tracing::debug!(
                peer = %self.peer_addr,
                status = reply.response.status_code,
                "response"
            );

            if self
                .writer
                .write_all(reply.response.serialize().as_bytes())
                .is_err()
            {
                return "write error";
            }

            if reply.close {
                return "session torn down";
            }
        }

        "server shutting down"
    }
}
