use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{DEFAULT_AUDIO_SAMPLE_RATE, QualityPreset, StreamingConfig};
use crate::error::{Result, RtspError};
use crate::protocol::sdp::SESSION_NAME;
use crate::stream::{EncoderFactory, MediaPipeline, StreamController};
use crate::transport::UdpTransport;
use crate::transport::tcp::{self, ControlContext};

/// Default RTSP listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8554";

/// Default idle limit on the control connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RTSP listen address (`host:port`; port 0 picks an ephemeral port).
    pub bind_addr: String,
    /// Quality preset the encoder starts with.
    pub initial_quality: QualityPreset,
    /// Read timeout on the control connection. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            initial_quality: QualityPreset::default(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            sdp_session_name: SESSION_NAME.to_string(),
        }
    }
}

/// High-level RTSP server orchestrator.
///
/// Owns the [`StreamController`] (active config + encoder), the shared
/// [`MediaPipeline`] (packetizers + delivery), and the control thread.
/// Delegates TCP connection handling to [`transport::tcp`](crate::transport::tcp)
/// and RTP delivery to [`UdpTransport`].
pub struct Server {
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
    pipeline: Arc<MediaPipeline>,
    controller: Arc<StreamController>,
    active: Arc<Mutex<Option<TcpStream>>>,
    local_addr: Option<SocketAddr>,
    control_thread: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(config: ServerConfig, factory: impl EncoderFactory + 'static) -> Self {
        let pipeline = Arc::new(MediaPipeline::new(DEFAULT_AUDIO_SAMPLE_RATE));
        let controller = Arc::new(StreamController::new(
            pipeline.clone(),
            Box::new(factory),
            config.initial_quality,
        ));
        Self {
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            pipeline,
            controller,
            active: Arc::new(Mutex::new(None)),
            local_addr: None,
            control_thread: None,
        }
    }

    /// Bind the RTSP listener and RTP socket, start the encoder, and spawn
    /// the control thread.
    ///
    /// An encoder that fails to start is reported as
    /// [`RtspError::Encoder`] and leaves the server stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        self.pipeline.attach_transport(Some(UdpTransport::bind()?));
        if let Err(e) = self.controller.start() {
            self.pipeline.attach_transport(None);
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);
        self.local_addr = Some(local_addr);

        let ctx = ControlContext {
            config: self.config.clone(),
            controller: self.controller.clone(),
            pipeline: self.pipeline.clone(),
            running: self.running.clone(),
            active: self.active.clone(),
        };

        tracing::info!(addr = %local_addr, config = %self.controller.config(), "RTSP server listening");

        let spawned = thread::Builder::new()
            .name("rtsp-control".into())
            .spawn(move || tcp::accept_loop(listener, ctx));
        match spawned {
            Ok(handle) => {
                self.control_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e.into())
            }
        }
    }

    /// Stop everything. Best effort: failures are logged, never returned.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(stream) = self.active.lock().take()
            && let Err(e) = stream.shutdown(Shutdown::Both)
        {
            tracing::debug!(error = %e, "control connection already closed");
        }

        if let Some(handle) = self.control_thread.take() {
            if handle.thread().id() == thread::current().id() {
                tracing::warn!("stop called from the control thread, not joining");
            } else if handle.join().is_err() {
                tracing::warn!("control thread panicked");
            }
        }

        self.controller.stop();
        self.pipeline.reset();
        self.pipeline.attach_transport(None);
        self.local_addr = None;

        tracing::info!("server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the RTSP listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    /// Currently active streaming configuration.
    pub fn streaming_config(&self) -> StreamingConfig {
        self.controller.config()
    }

    /// Apply a quality preset locally, exactly as a SET_PARAMETER would.
    pub fn set_quality(&self, preset: QualityPreset) -> Result<StreamingConfig> {
        self.controller.apply_preset(preset)
    }

    /// Register an observer called after every applied quality change.
    pub fn on_quality_change<F>(&self, observer: F)
    where
        F: Fn(QualityPreset, &StreamingConfig) + Send + Sync + 'static,
    {
        self.controller.on_quality_change(observer);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
