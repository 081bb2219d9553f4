mod file_encoder;

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use monkeysee::server::DEFAULT_BIND_ADDR;
use monkeysee::{Encoder, QualityPreset, Server, ServerConfig, StreamingConfig};

use crate::file_encoder::FileEncoder;

#[derive(Parser)]
#[command(
    name = "monkeysee-server",
    about = "Single-client RTSP/RTP server for H.264 + AAC camera streams"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    /// Initial quality preset (low, medium, high, ultra)
    #[arg(long, short, default_value = "high")]
    quality: QualityPreset,

    /// Close an idle control connection after this many seconds (0 = never)
    #[arg(long, default_value_t = 60)]
    read_timeout_secs: u64,

    /// H.264 Annex B file replayed as the camera feed
    #[arg(long, short)]
    input: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: args.bind,
        initial_quality: args.quality,
        read_timeout: (args.read_timeout_secs > 0).then(|| Duration::from_secs(args.read_timeout_secs)),
        ..ServerConfig::default()
    };

    let origin = Instant::now();
    let input = args.input;
    let mut server = Server::new(config, move |_: &StreamingConfig| -> Box<dyn Encoder> {
        Box::new(FileEncoder::new(input.clone(), origin))
    });
    server.on_quality_change(|preset, config| {
        tracing::info!(%preset, %config, "quality preset applied");
    });

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    match server.local_addr() {
        Ok(addr) => println!("RTSP server on rtsp://{}/camera, press Enter to stop", addr),
        Err(e) => eprintln!("Server address unavailable: {}", e),
    }

    let mut line = String::new();
    if let Err(e) = io::stdin().read_line(&mut line) {
        tracing::warn!(error = %e, "stdin closed");
    }

    server.stop();
}
