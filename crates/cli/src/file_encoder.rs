use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use monkeysee::media::nal::{NalType, split_nal_units};
use monkeysee::{Encoder, MediaSink, Result, RtspError, StreamingConfig};

/// Replays an H.264 Annex B file as if it were a live camera.
///
/// Each coded slice is pushed as one video unit, paced at the configured
/// frame rate; SPS/PPS go through their own callbacks. The file loops
/// until [`stop`](Encoder::stop) or until its sink is superseded.
/// Timestamps count from `origin`, which is shared by every instance so
/// they keep increasing across restarts.
pub struct FileEncoder {
    input: Option<PathBuf>,
    origin: Instant,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FileEncoder {
    pub fn new(input: Option<PathBuf>, origin: Instant) -> Self {
        Self {
            input,
            origin,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Encoder for FileEncoder {
    fn start(&mut self, config: &StreamingConfig, sink: MediaSink) -> Result<()> {
        let Some(path) = &self.input else {
            tracing::info!("no input file, serving signaling only");
            return Ok(());
        };

        let data = std::fs::read(path)
            .map_err(|e| RtspError::Encoder(format!("{}: {e}", path.display())))?;
        let nals: Vec<Vec<u8>> = split_nal_units(&data).map(<[u8]>::to_vec).collect();
        if !nals.iter().any(|nal| is_slice(nal)) {
            return Err(RtspError::Encoder(format!(
                "{}: no H.264 slices found",
                path.display()
            )));
        }

        let frame_interval = Duration::from_secs(1) / config.video_fps.max(1);
        let origin = self.origin;
        let stop = self.stop.clone();
        stop.store(false, Ordering::SeqCst);

        tracing::info!(path = %path.display(), nals = nals.len(), fps = config.video_fps, "replaying input file");

        let worker = thread::Builder::new()
            .name("file-encoder".into())
            .spawn(move || replay(&nals, &sink, origin, frame_interval, &stop))
            .map_err(|e| RtspError::Encoder(e.to_string()))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("file encoder thread panicked");
        }
    }
}

fn is_slice(nal: &[u8]) -> bool {
    matches!(
        NalType::of(nal),
        Some(NalType::IdrSlice | NalType::NonIdrSlice)
    )
}

fn replay(nals: &[Vec<u8>], sink: &MediaSink, origin: Instant, frame_interval: Duration, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        for nal in nals {
            if stop.load(Ordering::SeqCst) || !sink.is_current() {
                return;
            }
            let micros = origin.elapsed().as_micros() as u64;
            match NalType::of(nal) {
                Some(NalType::Sps) => sink.on_sps(nal),
                Some(NalType::Pps) => sink.on_pps(nal),
                Some(NalType::IdrSlice) => {
                    sink.on_video_unit(nal, micros, true);
                    thread::sleep(frame_interval);
                }
                Some(NalType::NonIdrSlice) => {
                    sink.on_video_unit(nal, micros, false);
                    thread::sleep(frame_interval);
                }
                _ => sink.on_video_unit(nal, micros, false),
            }
        }
    }
}
