use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::{QualityPreset, StreamingConfig};
use crate::error::Result;
use crate::stream::encoder::{Encoder, EncoderFactory, MediaSink};
use crate::stream::pipeline::MediaPipeline;

/// Callback invoked after a quality preset has been applied.
pub type QualityObserver = Arc<dyn Fn(QualityPreset, &StreamingConfig) + Send + Sync>;

/// Owns the active [`StreamingConfig`] and the running encoder instance.
///
/// Starting, stopping and re-creating the encoder all happen under one
/// mutex, so a quality change is a single transition from the point of
/// view of every other caller. The packetizers live in the shared
/// [`MediaPipeline`] and are never replaced.
pub struct StreamController {
    pipeline: Arc<MediaPipeline>,
    factory: Box<dyn EncoderFactory>,
    preset: RwLock<QualityPreset>,
    config: RwLock<StreamingConfig>,
    encoder: Mutex<Option<Box<dyn Encoder>>>,
    observers: RwLock<Vec<QualityObserver>>,
}

impl StreamController {
    pub fn new(
        pipeline: Arc<MediaPipeline>,
        factory: Box<dyn EncoderFactory>,
        preset: QualityPreset,
    ) -> Self {
        Self {
            pipeline,
            factory,
            preset: RwLock::new(preset),
            config: RwLock::new(StreamingConfig::from_preset(preset)),
            encoder: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> StreamingConfig {
        *self.config.read()
    }

    pub fn preset(&self) -> QualityPreset {
        *self.preset.read()
    }

    pub fn is_running(&self) -> bool {
        self.encoder.lock().is_some()
    }

    pub fn on_quality_change<F>(&self, observer: F)
    where
        F: Fn(QualityPreset, &StreamingConfig) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// Start an encoder for the active config. No-op when one is running.
    pub fn start(&self) -> Result<()> {
        let mut encoder = self.encoder.lock();
        if encoder.is_some() {
            return Ok(());
        }
        let config = self.config();
        *encoder = Some(self.launch(&config)?);
        tracing::info!(%config, "encoder started");
        Ok(())
    }

    /// Stop the running encoder, if any, and invalidate its sink.
    pub fn stop(&self) {
        let mut encoder = self.encoder.lock();
        self.pipeline.begin_generation();
        if let Some(mut running) = encoder.take() {
            running.stop();
            tracing::info!("encoder stopped");
        }
    }

    /// Install `preset` as the active quality.
    ///
    /// With an encoder running, it is stopped and a new one started for
    /// the new config. If the new encoder fails to start, the previous
    /// config stays active, an encoder is restarted for it, and the
    /// start failure is returned. Observers run after a successful swap.
    pub fn apply_preset(&self, preset: QualityPreset) -> Result<StreamingConfig> {
        let new_config = StreamingConfig::from_preset(preset);
        let mut encoder = self.encoder.lock();

        if let Some(mut running) = encoder.take() {
            self.pipeline.begin_generation();
            running.stop();

            match self.launch(&new_config) {
                Ok(replacement) => *encoder = Some(replacement),
                Err(e) => {
                    tracing::error!(%preset, error = %e, "encoder restart failed, keeping previous quality");
                    let previous = self.config();
                    match self.launch(&previous) {
                        Ok(restored) => *encoder = Some(restored),
                        Err(e) => tracing::error!(error = %e, "failed to restore previous encoder"),
                    }
                    return Err(e);
                }
            }
        }

        *self.config.write() = new_config;
        *self.preset.write() = preset;
        drop(encoder);

        tracing::info!(%preset, config = %new_config, "quality changed");
        // Observers may register further observers, so none runs under the lock.
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer(preset, &new_config);
        }
        Ok(new_config)
    }

    fn launch(&self, config: &StreamingConfig) -> Result<Box<dyn Encoder>> {
        let generation = self.pipeline.begin_generation();
        let mut encoder = self.factory.create(config);
        encoder.start(config, MediaSink::new(self.pipeline.clone(), generation))?;
        Ok(encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RtspError;
    use crate::media::aac::{AAC_PAYLOAD_TYPE, AacPacketizer};
    use crate::media::h264::{H264_PAYLOAD_TYPE, H264Packetizer};
    use crate::session::Track;
    use crate::transport::UdpTransport;
    use std::net::UdpSocket;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    #[derive(Default)]
    struct Record {
        started: Mutex<Vec<StreamingConfig>>,
        stops: AtomicUsize,
        fail_width: Mutex<Option<u32>>,
    }

    struct MockEncoder {
        record: Arc<Record>,
    }

    impl Encoder for MockEncoder {
        fn start(&mut self, config: &StreamingConfig, _sink: MediaSink) -> Result<()> {
            if *self.record.fail_width.lock() == Some(config.video_width) {
                return Err(RtspError::Encoder("camera busy".into()));
            }
            self.record.started.lock().push(*config);
            Ok(())
        }

        fn stop(&mut self) {
            self.record.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (StreamController, Arc<Record>) {
        let record = Arc::new(Record::default());
        let factory_record = record.clone();
        let factory = move |_: &StreamingConfig| -> Box<dyn Encoder> {
            Box::new(MockEncoder {
                record: factory_record.clone(),
            })
        };
        let controller = StreamController::new(
            Arc::new(MediaPipeline::new(48_000)),
            Box::new(factory),
            QualityPreset::High,
        );
        (controller, record)
    }

    #[test]
    fn start_is_idempotent() {
        let (controller, record) = controller();
        controller.start().unwrap();
        controller.start().unwrap();
        assert!(controller.is_running());
        assert_eq!(record.started.lock().len(), 1);
    }

    #[test]
    fn apply_preset_restarts_encoder() {
        let (controller, record) = controller();
        controller.start().unwrap();

        let config = controller.apply_preset(QualityPreset::Ultra).unwrap();
        assert_eq!((config.video_width, config.video_height), (1920, 1080));
        assert_eq!(controller.config().video_bitrate, 4_000_000);
        assert_eq!(controller.preset(), QualityPreset::Ultra);

        let started = record.started.lock();
        assert_eq!(started.len(), 2);
        assert_eq!(started[1].video_width, 1920);
        assert_eq!(record.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn apply_preset_without_encoder_only_swaps_config() {
        let (controller, record) = controller();
        controller.apply_preset(QualityPreset::Low).unwrap();
        assert_eq!(controller.config().video_width, 640);
        assert!(record.started.lock().is_empty());
        assert!(!controller.is_running());
    }

    #[test]
    fn failed_restart_keeps_previous_config() {
        let (controller, record) = controller();
        controller.start().unwrap();
        *record.fail_width.lock() = Some(1920);

        let err = controller.apply_preset(QualityPreset::Ultra).unwrap_err();
        assert!(matches!(err, RtspError::Encoder(_)));
        assert_eq!(controller.config(), StreamingConfig::default());
        assert!(controller.is_running());

        let started = record.started.lock();
        assert_eq!(started.len(), 2);
        assert_eq!(started[1], StreamingConfig::default());
    }

    #[test]
    fn observers_notified_after_swap() {
        let (controller, _record) = controller();
        let notified = Arc::new(AtomicBool::new(false));
        let seen = notified.clone();
        controller.on_quality_change(move |preset, config| {
            assert_eq!(preset, QualityPreset::Medium);
            assert_eq!(config.video_fps, 24);
            seen.store(true, Ordering::SeqCst);
        });
        controller.apply_preset(QualityPreset::Medium).unwrap();
        assert!(notified.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_invalidates_sink_generation() {
        let (controller, _record) = controller();
        controller.start().unwrap();
        let before = controller.pipeline.generation();
        controller.stop();
        assert!(!controller.is_running());
        assert!(controller.pipeline.generation() > before);
    }

    #[test]
    fn observer_may_register_another_observer() {
        let controller = Arc::new(controller().0);
        let registrar = controller.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        controller.on_quality_change(move |_, _| {
            let counted = counted.clone();
            registrar.on_quality_change(move |_, _| {
                counted.fetch_add(1, Ordering::SeqCst);
            });
        });

        controller.apply_preset(QualityPreset::Low).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        controller.apply_preset(QualityPreset::Medium).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Pushes a P-slice every millisecond from its own thread until stopped.
    struct ProducerEncoder {
        stop: Arc<AtomicBool>,
        worker: Option<JoinHandle<()>>,
    }

    impl Encoder for ProducerEncoder {
        fn start(&mut self, _config: &StreamingConfig, sink: MediaSink) -> Result<()> {
            let stop = self.stop.clone();
            self.worker = Some(thread::spawn(move || {
                let mut micros = 0u64;
                while !stop.load(Ordering::SeqCst) {
                    sink.on_video_unit(&[0, 0, 0, 1, 0x41, 0x9a, 0x02], micros, false);
                    micros += 1_000;
                    thread::sleep(Duration::from_millis(1));
                }
            }));
            Ok(())
        }

        fn stop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(worker) = self.worker.take() {
                worker.join().unwrap();
            }
        }
    }

    #[test]
    fn swapping_encoders_under_load_keeps_rtp_stream_continuous() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let dest = receiver.local_addr().unwrap();

        let pipeline = Arc::new(MediaPipeline::with_packetizers(
            H264Packetizer::new(H264_PAYLOAD_TYPE, 0x5151, 65_500),
            AacPacketizer::new(AAC_PAYLOAD_TYPE, 48_000, 0x6161, 0),
        ));
        pipeline.attach_transport(Some(UdpTransport::bind_to("127.0.0.1:0").unwrap()));
        pipeline.set_destination(Track::Video, dest);
        pipeline.start_playing();

        let collector = thread::spawn(move || {
            let mut packets = Vec::new();
            let mut buf = [0u8; 2048];
            while let Ok((n, _)) = receiver.recv_from(&mut buf) {
                packets.push(buf[..n].to_vec());
            }
            packets
        });

        let factory = |_: &StreamingConfig| -> Box<dyn Encoder> {
            Box::new(ProducerEncoder {
                stop: Arc::new(AtomicBool::new(false)),
                worker: None,
            })
        };
        let controller =
            StreamController::new(pipeline.clone(), Box::new(factory), QualityPreset::High);
        controller.start().unwrap();
        for preset in [QualityPreset::Low, QualityPreset::Ultra, QualityPreset::Medium] {
            thread::sleep(Duration::from_millis(20));
            controller.apply_preset(preset).unwrap();
        }
        thread::sleep(Duration::from_millis(20));
        controller.stop();

        let packets = collector.join().unwrap();
        assert!(packets.len() > 10, "only {} packets received", packets.len());
        for (i, packet) in packets.iter().enumerate() {
            let sequence = u16::from_be_bytes([packet[2], packet[3]]);
            assert_eq!(sequence, 65_500u16.wrapping_add(i as u16));
            assert_eq!(&packet[8..12], &0x5151u32.to_be_bytes());
        }
        assert_eq!(
            pipeline.rtp_info(Track::Video).sequence,
            65_500u16.wrapping_add(packets.len() as u16)
        );
    }
}
