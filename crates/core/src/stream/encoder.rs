use std::sync::Arc;

use crate::config::StreamingConfig;
use crate::error::Result;
use crate::stream::pipeline::MediaPipeline;

/// External audio/video encoder feeding the server.
///
/// Implementations run their own capture thread and push encoded units
/// into the [`MediaSink`] handed to [`start`](Self::start). A quality
/// change stops the running instance and starts a fresh one from the
/// [`EncoderFactory`]; the sink of the stopped instance goes stale and
/// anything it still delivers is dropped.
pub trait Encoder: Send {
    /// Begin producing media for `config`.
    ///
    /// Failing to start is reported as [`RtspError::Encoder`](crate::RtspError::Encoder).
    fn start(&mut self, config: &StreamingConfig, sink: MediaSink) -> Result<()>;

    /// Stop producing media. Must not call back into the sink once it returns.
    fn stop(&mut self);
}

/// Creates encoder instances for a given configuration.
pub trait EncoderFactory: Send + Sync {
    fn create(&self, config: &StreamingConfig) -> Box<dyn Encoder>;
}

impl<F> EncoderFactory for F
where
    F: Fn(&StreamingConfig) -> Box<dyn Encoder> + Send + Sync,
{
    fn create(&self, config: &StreamingConfig) -> Box<dyn Encoder> {
        self(config)
    }
}

/// Callback surface an [`Encoder`] pushes encoded units into.
///
/// Each sink is bound to one encoder generation. Calls made through a
/// sink whose generation has been superseded are ignored.
#[derive(Clone)]
pub struct MediaSink {
    pipeline: Arc<MediaPipeline>,
    generation: u64,
}

impl MediaSink {
    pub(crate) fn new(pipeline: Arc<MediaPipeline>, generation: u64) -> Self {
        Self {
            pipeline,
            generation,
        }
    }

    /// Whether this sink still belongs to the running encoder.
    pub fn is_current(&self) -> bool {
        self.pipeline.generation() == self.generation
    }

    /// An encoded H.264 access unit (one or more Annex B NAL units).
    pub fn on_video_unit(&self, bytes: &[u8], timestamp_micros: u64, key_frame: bool) {
        self.pipeline
            .push_video(self.generation, bytes, timestamp_micros, key_frame);
    }

    /// Sequence parameter set, with or without a start code.
    pub fn on_sps(&self, bytes: &[u8]) {
        self.pipeline.push_sps(self.generation, bytes);
    }

    /// Picture parameter set, with or without a start code.
    pub fn on_pps(&self, bytes: &[u8]) {
        self.pipeline.push_pps(self.generation, bytes);
    }

    /// One raw (ADTS-free) AAC access unit.
    pub fn on_audio_frame(&self, bytes: &[u8], timestamp_micros: u64) {
        self.pipeline
            .push_audio(self.generation, bytes, timestamp_micros);
    }

    /// AudioSpecificConfig blob.
    pub fn on_audio_config(&self, bytes: &[u8]) {
        self.pipeline.push_audio_config(self.generation, bytes);
    }
}

impl std::fmt::Debug for MediaSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSink")
            .field("generation", &self.generation)
            .finish()
    }
}
