use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::media::Packetizer;
use crate::media::aac::{AAC_PAYLOAD_TYPE, AacPacketizer};
use crate::media::h264::{H264_PAYLOAD_TYPE, H264Packetizer};
use crate::media::nal::{NalType, split_nal_units, strip_start_code};
use crate::session::Track;
use crate::transport::UdpTransport;

/// Sequence/timestamp snapshot of one track, reported in `RTP-Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpInfo {
    /// Sequence number the next packet will carry.
    pub sequence: u16,
    /// RTP timestamp of the most recent unit.
    pub rtp_time: u32,
}

impl RtpInfo {
    fn of(packetizer: &dyn Packetizer) -> Self {
        Self {
            sequence: packetizer.next_sequence(),
            rtp_time: packetizer.last_rtp_timestamp(),
        }
    }
}

struct VideoTrack {
    generation: u64,
    packetizer: H264Packetizer,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    /// SPS/PPS announced ahead of an IDR since the last PLAY or restart.
    parameter_sets_sent: bool,
}

struct AudioTrack {
    generation: u64,
    packetizer: AacPacketizer,
    config: Option<Vec<u8>>,
    config_sent: bool,
}

#[derive(Debug, Default)]
struct Delivery {
    video: Option<SocketAddr>,
    audio: Option<SocketAddr>,
    playing: bool,
}

/// Routes encoder output through the packetizers to the client.
///
/// The pipeline outlives every encoder instance: it owns the RTP stream
/// state of both tracks (SSRC, sequence, timestamp), so an encoder
/// restart never breaks stream continuity.
///
/// Each track's lock is held from the generation check through the UDP
/// send, and [`begin_generation`](Self::begin_generation) takes both
/// locks. A unit from a superseded encoder is therefore either fully sent
/// before the switch or dropped after it.
pub struct MediaPipeline {
    generation: AtomicU64,
    video: Mutex<VideoTrack>,
    audio: Mutex<AudioTrack>,
    delivery: RwLock<Delivery>,
    udp: RwLock<Option<UdpTransport>>,
}

impl MediaPipeline {
    /// Create a pipeline with fresh random SSRCs and initial sequence numbers.
    pub fn new(audio_sample_rate: u32) -> Self {
        Self::with_packetizers(
            H264Packetizer::with_random_ssrc(H264_PAYLOAD_TYPE),
            AacPacketizer::with_random_ssrc(AAC_PAYLOAD_TYPE, audio_sample_rate),
        )
    }

    pub fn with_packetizers(video: H264Packetizer, audio: AacPacketizer) -> Self {
        Self {
            generation: AtomicU64::new(0),
            video: Mutex::new(VideoTrack {
                generation: 0,
                packetizer: video,
                sps: None,
                pps: None,
                parameter_sets_sent: false,
            }),
            audio: Mutex::new(AudioTrack {
                generation: 0,
                packetizer: audio,
                config: None,
                config_sent: false,
            }),
            delivery: RwLock::new(Delivery::default()),
            udp: RwLock::new(None),
        }
    }

    /// Install (or remove) the socket RTP packets are sent from.
    pub fn attach_transport(&self, udp: Option<UdpTransport>) {
        *self.udp.write() = udp;
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every outstanding sink and return the new generation.
    ///
    /// Cached SPS/PPS belong to the superseded encoder and are discarded;
    /// the next encoder's parameter sets are captured afresh.
    pub fn begin_generation(&self) -> u64 {
        let mut video = self.video.lock();
        let mut audio = self.audio.lock();

        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        video.generation = next;
        video.sps = None;
        video.pps = None;
        video.parameter_sets_sent = false;
        audio.generation = next;

        tracing::debug!(generation = next, "encoder generation started");
        next
    }

    /// Destination of `track`'s packets, recorded at SETUP.
    pub fn set_destination(&self, track: Track, addr: SocketAddr) {
        let mut delivery = self.delivery.write();
        match track {
            Track::Video => delivery.video = Some(addr),
            Track::Audio => delivery.audio = Some(addr),
        }
    }

    /// Begin delivery. Parameter sets and audio config are announced again
    /// ahead of the next IDR / audio frame.
    pub fn start_playing(&self) {
        self.video.lock().parameter_sets_sent = false;
        self.audio.lock().config_sent = false;
        self.delivery.write().playing = true;
        tracing::info!("media delivery started");
    }

    pub fn is_playing(&self) -> bool {
        self.delivery.read().playing
    }

    /// Forget both destinations and stop delivery (TEARDOWN / disconnect).
    pub fn reset(&self) {
        let mut delivery = self.delivery.write();
        if delivery.playing {
            tracing::info!("media delivery stopped");
        }
        *delivery = Delivery::default();
    }

    pub fn rtp_info(&self, track: Track) -> RtpInfo {
        match track {
            Track::Video => RtpInfo::of(&self.video.lock().packetizer),
            Track::Audio => RtpInfo::of(&self.audio.lock().packetizer),
        }
    }

    pub(crate) fn push_video(&self, generation: u64, bytes: &[u8], timestamp_micros: u64, key_frame: bool) {
        let mut video = self.video.lock();
        if video.generation != generation {
            tracing::trace!(generation, "dropping video unit from superseded encoder");
            return;
        }

        let nals: Vec<&[u8]> = split_nal_units(bytes).collect();
        let mut idr = key_frame;
        let mut inline_sps = false;
        let mut inline_pps = false;
        for nal in &nals {
            match NalType::of(nal) {
                Some(NalType::Sps) => {
                    video.sps = Some(nal.to_vec());
                    inline_sps = true;
                }
                Some(NalType::Pps) => {
                    video.pps = Some(nal.to_vec());
                    inline_pps = true;
                }
                Some(NalType::IdrSlice) => idr = true,
                _ => {}
            }
        }

        let Some(dest) = self.destination(Track::Video) else {
            return;
        };

        let mut packets = Vec::new();
        let VideoTrack {
            packetizer,
            sps,
            pps,
            parameter_sets_sent,
            ..
        } = &mut *video;

        // Parameter sets the unit does not carry itself go ahead of its first slice.
        let mut announce: Vec<&[u8]> = Vec::new();
        if idr && !*parameter_sets_sent {
            let sets = [(inline_sps, sps.as_deref()), (inline_pps, pps.as_deref())];
            if sets.iter().all(|(inline, cached)| *inline || cached.is_some()) {
                announce = sets
                    .into_iter()
                    .filter(|(inline, _)| !inline)
                    .filter_map(|(_, cached)| cached)
                    .collect();
                *parameter_sets_sent = true;
                if !announce.is_empty() {
                    tracing::debug!(count = announce.len(), "announced parameter sets ahead of IDR");
                }
            } else {
                tracing::debug!("IDR without known SPS/PPS");
            }
        }

        let first_slice = nals
            .iter()
            .position(|nal| {
                matches!(
                    NalType::of(nal),
                    Some(NalType::IdrSlice | NalType::NonIdrSlice)
                )
            })
            .unwrap_or(0);
        for (i, nal) in nals.iter().enumerate() {
            if i == first_slice {
                for set in announce.drain(..) {
                    packets.extend(packetizer.packetize_nal(set, timestamp_micros));
                }
            }
            packets.extend(packetizer.packetize_nal(nal, timestamp_micros));
        }

        self.send(Track::Video, &packets, dest);
    }

    pub(crate) fn push_sps(&self, generation: u64, bytes: &[u8]) {
        let mut video = self.video.lock();
        if video.generation != generation {
            return;
        }
        let nal = strip_start_code(bytes);
        if !nal.is_empty() && video.sps.as_deref() != Some(nal) {
            video.sps = Some(nal.to_vec());
            video.parameter_sets_sent = false;
            tracing::debug!(bytes = nal.len(), "SPS captured");
        }
    }

    pub(crate) fn push_pps(&self, generation: u64, bytes: &[u8]) {
        let mut video = self.video.lock();
        if video.generation != generation {
            return;
        }
        let nal = strip_start_code(bytes);
        if !nal.is_empty() && video.pps.as_deref() != Some(nal) {
            video.pps = Some(nal.to_vec());
            video.parameter_sets_sent = false;
            tracing::debug!(bytes = nal.len(), "PPS captured");
        }
    }

    pub(crate) fn push_audio(&self, generation: u64, frame: &[u8], timestamp_micros: u64) {
        let mut audio = self.audio.lock();
        if audio.generation != generation {
            tracing::trace!(generation, "dropping audio frame from superseded encoder");
            return;
        }

        let Some(dest) = self.destination(Track::Audio) else {
            return;
        };

        let mut packets = Vec::with_capacity(2);
        let AudioTrack {
            packetizer,
            config,
            config_sent,
            ..
        } = &mut *audio;

        if !*config_sent && let Some(config) = config.as_deref() {
            match packetizer.packetize_config(config, timestamp_micros) {
                Ok(packet) => packets.push(packet),
                Err(e) => tracing::warn!(error = %e, "audio config not sent"),
            }
            *config_sent = true;
        }

        match packetizer.packetize_frame(frame, timestamp_micros) {
            Ok(packet) => packets.push(packet),
            Err(e) => tracing::warn!(error = %e, "dropping audio frame"),
        }

        self.send(Track::Audio, &packets, dest);
    }

    pub(crate) fn push_audio_config(&self, generation: u64, bytes: &[u8]) {
        let mut audio = self.audio.lock();
        if audio.generation != generation || bytes.is_empty() {
            return;
        }
        if audio.config.as_deref() != Some(bytes) {
            audio.config = Some(bytes.to_vec());
            audio.config_sent = false;
            tracing::debug!(bytes = bytes.len(), "audio config captured");
        }
    }

    fn destination(&self, track: Track) -> Option<SocketAddr> {
        let delivery = self.delivery.read();
        if !delivery.playing {
            return None;
        }
        match track {
            Track::Video => delivery.video,
            Track::Audio => delivery.audio,
        }
    }

    /// Send packets in order. The first failure abandons the rest of the unit.
    fn send(&self, track: Track, packets: &[Vec<u8>], dest: SocketAddr) {
        if packets.is_empty() {
            return;
        }
        let udp = self.udp.read();
        let Some(udp) = udp.as_ref() else {
            tracing::trace!(?track, "no RTP socket, dropping packets");
            return;
        };

        for packet in packets {
            if let Err(e) = udp.send_to(packet, dest) {
                tracing::warn!(?track, %dest, error = %e, "RTP send failed");
                return;
            }
        }
        tracing::trace!(?track, %dest, packets = packets.len(), "RTP packets sent");
    }
}
