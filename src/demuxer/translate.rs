//! Mapping from container output to the records handed to the caller.

use bytes::Bytes;

use super::dispatch::{DemuxEvent, Message};
use crate::av::{
    AudioCodec, AudioConfig, CodecType, DemuxerType, DrmInitData, ElementaryStreamPacket,
    StreamType, TimeTicks, VideoCodec, VideoConfig,
};
use crate::codec::aac::{prepend_adts_header, AACConfig, AACParser};
use crate::codec::h264::AvcDecoderConfig;
use crate::codec::nal::ParameterSets;
use crate::codec::read_picture_format;
use crate::format::{CodecParameters, ContainerPacket, StreamLayout, TimeBase};
use crate::{DemuxError, Result};

struct VideoTrack {
    index: usize,
    codec: VideoCodec,
    time_base: TimeBase,
    /// Present when samples are length-prefixed and need Annex-B framing.
    avcc: Option<AvcDecoderConfig>,
    sets: ParameterSets,
    config: VideoConfig,
}

struct AudioTrack {
    index: usize,
    time_base: TimeBase,
    aac: Option<AACConfig>,
    config: AudioConfig,
}

/// Turns codec parameters and container packets into typed records.
///
/// Lives on the worker thread and is rebuilt with every container, so no
/// configuration survives a flush.
pub(crate) struct Translator {
    kind: DemuxerType,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
    offset: TimeTicks,
    adts: AACParser,
}

fn degraded(reason: String) {
    log::warn!("{}", DemuxError::ExtractionDegraded(reason));
}

impl Translator {
    pub fn new(kind: DemuxerType, offset: TimeTicks) -> Self {
        Self {
            kind,
            video: None,
            audio: None,
            offset,
            adts: AACParser::new(),
        }
    }

    /// Replaces the offset added to every timestamp translated from now on.
    pub fn set_offset(&mut self, offset: TimeTicks) {
        self.offset = offset;
    }

    pub fn offset(&self) -> TimeTicks {
        self.offset
    }

    /// Selects the streams this instance serves and builds the records
    /// delivered before `Initialized`: video config, audio config, then DRM
    /// init data. Fails with `ProbeIncomplete` when a required stream is
    /// missing from the layout.
    pub fn initial_events(
        &mut self,
        layout: &StreamLayout,
        lookup: &dyn Fn(usize) -> Option<CodecParameters>,
    ) -> Result<Vec<DemuxEvent>> {
        let video = if self.kind.accepts(StreamType::Video) {
            layout.video()
        } else {
            None
        };
        let audio = if self.kind.accepts(StreamType::Audio) {
            layout.audio()
        } else {
            None
        };

        match self.kind {
            DemuxerType::Video if video.is_none() => {
                return Err(DemuxError::ProbeIncomplete("no video stream found".into()))
            }
            DemuxerType::Audio if audio.is_none() => {
                return Err(DemuxError::ProbeIncomplete("no audio stream found".into()))
            }
            DemuxerType::Muxed if video.is_none() && audio.is_none() => {
                return Err(DemuxError::ProbeIncomplete("no supported stream found".into()))
            }
            _ => {}
        }

        let mut events = Vec::new();
        let mut protection = Vec::new();

        if let Some(index) = video {
            let params = lookup(index).ok_or_else(|| {
                DemuxError::ProbeIncomplete(format!("no parameters for stream {}", index))
            })?;
            let track = self.open_video(index, &params)?;
            log::debug!(
                "video config: {:?} {}x{} profile {} level {}",
                track.config.codec,
                track.config.width,
                track.config.height,
                track.config.profile,
                track.config.level
            );
            events.push(DemuxEvent::VideoConfig(track.config.clone()));
            self.video = Some(track);
            protection.extend(params.protection);
        }

        if let Some(index) = audio {
            let params = lookup(index).ok_or_else(|| {
                DemuxError::ProbeIncomplete(format!("no parameters for stream {}", index))
            })?;
            let track = open_audio(index, &params);
            log::debug!(
                "audio config: {} Hz, {} channels",
                track.config.sample_rate,
                track.config.channels
            );
            events.push(DemuxEvent::AudioConfig(track.config.clone()));
            self.audio = Some(track);
            protection.extend(params.protection);
        }

        for info in protection {
            events.push(DemuxEvent::DrmInitData(DrmInitData {
                protection_scheme: info.scheme,
                init_data: info.init_data,
            }));
        }

        Ok(events)
    }

    fn open_video(&mut self, index: usize, params: &CodecParameters) -> Result<VideoTrack> {
        let codec = match params.codec {
            CodecType::Video(codec) => codec,
            other => {
                return Err(DemuxError::ProbeIncomplete(format!(
                    "stream {} is not video: {:?}",
                    index, other
                )))
            }
        };

        let mut config = VideoConfig::new(codec);
        config.profile = params.profile;
        config.level = params.level;
        config.width = params.width;
        config.height = params.height;

        let mut avcc = None;
        let sets = if params.extradata.is_empty() {
            degraded(format!("stream {} has no parameter sets", index));
            ParameterSets::default()
        } else if codec == VideoCodec::H264 && AvcDecoderConfig::is_avcc(&params.extradata) {
            match AvcDecoderConfig::parse(&params.extradata) {
                Ok(record) => {
                    config.profile = record.profile_idc;
                    config.level = record.level_idc;
                    let sets = ParameterSets {
                        vps: Vec::new(),
                        sps: record.sps.clone(),
                        pps: record.pps.clone(),
                    };
                    avcc = Some(record);
                    sets
                }
                Err(e) => {
                    degraded(format!("unreadable avcC record: {}", e));
                    ParameterSets::default()
                }
            }
        } else {
            ParameterSets::from_annex_b(codec, &params.extradata)
        };

        apply_parameter_sets(codec, &sets, &mut config);
        Ok(VideoTrack {
            index,
            codec,
            time_base: params.time_base,
            avcc,
            sets,
            config,
        })
    }



    /// Translates one container packet. Packets of streams this instance
    /// does not serve yield nothing; a changed configuration comes out
    /// ahead of the packet it was found in.
    pub fn translate_packet(&mut self, packet: ContainerPacket) -> Vec<DemuxEvent> {
        if self.video.as_ref().map(|t| t.index) == Some(packet.stream_index) {
            self.translate_video(packet)
        } else if self.audio.as_ref().map(|t| t.index) == Some(packet.stream_index) {
            self.translate_audio(packet)
        } else {
            log::trace!("skipping packet of stream {}", packet.stream_index);
            Vec::new()
        }
    }

    fn translate_video(&mut self, packet: ContainerPacket) -> Vec<DemuxEvent> {
        let mut events = Vec::with_capacity(2);
        let Some(mut track) = self.video.take() else {
            return events;
        };

        let data = match &track.avcc {
            Some(record) => match record.sample_to_annex_b(&packet.data) {
                Ok(data) => data,
                Err(e) => {
                    degraded(format!("sample kept length-prefixed: {}", e));
                    packet.data.clone()
                }
            },
            None => packet.data.clone(),
        };

        if packet.is_key {
            let sets = ParameterSets::from_annex_b(track.codec, &data);
            if sets.is_complete(track.codec) {
                if sets != track.sets {
                    let mut config = VideoConfig::new(track.codec);
                    config.profile = track.config.profile;
                    config.level = track.config.level;
                    config.width = track.config.width;
                    config.height = track.config.height;
                    apply_parameter_sets(track.codec, &sets, &mut config);
                    log::debug!(
                        "in-band video config change: {}x{} profile {} level {}",
                        config.width,
                        config.height,
                        config.profile,
                        config.level
                    );
                    track.sets = sets;
                    track.config = config.clone();
                    events.push(DemuxEvent::VideoConfig(config));
                }
            } else if !sets.is_empty() {
                degraded("incomplete in-band parameter sets on key frame".into());
            }
        }

        let es = self.build_packet(StreamType::Video, track.time_base, &packet, data);
        self.video = Some(track);
        events.push(DemuxEvent::Message(Message::Packet(es)));
        events
    }

    fn translate_audio(&mut self, packet: ContainerPacket) -> Vec<DemuxEvent> {
        let mut events = Vec::with_capacity(2);
        let Some(mut track) = self.audio.take() else {
            return events;
        };

        let is_adts = packet.data.len() >= 2 && packet.data[0] == 0xFF && packet.data[1] & 0xF0 == 0xF0;
        let data = if is_adts {
            match self.adts.parse_adts_header(&packet.data) {
                Ok(header) => {
                    let config = header.config();
                    if track.aac.as_ref() != Some(&config) {
                        let audio_config = audio_config_from(&config);
                        log::debug!(
                            "in-band audio config change: {} Hz, {} channels",
                            audio_config.sample_rate,
                            audio_config.channels
                        );
                        track.aac = Some(config);
                        track.config = audio_config.clone();
                        events.push(DemuxEvent::AudioConfig(audio_config));
                    }
                }
                Err(e) => degraded(format!("unreadable ADTS header: {}", e)),
            }
            packet.data.clone()
        } else {
            match &track.aac {
                Some(config) => prepend_adts_header(config, &packet.data),
                None => {
                    degraded("raw AAC frame without AudioSpecificConfig".into());
                    packet.data.clone()
                }
            }
        };

        let es = self.build_packet(StreamType::Audio, track.time_base, &packet, data);
        self.audio = Some(track);
        events.push(DemuxEvent::Message(Message::Packet(es)));
        events
    }

    fn build_packet(
        &self,
        stream_type: StreamType,
        time_base: TimeBase,
        packet: &ContainerPacket,
        data: Bytes,
    ) -> ElementaryStreamPacket {
        let pts = packet
            .pts
            .map(|ticks| time_base.to_seconds(ticks) + self.offset)
            .unwrap_or(self.offset);
        let dts = packet
            .dts
            .map(|ticks| time_base.to_seconds(ticks) + self.offset)
            .unwrap_or(pts);

        let mut es = ElementaryStreamPacket::new(stream_type, data)
            .with_pts(pts)
            .with_dts(dts)
            .with_duration(time_base.to_seconds(packet.duration))
            .with_key_flag(packet.is_key);
        if let Some(encryption) = &packet.encryption {
            es = es.with_encryption(encryption.clone());
        }
        log::trace!("{} packet: pts {:.3} dts {:.3} key {}", stream_type, es.pts, es.dts, es.is_key_frame);
        es
    }
}

/// Fills `config` from `sets`, re-reading the SPS. An unreadable SPS keeps
/// the previous profile, level and size.
fn apply_parameter_sets(codec: VideoCodec, sets: &ParameterSets, config: &mut VideoConfig) {
    config.extra_data = if sets.is_empty() {
        Bytes::new()
    } else {
        sets.to_annex_b()
    };
    let Some(sps) = sets.sps.first() else {
        return;
    };
    match read_picture_format(codec, sps) {
        Ok(format) => {
            config.profile = format.profile;
            config.level = format.level;
            config.width = format.width;
            config.height = format.height;
        }
        Err(e) => degraded(format!("unreadable SPS: {}", e)),
    }
}

fn open_audio(index: usize, params: &CodecParameters) -> AudioTrack {
    let aac = if params.extradata.is_empty() {
        None
    } else {
        match AACConfig::from_audio_specific_config(&params.extradata) {
            Ok(config) => Some(config),
            Err(e) => {
                degraded(format!("unreadable AudioSpecificConfig: {}", e));
                None
            }
        }
    };

    let config = match &aac {
        Some(config) => {
            let mut audio = audio_config_from(config);
            if params.channels > 0 {
                audio.channels = params.channels;
            }
            audio
        }
        None => {
            let mut audio = AudioConfig::new(AudioCodec::Aac);
            audio.profile = params.profile;
            audio.sample_rate = params.sample_rate;
            audio.channels = params.channels;
            audio.extra_data = params.extradata.clone();
            audio
        }
    };

    AudioTrack {
        index,
        time_base: params.time_base,
        aac,
        config,
    }
}

fn audio_config_from(config: &AACConfig) -> AudioConfig {
    let mut audio = AudioConfig::new(AudioCodec::Aac);
    audio.profile = config.object_type();
    audio.sample_rate = config.sample_rate().unwrap_or(0);
    audio.channels = config.channel_configuration;
    audio.extra_data = Bytes::copy_from_slice(&config.audio_specific_config());
    audio
}
