use std::collections::{HashMap, VecDeque};

use bytes::{Buf, Bytes, BytesMut};

use super::parser::TSPacketParser;
use super::pes::PESHeader;
use super::types::*;
use crate::av::{AudioCodec, CodecType, VideoCodec};
use crate::codec::aac::{AACParser, SAMPLES_PER_FRAME};
use crate::codec::read_picture_format;
use crate::codec::nal::{contains_idr, ParameterSets};
use crate::config::Config;
use crate::error::{DemuxError, Result};
use crate::format::{
    ByteSource, CodecParameters, ContainerPacket, ContainerParser, Progress, ProtectionInfo,
    ReadOutcome, StreamEntry, StreamLayout, TimeBase,
};

/// MPEG Transport Stream container.
///
/// Pulls bytes from its source in chunks, reassembles 188-byte packets
/// across short reads and resynchronizes on sync loss. Supports a single
/// program with H.264, H.265 and AAC (ADTS) streams.
pub struct TsContainer {
    source: Option<Box<dyn ByteSource>>,
    parser: TSPacketParser,
    chunk_size: usize,
    resync_limit: usize,
    pending: BytesMut,
    end_of_input: bool,
    drained: bool,
    skipped: usize,
    pmt_pid: Option<u16>,
    pmt_seen: bool,
    streams: Vec<StreamState>,
    pids: HashMap<u16, usize>,
    queued: VecDeque<ContainerPacket>,
    layout: Option<StreamLayout>,
    consumed: usize,
}

struct StreamState {
    pid: u16,
    params: CodecParameters,
    has_params: bool,
    pes: Option<PesAssembler>,
    aac: AACParser,
}

/// Collects the TS payloads of one PES packet.
struct PesAssembler {
    expected: Option<usize>,
    random_access: bool,
    data: BytesMut,
}

impl PesAssembler {
    fn is_complete(&self) -> bool {
        self.expected.map_or(false, |size| self.data.len() >= size)
    }
}

impl TsContainer {
    /// Container using the process-wide config.
    pub fn new() -> Self {
        Self::with_config(&crate::config::current())
    }

    /// Container using `config`'s resync limit and read chunk size.
    pub fn with_config(config: &Config) -> Self {
        Self {
            source: None,
            parser: TSPacketParser::new(),
            chunk_size: config.read_chunk_size.max(1) * TS_PACKET_SIZE,
            resync_limit: config.resync_limit * TS_PACKET_SIZE,
            pending: BytesMut::new(),
            end_of_input: false,
            drained: false,
            skipped: 0,
            pmt_pid: None,
            pmt_seen: false,
            streams: Vec::new(),
            pids: HashMap::new(),
            queued: VecDeque::new(),
            layout: None,
            consumed: 0,
        }
    }

    /// Next aligned TS packet; `Ready(None)` once the input has ended.
    fn next_packet(&mut self) -> Result<Progress<Option<Bytes>>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == SYNC_BYTE) {
                if pos > 0 {
                    self.skip(pos)?;
                }
            } else if !self.pending.is_empty() {
                let len = self.pending.len();
                self.skip(len)?;
            }

            if self.pending.len() >= TS_PACKET_SIZE {
                // a lost sync byte inside the candidate is caught by the
                // next packet's check
                self.skipped = 0;
                self.consumed += TS_PACKET_SIZE;
                return Ok(Progress::Ready(Some(self.pending.split_to(TS_PACKET_SIZE).freeze())));
            }

            if self.end_of_input {
                if !self.pending.is_empty() {
                    log::warn!("discarding {} trailing bytes", self.pending.len());
                    self.pending.clear();
                }
                return Ok(Progress::Ready(None));
            }

            let source = self
                .source
                .as_mut()
                .ok_or_else(|| DemuxError::InvalidState("container is not open".into()))?;
            let start = self.pending.len();
            self.pending.resize(start + self.chunk_size, 0);
            let outcome = source.read(&mut self.pending[start..]);
            match outcome {
                ReadOutcome::Data(n) => self.pending.truncate(start + n),
                ReadOutcome::NeedMoreData => {
                    self.pending.truncate(start);
                    return Ok(Progress::NeedMoreData);
                }
                ReadOutcome::EndOfStream => {
                    self.pending.truncate(start);
                    self.end_of_input = true;
                }
            }
        }
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.skipped == 0 {
            log::warn!("lost TS sync, resynchronizing");
        }
        self.pending.advance(n);
        self.skipped += n;
        self.consumed += n;
        if self.skipped > self.resync_limit {
            return Err(DemuxError::ParseFailed(format!(
                "no TS sync byte within {} bytes",
                self.skipped
            )));
        }
        Ok(())
    }

    fn handle_packet(&mut self, data: &[u8]) -> Result<()> {
        let header = self.parser.parse_header(data)?;
        if header.transport_error || !header.contains_payload {
            return Ok(());
        }

        let adaptation = match self.parser.parse_adaptation_field(data) {
            Ok(field) => field,
            Err(e) => {
                log::warn!("dropping TS packet on PID 0x{:04x}: {}", header.pid, e);
                return Ok(());
            }
        };
        let offset = self.parser.payload_offset(&header, adaptation.as_ref());
        if offset >= data.len() {
            return Ok(());
        }
        let payload = &data[offset..];
        let random_access = adaptation.as_ref().map_or(false, |a| a.random_access);

        if header.pid == PID_PAT {
            if header.payload_unit_start {
                self.handle_pat(payload);
            }
        } else if Some(header.pid) == self.pmt_pid {
            if header.payload_unit_start && !self.pmt_seen {
                self.handle_pmt(payload);
            }
        } else if let Some(&index) = self.pids.get(&header.pid) {
            self.handle_pes_payload(index, payload, header.payload_unit_start, random_access)?;
        }

        Ok(())
    }

    fn handle_pat(&mut self, payload: &[u8]) {
        let section = match self.parser.parse_section(payload) {
            Ok(Some(section)) if section.table_id == TABLE_ID_PAT => section,
            Ok(_) => return,
            Err(e) => {
                log::warn!("ignoring PAT: {}", e);
                return;
            }
        };
        if let Ok(pat) = self.parser.parse_pat(section.body) {
            if let Some(pid) = pat.first_program_pid() {
                if self.pmt_pid != Some(pid) {
                    log::debug!("PAT: program map on PID 0x{:04x}", pid);
                    self.pmt_pid = Some(pid);
                }
            }
        }
    }

    fn handle_pmt(&mut self, payload: &[u8]) {
        let section = match self.parser.parse_section(payload) {
            Ok(Some(section)) if section.table_id == TABLE_ID_PMT => section,
            Ok(_) => return,
            Err(e) => {
                log::warn!("ignoring PMT: {}", e);
                return;
            }
        };
        let pmt = match self.parser.parse_pmt(section.body) {
            Ok(pmt) => pmt,
            Err(e) => {
                log::warn!("ignoring PMT: {}", e);
                return;
            }
        };

        let program_protection = protection_from(&pmt.program_descriptors);
        for info in &pmt.elementary_stream_infos {
            let codec = match info.stream_type {
                STREAM_TYPE_H264 => CodecType::Video(VideoCodec::H264),
                STREAM_TYPE_H265 => CodecType::Video(VideoCodec::H265),
                STREAM_TYPE_AAC => CodecType::Audio(AudioCodec::Aac),
                other => {
                    log::debug!(
                        "skipping unsupported stream type 0x{:02x} on PID 0x{:04x}",
                        other,
                        info.elementary_pid
                    );
                    continue;
                }
            };

            let mut params = CodecParameters::new(codec);
            params.time_base = TimeBase::MPEG;
            params.protection =
                protection_from(&info.descriptors).or_else(|| program_protection.clone());

            self.pids.insert(info.elementary_pid, self.streams.len());
            self.streams.push(StreamState {
                pid: info.elementary_pid,
                params,
                has_params: false,
                pes: None,
                aac: AACParser::new(),
            });
        }

        log::debug!("PMT: {} supported streams", self.streams.len());
        self.pmt_seen = true;
    }

    fn handle_pes_payload(
        &mut self,
        index: usize,
        payload: &[u8],
        unit_start: bool,
        random_access: bool,
    ) -> Result<()> {
        if unit_start {
            self.complete_pes(index)?;
            let expected = if payload.len() >= 6 {
                match u16::from_be_bytes([payload[4], payload[5]]) {
                    0 => None,
                    len => Some(6 + len as usize),
                }
            } else {
                None
            };
            self.streams[index].pes = Some(PesAssembler {
                expected,
                random_access,
                data: BytesMut::new(),
            });
        }

        let stream = &mut self.streams[index];
        let complete = match stream.pes.as_mut() {
            Some(pes) => {
                pes.data.extend_from_slice(payload);
                pes.is_complete()
            }
            // joined mid-packet, wait for the next unit start
            None => false,
        };
        if complete {
            self.complete_pes(index)?;
        }
        Ok(())
    }

    fn complete_pes(&mut self, index: usize) -> Result<()> {
        let Some(mut pes) = self.streams[index].pes.take() else {
            return Ok(());
        };
        if pes.data.is_empty() {
            return Ok(());
        }
        if let Some(expected) = pes.expected {
            pes.data.truncate(expected);
        }

        let (header, offset) = match PESHeader::parse(&pes.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("dropping PES on PID 0x{:04x}: {}", self.streams[index].pid, e);
                return Ok(());
            }
        };
        let payload = pes.data.freeze().slice(offset..);
        let pts = header.pts.map(|v| v as i64);
        let dts = header.dts.map(|v| v as i64);

        match self.streams[index].params.codec {
            CodecType::Video(codec) => {
                self.emit_video(index, codec, payload, pts, dts, pes.random_access)
            }
            CodecType::Audio(AudioCodec::Aac) => self.emit_audio(index, payload, pts),
        }
        Ok(())
    }

    fn emit_video(
        &mut self,
        index: usize,
        codec: VideoCodec,
        payload: Bytes,
        pts: Option<i64>,
        dts: Option<i64>,
        random_access: bool,
    ) {
        let stream = &mut self.streams[index];
        if !stream.has_params {
            let sets = ParameterSets::from_annex_b(codec, &payload);
            if sets.is_complete(codec) {
                stream.params.extradata = sets.to_annex_b();
                match read_picture_format(codec, &sets.sps[0]) {
                    Ok(format) => {
                        stream.params.width = format.width;
                        stream.params.height = format.height;
                        stream.params.profile = format.profile;
                        stream.params.level = format.level;
                    }
                    Err(e) => log::warn!("unreadable SPS on PID 0x{:04x}: {}", stream.pid, e),
                }
                stream.has_params = true;
            }
        }

        let is_key = random_access || contains_idr(codec, &payload);
        self.queued.push_back(ContainerPacket {
            stream_index: index,
            data: payload,
            pts,
            dts,
            duration: 0,
            is_key,
            encryption: None,
        });
    }

    fn emit_audio(&mut self, index: usize, payload: Bytes, pts: Option<i64>) {
        let stream = &mut self.streams[index];
        let split = stream.aac.split_frames(&payload);
        if let Some((tail, e)) = &split.rejected_tail {
            log::warn!(
                "dropping {} trailing AAC bytes on PID 0x{:04x}: {}",
                tail.len(),
                stream.pid,
                e
            );
        }
        let frames = split.frames;

        let mut offset = 0usize;
        let mut packets = Vec::with_capacity(frames.len());
        for (i, (header, frame)) in frames.iter().enumerate() {
            let sample_rate = header.sample_rate().unwrap_or(0);
            let duration = if sample_rate > 0 {
                (SAMPLES_PER_FRAME as u64 * PTS_HZ / sample_rate as u64) as i64
            } else {
                0
            };
            if !stream.has_params {
                let config = header.config();
                stream.params.sample_rate = sample_rate;
                stream.params.channels = config.channel_configuration;
                stream.params.profile = config.object_type();
                stream.params.extradata =
                    Bytes::copy_from_slice(&config.audio_specific_config());
                stream.has_params = true;
            }
            packets.push(ContainerPacket {
                stream_index: index,
                data: payload.slice(offset..offset + frame.len()),
                pts: pts.map(|p| p + duration * i as i64),
                dts: None,
                duration,
                is_key: true,
                encryption: None,
            });
            offset += frame.len();
        }
        self.queued.extend(packets);
    }

    /// Completes every open PES once the input has ended.
    fn drain(&mut self) -> Result<()> {
        if self.drained {
            return Ok(());
        }
        self.drained = true;
        for index in 0..self.streams.len() {
            self.complete_pes(index)?;
        }
        Ok(())
    }

    fn probe_complete(&self) -> bool {
        self.pmt_seen && self.streams.iter().all(|s| s.has_params)
    }

    fn build_layout(&self) -> StreamLayout {
        StreamLayout {
            streams: self
                .streams
                .iter()
                .enumerate()
                .filter(|(_, s)| s.has_params)
                .map(|(index, s)| StreamEntry {
                    index,
                    codec: s.params.codec,
                })
                .collect(),
        }
    }
}

impl Default for TsContainer {
    fn default() -> Self {
        Self::new()
    }
}

fn protection_from(descriptors: &[Descriptor]) -> Option<ProtectionInfo> {
    descriptors.iter().find_map(|d| {
        d.ca_system_id().map(|id| ProtectionInfo {
            scheme: format!("urn:dvb:casystemid:{}", id),
            init_data: Bytes::copy_from_slice(&d.data),
        })
    })
}

impl ContainerParser for TsContainer {
    fn open(&mut self, source: Box<dyn ByteSource>) -> Result<()> {
        if self.source.is_some() {
            return Err(DemuxError::OpenFailed("container already open".into()));
        }
        self.source = Some(source);
        Ok(())
    }

    fn find_stream_info(&mut self, probe_size: usize) -> Result<Progress<StreamLayout>> {
        if let Some(layout) = &self.layout {
            return Ok(Progress::Ready(layout.clone()));
        }

        loop {
            if self.probe_complete() {
                break;
            }
            if self.consumed > probe_size {
                return Err(DemuxError::ProbeIncomplete(format!(
                    "stream layout unknown after {} bytes",
                    self.consumed
                )));
            }
            match self.next_packet()? {
                Progress::NeedMoreData => return Ok(Progress::NeedMoreData),
                Progress::Ready(Some(packet)) => self.handle_packet(&packet)?,
                Progress::Ready(None) => {
                    self.drain()?;
                    if self.probe_complete() {
                        break;
                    }
                    // partial layouts are still usable when the PMT was seen
                    if self.pmt_seen && self.streams.iter().any(|s| s.has_params) {
                        break;
                    }
                    return Err(DemuxError::ProbeIncomplete(
                        "end of stream before the stream layout was known".into(),
                    ));
                }
            }
        }

        let layout = self.build_layout();
        log::debug!("TS probe: {} streams in {} bytes", layout.streams.len(), self.consumed);
        self.layout = Some(layout.clone());
        Ok(Progress::Ready(layout))
    }

    fn read_packet(&mut self) -> Result<Progress<Option<ContainerPacket>>> {
        loop {
            if let Some(packet) = self.queued.pop_front() {
                return Ok(Progress::Ready(Some(packet)));
            }
            if self.drained {
                return Ok(Progress::Ready(None));
            }
            match self.next_packet()? {
                Progress::NeedMoreData => return Ok(Progress::NeedMoreData),
                Progress::Ready(Some(packet)) => self.handle_packet(&packet)?,
                Progress::Ready(None) => self.drain()?,
            }
        }
    }

    fn stream_parameters(&self, index: usize) -> Option<&CodecParameters> {
        self.streams.get(index).map(|s| &s.params)
    }

    fn layout(&self) -> Option<&StreamLayout> {
        self.layout.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::TsWriter;
    use pretty_assertions::assert_eq;

    /// Source over a fixed buffer that hands out at most `step` bytes per read.
    struct SliceSource {
        data: Bytes,
        step: usize,
        eos: bool,
    }

    impl ByteSource for SliceSource {
        fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
            if self.data.is_empty() {
                return if self.eos {
                    ReadOutcome::EndOfStream
                } else {
                    ReadOutcome::NeedMoreData
                };
            }
            let n = buf.len().min(self.step).min(self.data.len());
            buf[..n].copy_from_slice(&self.data.split_to(n));
            ReadOutcome::Data(n)
        }
    }

    fn container_over(data: Bytes, step: usize, eos: bool) -> TsContainer {
        let mut container = TsContainer::with_config(&Config::default());
        container
            .open(Box::new(SliceSource { data, step, eos }))
            .unwrap();
        container
    }

    const SPS: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
    const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

    fn key_frame() -> Vec<u8> {
        let mut au = vec![0, 0, 0, 1];
        au.extend_from_slice(&SPS);
        au.extend_from_slice(&[0, 0, 0, 1]);
        au.extend_from_slice(&PPS);
        au.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00]);
        au
    }

    fn adts_frame(fill: u8) -> Vec<u8> {
        crate::codec::aac::prepend_adts_header(&Default::default(), &[fill; 20]).to_vec()
    }

    fn muxed_stream() -> Bytes {
        let mut writer = TsWriter::new();
        let video = writer.add_stream(STREAM_TYPE_H264).unwrap();
        let audio = writer.add_stream(STREAM_TYPE_AAC).unwrap();
        writer.write_tables().unwrap();
        writer.write_pes(video, &key_frame(), Some(9000), Some(6000), true).unwrap();
        let mut two = adts_frame(1);
        two.extend_from_slice(&adts_frame(2));
        writer.write_pes(audio, &two, Some(9000), None, false).unwrap();
        writer
            .write_pes(video, &[0, 0, 0, 1, 0x41, 0x9A], Some(12000), Some(9000), false)
            .unwrap();
        writer.finish()
    }

    #[test]
    fn test_probe_and_read() {
        let mut container = container_over(muxed_stream(), 100, true);

        let layout = match container.find_stream_info(1 << 20).unwrap() {
            Progress::Ready(layout) => layout,
            Progress::NeedMoreData => panic!("probe should complete"),
        };
        assert_eq!(layout.video(), Some(0));
        assert_eq!(layout.audio(), Some(1));

        let video = container.stream_parameters(0).unwrap();
        assert_eq!((video.width, video.height), (320, 240));
        assert_eq!(video.profile, 66);
        let audio = container.stream_parameters(1).unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.extradata.as_ref(), &[0x12, 0x10]);

        let mut packets = Vec::new();
        while let Progress::Ready(Some(packet)) = container.read_packet().unwrap() {
            packets.push(packet);
        }
        // bounded audio PES complete first; unbounded video PES wait for the
        // next unit start or end of input
        assert_eq!(packets.len(), 4);
        assert_eq!(packets[0].stream_index, 1);
        assert_eq!(packets[0].pts, Some(9000));
        assert_eq!(packets[0].data[7], 1);
        assert_eq!(packets[1].pts, Some(9000 + 2089));
        assert_eq!(packets[1].data[7], 2);
        assert_eq!(packets[2].stream_index, 0);
        assert!(packets[2].is_key);
        assert_eq!(packets[2].pts, Some(9000));
        assert_eq!(packets[2].dts, Some(6000));
        assert_eq!(packets[3].stream_index, 0);
        assert_eq!(packets[3].pts, Some(12000));
        assert!(!packets[3].is_key);
    }

    #[test]
    fn test_need_more_data_is_resumable() {
        let data = muxed_stream();
        let mut container = container_over(data.slice(..TS_PACKET_SIZE + 50), 1000, false);
        assert_eq!(container.find_stream_info(1 << 20).unwrap(), Progress::NeedMoreData);
        assert_eq!(container.find_stream_info(1 << 20).unwrap(), Progress::NeedMoreData);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut data = vec![0x00, 0x12, 0x34];
        data.extend_from_slice(&muxed_stream());
        let mut container = container_over(Bytes::from(data), 188, true);
        assert!(container.find_stream_info(1 << 20).unwrap().is_ready());
    }

    #[test]
    fn test_truncated_adts_tail_keeps_complete_frames() {
        let mut writer = TsWriter::new();
        let audio = writer.add_stream(STREAM_TYPE_AAC).unwrap();
        writer.write_tables().unwrap();
        let mut run = adts_frame(1);
        run.extend_from_slice(&adts_frame(2));
        let third = adts_frame(3);
        run.extend_from_slice(&third[..third.len() - 5]);
        writer.write_pes(audio, &run, Some(9000), None, false).unwrap();

        let mut container = container_over(writer.finish(), 188, true);
        assert!(container.find_stream_info(1 << 20).unwrap().is_ready());
        let mut packets = Vec::new();
        while let Progress::Ready(Some(packet)) = container.read_packet().unwrap() {
            packets.push(packet);
        }
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].data.as_ref(), adts_frame(1).as_slice());
        assert_eq!(packets[1].data.as_ref(), adts_frame(2).as_slice());
        assert_eq!(packets[1].pts, Some(9000 + 2089));
    }

    #[test]
    fn test_no_sync_is_fatal() {
        let mut config = Config::default();
        config.resync_limit = 2;
        let mut container = TsContainer::with_config(&config);
        container
            .open(Box::new(SliceSource {
                data: Bytes::from(vec![0u8; 4096]),
                step: 4096,
                eos: false,
            }))
            .unwrap();
        let err = container.find_stream_info(1 << 20).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ParseFailed);
    }

    #[test]
    fn test_probe_budget() {
        let mut writer = TsWriter::new();
        for _ in 0..20 {
            writer.write_null_packet();
        }
        let mut container = container_over(writer.finish(), 188, false);
        let err = container.find_stream_info(188 * 4).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ProbeIncomplete);
    }

    #[test]
    fn test_hevc_stream_info_reads_sps() {
        use crate::codec::h265::parser::tests::SPS_1280X720;
        let mut au = Vec::new();
        for unit in [&[0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF][..], &SPS_1280X720[..], &[0x44, 0x01, 0xC1, 0x72][..]] {
            au.extend_from_slice(&[0, 0, 0, 1]);
            au.extend_from_slice(unit);
        }
        au.extend_from_slice(&[0, 0, 0, 1, 0x26, 0x01, 0xAF, 0x08]);

        let mut writer = TsWriter::new();
        let video = writer.add_stream(STREAM_TYPE_H265).unwrap();
        writer.write_tables().unwrap();
        writer.write_pes(video, &au, Some(9000), None, true).unwrap();

        let mut container = container_over(writer.finish(), 188, true);
        assert!(container.find_stream_info(1 << 20).unwrap().is_ready());
        let params = container.stream_parameters(0).unwrap();
        assert_eq!(params.codec, CodecType::Video(VideoCodec::H265));
        assert_eq!((params.width, params.height), (1280, 720));
        assert_eq!((params.profile, params.level), (1, 93));
    }

    #[test]
    fn test_ca_descriptor_protection() {
        let mut writer = TsWriter::new();
        let audio = writer.add_stream(STREAM_TYPE_AAC).unwrap();
        writer.add_ca_descriptor(0x4AD4, &[0xDE, 0xAD]);
        writer.write_tables().unwrap();
        writer.write_pes(audio, &adts_frame(0), Some(0), None, false).unwrap();

        let mut container = container_over(writer.finish(), 188, true);
        assert!(container.find_stream_info(1 << 20).unwrap().is_ready());
        let protection = container.stream_parameters(0).unwrap().protection.clone().unwrap();
        assert_eq!(protection.scheme, "urn:dvb:casystemid:19156");
        assert_eq!(&protection.init_data[4..], &[0xDE, 0xAD]);
    }
}
