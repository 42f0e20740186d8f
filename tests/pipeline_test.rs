mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pretty_assertions::assert_eq;
use quickcheck::QuickCheck;

use common::*;
use esdemux::av::{CodecType, EncryptionInfo, StreamType, Subsample, VideoCodec};
use esdemux::codec::aac::AACConfig;
use esdemux::format::ts::TsWriter;
use esdemux::format::{
    ByteSource, CodecParameters, ContainerFactory, ContainerPacket, ContainerParser, Progress,
    ProtectionInfo, ReadOutcome, StreamEntry, StreamLayout,
};
use esdemux::{
    Config, Demuxer, DemuxerState, DemuxerType, ErrorKind, Message, MessageLoop, PumpedLoop,
    Result, TokioContext,
};

fn config() -> Config {
    Config {
        probe_size: 1 << 20,
        worker_thread_name: "esdemux-test".into(),
        ..Config::default()
    }
}

fn start(kind: DemuxerType, config: Config) -> (Demuxer, Arc<PumpedLoop>, Recorder) {
    init_logging();
    let demuxer = Demuxer::new(kind, config);
    let recorder = Recorder::new();
    recorder.attach(&demuxer);
    let pump = Arc::new(PumpedLoop::new());
    demuxer.init(recorder.on_message(), pump.clone()).unwrap();
    (demuxer, pump, recorder)
}

fn run_chunked(data: &Bytes, cuts: &[usize]) -> Vec<Event> {
    let (demuxer, pump, recorder) = start(DemuxerType::Muxed, config());
    let mut start = 0;
    for &cut in cuts {
        demuxer.parse(&data[start..cut]).unwrap();
        start = cut;
    }
    demuxer.parse(&data[start..]).unwrap();
    demuxer.end_of_stream().unwrap();
    let events = recorder.pump_to_end(&pump);
    demuxer.close().unwrap();
    events
}

fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_audio_stream_in_three_uneven_chunks() {
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, config());
    let data = audio_stream(8);
    let first = data.len() / 5;
    let second = data.len() * 3 / 4 + 7;
    demuxer.parse(&data[..first]).unwrap();
    demuxer.parse(&data[first..second]).unwrap();
    demuxer.parse(&data[second..]).unwrap();
    demuxer.parse(&[]).unwrap();

    let events = recorder.pump_to_end(&pump);
    assert_eq!(events.len(), 11, "{:?}", events);
    assert_eq!(
        events[0],
        Event::Audio {
            sample_rate: 44_100,
            channels: 2,
            extra_data: Bytes::from_static(&[0x12, 0x10]),
        }
    );
    assert_eq!(events[1], Event::Initialized);
    for (i, event) in events[2..10].iter().enumerate() {
        let expected_pts = (9000 + i as u64 * AAC_FRAME_TICKS) as f64 / 90_000.0;
        assert!((pts_of(event) - expected_pts).abs() < 1e-9);
        assert_eq!(data_of(event), adts_frame(&AACConfig::default(), 0x10 + i as u8));
    }
    assert_eq!(events[10], Event::EndOfStream);
    assert_eq!(demuxer.state(), DemuxerState::Ready);
}

fn prop_chunking_invariant(cuts: Vec<u16>) -> bool {
    let data = muxed_stream_with_resolution_change();
    let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c as usize % data.len()).collect();
    cuts.sort_unstable();
    cuts.dedup();
    run_chunked(&data, &cuts) == run_chunked(&data, &[])
}

#[test]
fn test_chunking_invariance() {
    let data = muxed_stream_with_resolution_change();
    let whole = run_chunked(&data, &[]);
    assert!(matches!(whole.last(), Some(Event::EndOfStream)));
    assert_eq!(whole, run_chunked(&data, &[1, 188, 189, data.len() - 1]));

    QuickCheck::new()
        .tests(20)
        .quickcheck(prop_chunking_invariant as fn(Vec<u16>) -> bool);
}

#[test]
fn test_config_change_precedes_its_packet() {
    let (demuxer, pump, recorder) = start(DemuxerType::Video, config());
    demuxer.parse(&muxed_stream_with_resolution_change()).unwrap();
    demuxer.end_of_stream().unwrap();
    let events = recorder.pump_to_end(&pump);

    let configs: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Video { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(configs.len(), 2, "{:?}", events);
    assert!(matches!(events[configs[0]], Event::Video { width: 320, height: 240, .. }));
    assert!(matches!(events[configs[1]], Event::Video { width: 640, height: 480, .. }));

    // the new config sits right before the key frame carrying it
    match &events[configs[1] + 1] {
        Event::Packet { key, data, stream, .. } => {
            assert!(*key);
            assert_eq!(*stream, StreamType::Video);
            assert_eq!(data.as_ref(), key_frame(&SPS_640).as_slice());
        }
        other => panic!("expected key frame, got {:?}", other),
    }
    assert_eq!(recorder.count_packets(), 4);
    assert!(recorder
        .packets()
        .iter()
        .all(|p| matches!(p, Event::Packet { stream: StreamType::Video, .. })));
}

#[test]
fn test_oversized_sps_does_not_stop_delivery() {
    let (demuxer, pump, recorder) = start(DemuxerType::Video, config());
    demuxer
        .parse(&video_stream(&[&SPS, &OVERSIZED_SPS, &SPS]))
        .unwrap();
    demuxer.end_of_stream().unwrap();
    let events = recorder.pump_to_end(&pump);

    assert!(!events.iter().any(|e| matches!(e, Event::Error(_))), "{:?}", events);
    assert_eq!(events.last(), Some(&Event::EndOfStream));
    assert_eq!(recorder.count_packets(), 6);
    // the unreadable SPS keeps the last known size
    assert!(events
        .iter()
        .filter(|e| matches!(e, Event::Video { .. }))
        .all(|e| matches!(e, Event::Video { width: 320, height: 240, .. })));

    let packets = recorder.packets();
    assert_eq!(data_of(&packets[2]).as_ref(), key_frame(&OVERSIZED_SPS).as_slice());
    assert_eq!(demuxer.state(), DemuxerState::Ready);
    demuxer.close().unwrap();
}

#[test]
fn test_set_timestamp_applies_to_later_packets() {
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, config());
    let parts = audio_parts(&AACConfig::default(), 8, 0x20, 9000);

    demuxer.parse(&concat(&parts[..3])).unwrap();
    let counter = recorder.clone();
    assert!(pump.run_until(move || counter.count_packets() == 3, Duration::from_secs(10)));

    demuxer.set_timestamp(10.0).unwrap();
    demuxer.parse(&concat(&parts[3..])).unwrap();
    demuxer.end_of_stream().unwrap();
    recorder.pump_to_end(&pump);

    let packets = recorder.packets();
    assert_eq!(packets.len(), 8);
    for (i, packet) in packets.iter().enumerate() {
        let base = (9000 + i as u64 * AAC_FRAME_TICKS) as f64 / 90_000.0;
        let expected = if i < 3 { base } else { base + 10.0 };
        assert!(
            (pts_of(packet) - expected).abs() < 1e-9,
            "packet {} at {}",
            i,
            pts_of(packet)
        );
    }
}

#[test]
fn test_flush_drops_stale_results() {
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, config());
    let stale = audio_parts(&AACConfig::default(), 8, 0xA0, 9000);
    demuxer.parse(&concat(&stale[..5])).unwrap();
    let counter = recorder.clone();
    assert!(pump.run_until(move || counter.count_packets() >= 2, Duration::from_secs(10)));

    demuxer.flush().unwrap();
    recorder.push(Event::Marker);
    assert_eq!(demuxer.buffered_bytes(), 0);

    let mono_48k = AACConfig {
        sample_rate_index: 3,
        channel_configuration: 1,
        ..AACConfig::default()
    };
    let fresh = audio_parts(&mono_48k, 3, 0xB0, 900_000);
    demuxer.parse(&concat(&fresh)).unwrap();
    demuxer.end_of_stream().unwrap();
    let events = recorder.pump_to_end(&pump);

    let marker = events.iter().position(|e| *e == Event::Marker).unwrap();
    let after = &events[marker + 1..];
    assert_eq!(after.len(), 6, "{:?}", after);
    assert_eq!(
        after[0],
        Event::Audio {
            sample_rate: 48_000,
            channels: 1,
            extra_data: Bytes::from_static(&[0x11, 0x88]),
        }
    );
    assert_eq!(after[1], Event::Initialized);
    for (i, event) in after[2..5].iter().enumerate() {
        assert_eq!(data_of(event)[7], 0xB0 + i as u8);
        let expected = (900_000 + i as u64 * AAC_FRAME_TICKS) as f64 / 90_000.0;
        assert!((pts_of(event) - expected).abs() < 1e-9);
    }
    assert_eq!(after[5], Event::EndOfStream);
}

#[test]
fn test_no_delivery_after_close() {
    init_logging();
    let demuxer = Demuxer::new(DemuxerType::Audio, config());
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let dispatcher = Arc::new(MessageLoop::new("esdemux-test-dispatch").unwrap());
    demuxer
        .init(
            move |message| {
                if let Message::Packet(_) = message {
                    thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            dispatcher,
        )
        .unwrap();

    demuxer.parse(&audio_stream(64)).unwrap();
    demuxer.end_of_stream().unwrap();
    wait_for(|| delivered.load(Ordering::SeqCst) >= 1);

    demuxer.close().unwrap();
    let at_close = delivered.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(delivered.load(Ordering::SeqCst), at_close);
    assert_eq!(demuxer.state(), DemuxerState::Closed);
    assert!(demuxer.parse(&[0x47]).is_err());
}

#[test]
fn test_close_discards_queued_deliveries() {
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, config());
    demuxer.parse(&audio_stream(4)).unwrap();
    demuxer.end_of_stream().unwrap();
    wait_for(|| pump.pending() >= 7);

    demuxer.close().unwrap();
    pump.run_pending();
    assert!(recorder.events().is_empty());
}

#[test]
fn test_probe_budget_exhausted() {
    let budget = Config {
        probe_size: 188 * 4,
        ..config()
    };
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, budget);

    let mut writer = TsWriter::new();
    for _ in 0..20 {
        writer.write_null_packet();
    }
    demuxer.parse(&writer.finish()).unwrap();
    demuxer.parse(&audio_stream(2)).unwrap();

    let events = recorder.pump_to_end(&pump);
    assert_eq!(events, vec![Event::Error(ErrorKind::ProbeIncomplete)]);
    assert_eq!(demuxer.state(), DemuxerState::Errored);

    // nothing follows the terminal error
    demuxer.end_of_stream().unwrap();
    pump.run_until(|| false, Duration::from_millis(50));
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_error_is_final() {
    let budget = Config {
        probe_size: 188 * 4,
        ..config()
    };
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, budget);
    let mut writer = TsWriter::new();
    for _ in 0..8 {
        writer.write_null_packet();
    }
    demuxer.parse(&writer.finish()).unwrap();
    recorder.pump_to_end(&pump);

    // a flush does not revive a failed instance
    demuxer.flush().unwrap();
    assert_eq!(demuxer.state(), DemuxerState::Errored);
    demuxer.parse(&audio_stream(2)).unwrap();
    demuxer.end_of_stream().unwrap();
    pump.run_until(|| false, Duration::from_millis(50));
    assert_eq!(recorder.events(), vec![Event::Error(ErrorKind::ProbeIncomplete)]);
}

#[test]
fn test_flush_after_end_of_stream_starts_over() {
    let (demuxer, pump, recorder) = start(DemuxerType::Audio, config());
    demuxer.parse(&audio_stream(2)).unwrap();
    demuxer.end_of_stream().unwrap();
    recorder.pump_to_end(&pump);
    assert_eq!(demuxer.state(), DemuxerState::Ready);

    demuxer.flush().unwrap();
    assert_eq!(demuxer.state(), DemuxerState::Flushing);
    recorder.push(Event::Marker);
    demuxer.parse(&audio_stream(3)).unwrap();
    demuxer.end_of_stream().unwrap();

    let counter = recorder.clone();
    assert!(pump.run_until(
        move || matches!(counter.events().last(), Some(Event::EndOfStream)),
        Duration::from_secs(10)
    ));
    let events = recorder.events();
    let marker = events.iter().position(|e| *e == Event::Marker).unwrap();
    let after = &events[marker + 1..];
    assert!(matches!(after[0], Event::Audio { sample_rate: 44_100, channels: 2, .. }));
    assert_eq!(after[1], Event::Initialized);
    assert_eq!(after.len(), 6, "{:?}", after);
    assert_eq!(demuxer.state(), DemuxerState::Ready);
}

#[tokio::test]
async fn test_tokio_context_delivery() {
    init_logging();
    let demuxer = Demuxer::new(DemuxerType::Audio, config());
    let context = Arc::new(TokioContext::current().unwrap());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    demuxer
        .init(
            move |message| {
                let _ = tx.send(message);
            },
            context,
        )
        .unwrap();
    demuxer.parse(&audio_stream(3)).unwrap();
    demuxer.end_of_stream().unwrap();

    let mut packets = 0;
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
        match message {
            Message::Packet(_) => packets += 1,
            Message::EndOfStream => break,
            Message::Initialized => {}
            Message::Error(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(packets, 3);
}

/// Container that swallows the whole input, then reports one encrypted
/// H.264 stream with avcC extradata.
struct ScriptedContainer {
    source: Option<Box<dyn ByteSource>>,
    fail_open: bool,
    seen_end: bool,
    params: CodecParameters,
    layout: StreamLayout,
    packets: Vec<ContainerPacket>,
}

const KEY_ID: [u8; 16] = [0x5A; 16];

impl ScriptedContainer {
    fn new(fail_open: bool) -> Self {
        let mut record = vec![0x01, 0x42, 0xC0, 0x1E, 0xFF, 0xE1, 0x00, SPS.len() as u8];
        record.extend_from_slice(&SPS);
        record.extend_from_slice(&[0x01, 0x00, PPS.len() as u8]);
        record.extend_from_slice(&PPS);

        let mut params = CodecParameters::new(CodecType::Video(VideoCodec::H264));
        params.extradata = Bytes::from(record);
        params.protection = Some(ProtectionInfo {
            scheme: "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed".into(),
            init_data: Bytes::from_static(b"pssh"),
        });

        let mut packet = ContainerPacket::new(0, vec![0, 0, 0, 4, 0x65, 0x88, 0x84, 0x00]);
        packet.pts = Some(90_000);
        packet.is_key = true;
        packet.encryption = Some(EncryptionInfo {
            key_id: KEY_ID.to_vec(),
            iv: vec![0; 8],
            subsamples: vec![Subsample { clear_bytes: 5, cipher_bytes: 3 }],
        });

        Self {
            source: None,
            fail_open,
            seen_end: false,
            params,
            layout: StreamLayout {
                streams: vec![StreamEntry { index: 0, codec: CodecType::Video(VideoCodec::H264) }],
            },
            packets: vec![packet],
        }
    }
}

impl ContainerParser for ScriptedContainer {
    fn open(&mut self, source: Box<dyn ByteSource>) -> Result<()> {
        if self.fail_open {
            return Err(esdemux::DemuxError::OpenFailed("no known container signature".into()));
        }
        self.source = Some(source);
        Ok(())
    }

    fn find_stream_info(&mut self, _probe_size: usize) -> Result<Progress<StreamLayout>> {
        let source = self.source.as_mut().expect("opened");
        let mut buf = [0u8; 64];
        while !self.seen_end {
            match source.read(&mut buf) {
                ReadOutcome::Data(_) => {}
                ReadOutcome::NeedMoreData => return Ok(Progress::NeedMoreData),
                ReadOutcome::EndOfStream => self.seen_end = true,
            }
        }
        Ok(Progress::Ready(self.layout.clone()))
    }

    fn read_packet(&mut self) -> Result<Progress<Option<ContainerPacket>>> {
        Ok(Progress::Ready(self.packets.pop()))
    }

    fn stream_parameters(&self, index: usize) -> Option<&CodecParameters> {
        (index == 0).then_some(&self.params)
    }

    fn layout(&self) -> Option<&StreamLayout> {
        Some(&self.layout)
    }
}

fn scripted(fail_open: bool) -> (Demuxer, Arc<PumpedLoop>, Recorder) {
    init_logging();
    let factory: ContainerFactory =
        Arc::new(move || Box::new(ScriptedContainer::new(fail_open)) as Box<dyn ContainerParser>);
    let demuxer = Demuxer::with_container(DemuxerType::Video, config(), factory);
    let recorder = Recorder::new();
    recorder.attach(&demuxer);
    let pump = Arc::new(PumpedLoop::new());
    demuxer.init(recorder.on_message(), pump.clone()).unwrap();
    (demuxer, pump, recorder)
}

#[test]
fn test_open_failure_is_terminal() {
    let (demuxer, pump, recorder) = scripted(true);
    demuxer.parse(&[1, 2, 3]).unwrap();
    let events = recorder.pump_to_end(&pump);
    assert_eq!(events, vec![Event::Error(ErrorKind::OpenFailed)]);
    assert_eq!(demuxer.state(), DemuxerState::Errored);
}

#[test]
fn test_encrypted_packets_pass_through() {
    let (demuxer, pump, recorder) = scripted(false);
    demuxer.parse(&[0u8; 100]).unwrap();
    demuxer.end_of_stream().unwrap();
    let events = recorder.pump_to_end(&pump);

    assert_eq!(events.len(), 5, "{:?}", events);
    assert!(matches!(events[0], Event::Video { width: 320, height: 240, .. }));
    assert_eq!(
        events[1],
        Event::Drm {
            scheme: "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed".into(),
            init_data: Bytes::from_static(b"pssh"),
        }
    );
    assert_eq!(events[2], Event::Initialized);
    match &events[3] {
        Event::Packet { encrypted, data, pts, key, .. } => {
            assert!(*encrypted);
            assert!(*key);
            assert_eq!(*pts, 1.0);
            assert_eq!(data.as_ref(), &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(events[4], Event::EndOfStream);
}
