#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use esdemux::av::StreamType;
use esdemux::codec::aac::{prepend_adts_header, AACConfig};
use esdemux::format::ts::{TsWriter, STREAM_TYPE_AAC, STREAM_TYPE_H264};
use esdemux::{Demuxer, ErrorKind, Message, PumpedLoop};

/// 320x240, Baseline profile, level 3.0
pub const SPS: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
/// 640x480, Baseline profile, level 3.0
pub const SPS_640: [u8; 9] = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x05, 0x01, 0xEC, 0x80];
pub const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];
/// Declares a picture 2^32 - 1 macroblocks wide.
pub const OVERSIZED_SPS: [u8; 14] = [
    0x67, 0x42, 0xC0, 0x1E, 0xF8, 0x00, 0x00, 0x00, 0x07, 0xFF, 0xFF, 0xFF, 0xFF, 0x40,
];

/// Samples per AAC frame at 44.1 kHz, in 90 kHz ticks.
pub const AAC_FRAME_TICKS: u64 = 2089;

pub fn key_frame(sps: &[u8]) -> Vec<u8> {
    let mut au = vec![0, 0, 0, 1];
    au.extend_from_slice(sps);
    au.extend_from_slice(&[0, 0, 0, 1]);
    au.extend_from_slice(&PPS);
    au.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00]);
    au
}

pub fn delta_frame(fill: u8) -> Vec<u8> {
    vec![0, 0, 0, 1, 0x41, 0x9A, fill, fill]
}

pub fn adts_frame(config: &AACConfig, fill: u8) -> Vec<u8> {
    prepend_adts_header(config, &[fill; 24]).to_vec()
}

/// Audio-only TS: part 0 holds the tables and the first frame, every later
/// part exactly one more PES with one ADTS frame.
pub fn audio_parts(config: &AACConfig, frames: usize, fill_base: u8, pts_base: u64) -> Vec<Bytes> {
    let mut writer = TsWriter::new();
    let pid = writer.add_stream(STREAM_TYPE_AAC).expect("audio stream");
    writer.write_tables().expect("tables");

    let mut parts = Vec::with_capacity(frames);
    for i in 0..frames {
        let frame = adts_frame(config, fill_base.wrapping_add(i as u8));
        let pts = pts_base + i as u64 * AAC_FRAME_TICKS;
        writer.write_pes(pid, &frame, Some(pts), None, false).expect("pes");
        parts.push(writer.take());
    }
    parts
}

pub fn audio_stream(frames: usize) -> Bytes {
    concat(&audio_parts(&AACConfig::default(), frames, 0x10, 9000))
}

/// H.264 + AAC with a resolution change at the second key frame.
pub fn muxed_stream_with_resolution_change() -> Bytes {
    let mut writer = TsWriter::new();
    let video = writer.add_stream(STREAM_TYPE_H264).expect("video stream");
    let audio = writer.add_stream(STREAM_TYPE_AAC).expect("audio stream");
    writer.write_tables().expect("tables");

    let config = AACConfig::default();
    let gops: [&[u8]; 2] = [&SPS, &SPS_640];
    let mut pts = 9000u64;
    for (gop, sps) in gops.iter().enumerate() {
        writer
            .write_pes(video, &key_frame(sps), Some(pts), Some(pts - 3000), true)
            .expect("key frame");
        writer
            .write_pes(audio, &adts_frame(&config, gop as u8), Some(pts), None, false)
            .expect("audio");
        pts += 3000;
        writer
            .write_pes(video, &delta_frame(gop as u8), Some(pts), Some(pts - 3000), false)
            .expect("delta frame");
        pts += 3000;
    }
    writer.finish()
}

/// H.264 only, one key frame and one delta frame per entry of `gops`.
pub fn video_stream(gops: &[&[u8]]) -> Bytes {
    let mut writer = TsWriter::new();
    let video = writer.add_stream(STREAM_TYPE_H264).expect("video stream");
    writer.write_tables().expect("tables");

    let mut pts = 9000u64;
    for (gop, sps) in gops.iter().enumerate() {
        writer
            .write_pes(video, &key_frame(sps), Some(pts), Some(pts - 3000), true)
            .expect("key frame");
        pts += 3000;
        writer
            .write_pes(video, &delta_frame(gop as u8), Some(pts), Some(pts - 3000), false)
            .expect("delta frame");
        pts += 3000;
    }
    writer.finish()
}

pub fn concat(parts: &[Bytes]) -> Bytes {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    Bytes::from(out)
}

/// What a listener saw, flattened for comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Video { width: u32, height: u32, extra_data: Bytes },
    Audio { sample_rate: u32, channels: u8, extra_data: Bytes },
    Drm { scheme: String, init_data: Bytes },
    Initialized,
    Packet { stream: StreamType, pts: f64, dts: f64, key: bool, data: Bytes, encrypted: bool },
    EndOfStream,
    Error(ErrorKind),
    /// Pushed by a test to mark a point in the caller's timeline.
    Marker,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::EndOfStream | Event::Error(_))
    }
}

/// Records everything a demuxer delivers, in delivery order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, demuxer: &Demuxer) {
        let events = self.events.clone();
        demuxer.set_video_config_listener(move |c| {
            events.lock().push(Event::Video {
                width: c.width,
                height: c.height,
                extra_data: c.extra_data,
            })
        });
        let events = self.events.clone();
        demuxer.set_audio_config_listener(move |c| {
            events.lock().push(Event::Audio {
                sample_rate: c.sample_rate,
                channels: c.channels,
                extra_data: c.extra_data,
            })
        });
        let events = self.events.clone();
        demuxer.set_drm_init_data_listener(move |d| {
            events.lock().push(Event::Drm {
                scheme: d.protection_scheme,
                init_data: d.init_data,
            })
        });
    }

    /// The message listener to hand to `Demuxer::init`.
    pub fn on_message(&self) -> impl Fn(Message) + Send + Sync + 'static {
        let events = self.events.clone();
        move |message| {
            let event = match message {
                Message::Initialized => Event::Initialized,
                Message::Packet(p) => Event::Packet {
                    stream: p.stream_type,
                    pts: p.pts,
                    dts: p.dts,
                    key: p.is_key_frame,
                    encrypted: p.is_encrypted(),
                    data: p.data,
                },
                Message::EndOfStream => Event::EndOfStream,
                Message::Error(e) => Event::Error(e.kind()),
            };
            events.lock().push(event);
        }
    }

    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn packets(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Packet { .. }))
            .collect()
    }

    pub fn count_packets(&self) -> usize {
        self.packets().len()
    }

    pub fn finished(&self) -> bool {
        self.events.lock().iter().any(Event::is_terminal)
    }

    /// Pumps `pump` until a terminal message arrives.
    pub fn pump_to_end(&self, pump: &PumpedLoop) -> Vec<Event> {
        let recorder = self.clone();
        assert!(
            pump.run_until(move || recorder.finished(), Duration::from_secs(10)),
            "no terminal message; saw {:?}",
            self.events()
        );
        self.events()
    }
}

pub fn pts_of(event: &Event) -> f64 {
    match event {
        Event::Packet { pts, .. } => *pts,
        other => panic!("not a packet: {:?}", other),
    }
}

pub fn data_of(event: &Event) -> Bytes {
    match event {
        Event::Packet { data, .. } => data.clone(),
        other => panic!("not a packet: {:?}", other),
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
