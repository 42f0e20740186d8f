use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use esdemux::codec::aac::{prepend_adts_header, AACConfig};
use esdemux::format::ts::{TsWriter, STREAM_TYPE_AAC, STREAM_TYPE_H264};
use esdemux::{Demuxer, DemuxerType, Message, MessageLoop};

const SPS: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

/// A few seconds of H.264 + AAC, for when no input file is given.
fn synthetic_stream() -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = TsWriter::new();
    let video = writer.add_stream(STREAM_TYPE_H264)?;
    let audio = writer.add_stream(STREAM_TYPE_AAC)?;
    writer.write_tables()?;

    let config = AACConfig::default();
    for frame in 0..90u64 {
        let pts = 9000 + frame * 3000;
        let mut au = Vec::new();
        if frame % 30 == 0 {
            for nal in [&SPS[..], &PPS[..]] {
                au.extend_from_slice(&[0, 0, 0, 1]);
                au.extend_from_slice(nal);
            }
            au.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00]);
        } else {
            au.extend_from_slice(&[0, 0, 0, 1, 0x41, 0x9A, frame as u8, 0x00]);
        }
        writer.write_pes(video, &au, Some(pts), Some(pts - 3000), frame % 30 == 0)?;

        if frame % 2 == 0 {
            let aac = prepend_adts_header(&config, &[frame as u8; 64]);
            writer.write_pes(audio, &aac, Some(pts), None, false)?;
        }
    }
    Ok(writer.finish().to_vec())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let input = match std::env::args().nth(1) {
        Some(path) => {
            println!("Reading {}", path);
            std::fs::read(path)?
        }
        None => {
            println!("No input given, demuxing a synthetic stream");
            synthetic_stream()?
        }
    };

    let demuxer = Demuxer::new(DemuxerType::Muxed, esdemux::config::current());
    demuxer.set_video_config_listener(|config| {
        println!(
            "video config: {:?} {}x{} profile={} level={}",
            config.codec, config.width, config.height, config.profile, config.level
        );
    });
    demuxer.set_audio_config_listener(|config| {
        println!(
            "audio config: {:?} {} Hz, {} channels",
            config.codec, config.sample_rate, config.channels
        );
    });
    demuxer.set_drm_init_data_listener(|drm| {
        println!("drm init data: {} ({} bytes)", drm.protection_scheme, drm.init_data.len());
    });

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let executor = Arc::new(MessageLoop::new("demux-demo-loop")?);
    demuxer.init(
        move |message| match message {
            Message::Initialized => println!("initialized"),
            Message::Packet(packet) => println!(
                "{} packet: pts={:.3}s dts={:.3}s key={} size={}",
                packet.stream_type,
                packet.pts,
                packet.dts,
                packet.is_key_frame,
                packet.data.len()
            ),
            Message::EndOfStream => {
                println!("end of stream");
                let _ = done_tx.try_send(());
            }
            Message::Error(e) => {
                eprintln!("demuxing failed: {}", e);
                let _ = done_tx.try_send(());
            }
        },
        executor,
    )?;

    // feed the input the way a segment downloader would
    for chunk in input.chunks(4096) {
        demuxer.parse(chunk)?;
    }
    demuxer.end_of_stream()?;

    if done_rx.recv_timeout(Duration::from_secs(10)).is_err() {
        eprintln!("timed out waiting for the demuxer");
    }
    println!("buffer stats: {:?}", demuxer.buffer_stats());
    demuxer.close()?;
    Ok(())
}
