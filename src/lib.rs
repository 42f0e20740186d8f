#![doc(html_root_url = "https://docs.rs/esdemux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # esdemux - Elementary Stream Demuxing
//!
//! `esdemux` turns container byte streams arriving in arbitrary chunks into
//! elementary stream packets and codec configuration for a media player.
//! Parsing runs on a dedicated worker thread while the caller's thread stays
//! responsive; every result comes back through an execution context the
//! caller owns, in the order it was produced.
//!
//! ## Features
//!
//! - Incremental, pull-based container parsing with resumable reads
//! - MPEG-2 Transport Stream container with H.264, H.265 and AAC streams
//! - In-band parameter set tracking: a changed SPS/PPS or ADTS header is
//!   announced with a new config ahead of the packet carrying it
//! - Flush with generation tagging, so nothing produced from discarded
//!   input reaches a listener
//! - Delivery through a dedicated message loop, a caller-pumped queue or a
//!   tokio runtime
//! - DASH `<SegmentTemplate>` segment addressing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use esdemux::{Demuxer, DemuxerType, Message, PumpedLoop};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let demuxer = Demuxer::new(DemuxerType::Audio, esdemux::config::current());
//! demuxer.set_audio_config_listener(|config| {
//!     println!("{} Hz, {} channels", config.sample_rate, config.channels);
//! });
//!
//! let pump = Arc::new(PumpedLoop::new());
//! demuxer.init(
//!     |message| match message {
//!         Message::Packet(packet) => println!("{} bytes at {:.3}s", packet.data.len(), packet.pts),
//!         Message::Error(e) => eprintln!("demuxing failed: {}", e),
//!         _ => {}
//!     },
//!     pump.clone(),
//! )?;
//!
//! demuxer.parse(&std::fs::read("audio.ts")?)?;
//! demuxer.end_of_stream()?;
//! pump.run_until(|| false, Duration::from_secs(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `demuxer`: the pipeline façade, its worker thread and execution contexts
//! - `format`: the pull-based container interface and the TS container
//! - `codec`: H.264 and H.265 parameter sets, NAL framing and AAC/ADTS framing
//! - `av`: packets and codec configuration records handed to the caller
//! - `dash`: segment addressing for `<SegmentTemplate>` representations
//! - `config`: process-wide settings loaded from TOML and the environment
//! - `error`: the error type and its taxonomy
//! - `utils`: bitstream reading/writing and CRC calculations

/// Audio/Video base types
pub mod av;

/// Codec helpers for video and audio elementary streams
pub mod codec;

/// Configuration module
pub mod config;

/// DASH segment addressing
pub mod dash;

/// The asynchronous demuxing pipeline
pub mod demuxer;

/// Error types and utilities
pub mod error;

/// Container formats
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use av::{
    AudioConfig, DemuxerType, DrmInitData, ElementaryStreamPacket, StreamType, TimeTicks,
    VideoConfig,
};
pub use config::Config;
pub use demuxer::{Demuxer, DemuxerState, Executor, Message, MessageLoop, PumpedLoop, TokioContext};
pub use error::{DemuxError, ErrorKind, Result};
