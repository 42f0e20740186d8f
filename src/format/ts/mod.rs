//! # MPEG Transport Stream (TS)
//!
//! A pull-based TS container for the demuxing pipeline plus a small writer.
//!
//! - **Demuxing**: [`TsContainer`] finds the first program through PAT/PMT,
//!   reassembles PES packets and splits AAC PES into ADTS frames
//! - **Muxing**: [`TsWriter`] produces PAT/PMT and PES packets in memory
//!
//! ## Example Usage
//!
//! ```rust
//! use esdemux::format::ts::{TsWriter, STREAM_TYPE_AAC, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = TsWriter::new();
//! let pid = writer.add_stream(STREAM_TYPE_AAC)?;
//! writer.write_tables()?;
//! writer.write_pes(pid, &[0xFF, 0xF1, 0x50, 0x80, 0x01, 0x1F, 0xFC, 0x00], Some(0), None, false)?;
//!
//! let output = writer.finish();
//! assert_eq!(output.len() % TS_PACKET_SIZE, 0);
//! # Ok(())
//! # }
//! ```

/// Pull-based TS container
pub mod demuxer;

/// TS writer for fixtures and demos
pub mod muxer;

/// Low-level TS packet and PSI parsing
pub mod parser;

/// PES packet handling
pub mod pes;

/// Core TS types and constants
pub mod types;

pub use demuxer::TsContainer;
pub use muxer::TsWriter;
pub use pes::{PESHeader, PESPacket};
pub use types::{
    TSHeader, PID_PAT, PID_PMT, STREAM_TYPE_AAC, STREAM_TYPE_H264, STREAM_TYPE_H265,
    TS_PACKET_SIZE,
};
