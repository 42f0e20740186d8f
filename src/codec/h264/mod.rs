//! # H.264/AVC parameter sets
//!
//! SPS/PPS parsing and the two extradata forms a container may carry them in:
//! an Annex-B run or an `avcC` decoder configuration record.
//!
//! ## Example: reading dimensions from an SPS
//!
//! ```rust
//! use esdemux::codec::h264::H264Parser;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut parser = H264Parser::new();
//! let sps = parser.parse_sps(&[0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8])?;
//! assert_eq!((sps.width, sps.height), (320, 240));
//! # Ok(())
//! # }
//! ```

/// `avcC` record parsing and length-prefixed sample conversion
pub mod avcc;
/// SPS/PPS bitstream parsing
pub mod parser;
/// NAL unit and parameter set types
pub mod types;

#[cfg(test)]
mod parser_test;

#[doc(inline)]
pub use avcc::AvcDecoderConfig;
#[doc(inline)]
pub use parser::H264Parser;
#[doc(inline)]
pub use types::*;
