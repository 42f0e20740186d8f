//! # H.265/HEVC parameter sets
//!
//! Reads profile, tier, level and picture size from an HEVC sequence
//! parameter set. VPS/PPS are carried through as opaque bytes.
//!
//! ```rust
//! use esdemux::codec::h265::H265Parser;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sps = [
//!     0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
//!     0x03, 0x00, 0x5D, 0xA0, 0x02, 0x80, 0x80, 0x2D, 0x14,
//! ];
//! let info = H265Parser::new().parse_sps(&sps)?;
//! assert_eq!((info.width, info.height), (1280, 720));
//! # Ok(())
//! # }
//! ```

/// SPS and profile_tier_level parsing
pub mod parser;
/// HEVC parameter set types
pub mod types;

pub use parser::H265Parser;
pub use types::*;
