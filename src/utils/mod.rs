//! Bit-level readers and writers used by the codec parsers, and the MPEG-2
//! CRC-32 that guards transport stream tables.
//!
//! ```rust
//! use esdemux::utils::{BitReader, BitWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b10, 2);
//! writer.write_golomb(4);
//! let bytes = writer.into_bytes();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_bits(2)?, 0b10);
//! assert_eq!(reader.read_golomb()?, 4);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::{BitReader, BitWriter};
pub use crc::Crc32Mpeg2;
