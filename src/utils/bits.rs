use crate::error::{DemuxError, Result};

/// A bit-level reader for parsing binary data streams.
///
/// Implements H.264/H.265 style bit reading operations including:
/// - Reading individual bits
/// - Reading multiple bits as numbers
/// - Reading exponential Golomb codes (ue(v))
/// - Reading signed exponential Golomb codes (se(v))
///
/// Example:
/// ```
/// use esdemux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    /// Returns true for 1, false for 0.
    ///
    /// Returns error if end of data is reached.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(DemuxError::Codec("Reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits and returns them as a number.
    /// The bits are interpreted as big-endian.
    ///
    /// Returns error if n > 32 or end of data is reached.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(DemuxError::Codec("Too many bits requested".into()));
        }
        if n as usize > self.available_bits() {
            return Err(DemuxError::Codec("Reached end of data".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }

        Ok(value as u32)
    }

    /// Reads an unsigned exponential Golomb code (ue(v)) as specified in H.264/H.265.
    ///
    /// Format:
    /// 1. M leading zeros followed by a 1
    /// 2. M more INFO bits
    /// 3. Value = 2^M + INFO - 1
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(DemuxError::Codec("Invalid Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok((1u32 << leading_zeros) - 1 + info)
    }

    /// Reads a signed exponential Golomb code (se(v)) as specified in H.264/H.265.
    ///
    /// Odd codes map to positive values, even codes to negative ones:
    /// 0, 1, -1, 2, -2, ...
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        if k == 0 {
            return Ok(0);
        }

        let magnitude = ((k as u64 + 1) >> 1) as i32;
        let sign = if k & 1 == 1 { 1 } else { -1 };
        Ok(sign * magnitude)
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if n as usize > self.available_bits() {
            return Err(DemuxError::Codec("Reached end of data".into()));
        }
        let total = self.bit_offset as usize + n as usize;
        self.byte_offset += total / 8;
        self.bit_offset = (total % 8) as u8;
        Ok(())
    }

    /// Aligns reader to next byte boundary by skipping remaining bits in current byte.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len().saturating_sub(self.byte_offset)) * 8 - self.bit_offset as usize
    }
}

/// Big-endian bit writer, the counterpart of [`BitReader`].
///
/// Used to build ADTS headers, AudioSpecificConfig blobs and parameter sets.
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_offset: u8,
}

impl BitWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one bit.
    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_offset == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (7 - self.bit_offset);
        }
        self.bit_offset = (self.bit_offset + 1) % 8;
    }

    /// Writes the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        for i in (0..n.min(32)).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes an unsigned exponential Golomb code.
    pub fn write_golomb(&mut self, value: u32) {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        for _ in 1..len {
            self.write_bit(false);
        }
        for i in (0..len).rev() {
            self.write_bit((code >> i) & 1 == 1);
        }
    }

    /// Writes a signed exponential Golomb code.
    pub fn write_signed_golomb(&mut self, value: i32) {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.write_golomb(code);
    }

    /// Finishes an RBSP: stop bit followed by zero bits up to the byte boundary.
    pub fn write_trailing_bits(&mut self) {
        self.write_bit(true);
        while self.bit_offset != 0 {
            self.write_bit(false);
        }
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        if self.bit_offset == 0 {
            self.data.len() * 8
        } else {
            (self.data.len() - 1) * 8 + self.bit_offset as usize
        }
    }

    /// The written bytes; a partial last byte is zero-padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
