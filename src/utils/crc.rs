//! MPEG-2 CRC-32 over PSI sections (ITU-T H.222.0 Annex B).
//!
//! Non-reflected, polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no final
//! XOR.

const POLYNOMIAL: u32 = 0x04C1_1DB7;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

/// CRC calculator for PAT/PMT sections.
///
/// ```
/// use esdemux::utils::Crc32Mpeg2;
///
/// let crc = Crc32Mpeg2::new();
/// let mut section = vec![0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00];
/// let checksum = crc.calculate(&section);
/// section.extend_from_slice(&checksum.to_be_bytes());
/// assert!(crc.verify(&section));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    /// The calculator; the table is built at compile time.
    pub fn new() -> Self {
        Self
    }

    /// CRC-32/MPEG-2 of `data`: polynomial 0x04C11DB7, init 0xFFFFFFFF, no
    /// reflection, no final xor.
    pub fn calculate(&self, data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ TABLE[index as usize]
        })
    }

    /// Checks a section whose last four bytes carry its CRC. Running the CRC
    /// over the section with its checksum included yields zero.
    pub fn verify(&self, section: &[u8]) -> bool {
        section.len() >= 4 && self.calculate(section) == 0
    }
}
