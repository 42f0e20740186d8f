use crate::utils::BitWriter;
use crate::{DemuxError, Result};

/// Size of an ADTS header without CRC.
pub const ADTS_HEADER_LEN: usize = 7;

/// Samples per AAC frame.
pub const SAMPLES_PER_FRAME: u32 = 1024;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Sampling frequency for an ADTS/ASC frequency index.
pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    SAMPLE_RATES.get(index as usize).copied()
}

/// Frequency index for a sampling rate, if the table has it.
pub fn index_from_sample_rate(rate: u32) -> Option<u8> {
    SAMPLE_RATES.iter().position(|&r| r == rate).map(|i| i as u8)
}

/// The two-bit ADTS profile field. The MPEG-4 audio object type is one more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    /// AAC Main
    Main = 0,
    /// AAC Low Complexity
    LC = 1,
    /// AAC Scalable Sample Rate
    SSR = 2,
    /// AAC Long Term Prediction
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            3 => ProfileType::LTP,
            _ => ProfileType::LC,
        }
    }
}

/// Decoder-relevant parameters shared by ADTS headers and AudioSpecificConfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AACConfig {
    /// Audio object type minus one.
    pub profile: ProfileType,
    /// Index into the sampling frequency table.
    pub sample_rate_index: u8,
    /// Channel configuration, 0 to 7.
    pub channel_configuration: u8,
    /// Samples per frame.
    pub frame_length: u16,
}

impl Default for AACConfig {
    fn default() -> Self {
        Self {
            profile: ProfileType::LC,
            sample_rate_index: 4, // 44100 Hz
            channel_configuration: 2,
            frame_length: SAMPLES_PER_FRAME as u16,
        }
    }
}

impl AACConfig {
    /// Sampling frequency in Hz.
    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_from_index(self.sample_rate_index)
    }

    /// MPEG-4 audio object type (AAC LC = 2).
    pub fn object_type(&self) -> u8 {
        self.profile as u8 + 1
    }

    /// Builds the two-byte AudioSpecificConfig: object type (5 bits),
    /// sampling frequency index (4), channel configuration (4), then three
    /// zero GASpecificConfig bits.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let mut writer = BitWriter::new();
        writer.write_bits(self.object_type() as u32, 5);
        writer.write_bits(self.sample_rate_index as u32, 4);
        writer.write_bits(self.channel_configuration as u32, 4);
        writer.write_bits(0, 3);
        let bytes = writer.into_bytes();
        [bytes[0], bytes[1]]
    }

    /// Parses the first two bytes of an AudioSpecificConfig.
    pub fn from_audio_specific_config(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(DemuxError::Codec("AudioSpecificConfig too short".into()));
        }
        let object_type = data[0] >> 3;
        if !(1..=4).contains(&object_type) {
            return Err(DemuxError::Codec(format!(
                "unsupported audio object type {}",
                object_type
            )));
        }
        let sample_rate_index = ((data[0] & 0x07) << 1) | (data[1] >> 7);
        if sample_rate_from_index(sample_rate_index).is_none() {
            return Err(DemuxError::Codec(format!(
                "invalid sampling frequency index {}",
                sample_rate_index
            )));
        }
        Ok(Self {
            profile: ProfileType::from(object_type - 1),
            sample_rate_index,
            channel_configuration: (data[1] >> 3) & 0x0F,
            frame_length: SAMPLES_PER_FRAME as u16,
        })
    }
}

/// A fixed plus variable ADTS header, one field per bitstream element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ADTSHeader {
    /// 12 bits, always 0xFFF.
    pub sync_word: u32,
    /// 0 for MPEG-4, 1 for MPEG-2.
    pub id: u8,
    /// Always 0.
    pub layer: u8,
    /// Set when no CRC follows the header.
    pub protection_absent: bool,
    /// Audio object type minus one.
    pub profile: ProfileType,
    /// Index into the sampling frequency table.
    pub sample_rate_index: u8,
    /// Unused by decoders.
    pub private_bit: bool,
    /// Channel configuration, 0 to 7.
    pub channel_configuration: u8,
    /// Originality flag.
    pub original_copy: bool,
    /// Home flag.
    pub home: bool,
    /// Copyright identification bit.
    pub copyright_id_bit: bool,
    /// Copyright identification start.
    pub copyright_id_start: bool,
    /// 13 bits, header included.
    pub frame_length: u16,
    /// 0x7FF signals VBR.
    pub buffer_fullness: u16,
    /// Raw data blocks in the frame minus one.
    pub number_of_raw_blocks: u8,
}

impl ADTSHeader {
    /// Header for one raw frame of `payload_len` bytes, no CRC, VBR fullness.
    pub fn for_payload(config: &AACConfig, payload_len: usize) -> Self {
        Self {
            sync_word: 0xFFF,
            id: 0,
            layer: 0,
            protection_absent: true,
            profile: config.profile,
            sample_rate_index: config.sample_rate_index,
            private_bit: false,
            channel_configuration: config.channel_configuration,
            original_copy: false,
            home: false,
            copyright_id_bit: false,
            copyright_id_start: false,
            frame_length: (payload_len + ADTS_HEADER_LEN) as u16,
            buffer_fullness: 0x7FF,
            number_of_raw_blocks: 0,
        }
    }

    /// True for the 0xFFF sync word.
    pub fn sync_word_valid(&self) -> bool {
        self.sync_word == 0xFFF
    }

    /// Sampling frequency in Hz, `None` for a reserved index.
    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_from_index(self.sample_rate_index)
    }

    /// Header size, CRC included when present.
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            ADTS_HEADER_LEN + 2
        }
    }

    /// The decoder config this header describes.
    pub fn config(&self) -> AACConfig {
        AACConfig {
            profile: self.profile,
            sample_rate_index: self.sample_rate_index,
            channel_configuration: self.channel_configuration,
            frame_length: SAMPLES_PER_FRAME as u16,
        }
    }

    /// Serializes the header. The CRC is never written.
    pub fn to_bytes(&self) -> [u8; ADTS_HEADER_LEN] {
        let mut writer = BitWriter::new();
        writer.write_bits(self.sync_word, 12);
        writer.write_bits(self.id as u32, 1);
        writer.write_bits(self.layer as u32, 2);
        writer.write_bit(self.protection_absent);
        writer.write_bits(self.profile as u32, 2);
        writer.write_bits(self.sample_rate_index as u32, 4);
        writer.write_bit(self.private_bit);
        writer.write_bits(self.channel_configuration as u32, 3);
        writer.write_bit(self.original_copy);
        writer.write_bit(self.home);
        writer.write_bit(self.copyright_id_bit);
        writer.write_bit(self.copyright_id_start);
        writer.write_bits(self.frame_length as u32, 13);
        writer.write_bits(self.buffer_fullness as u32, 11);
        writer.write_bits(self.number_of_raw_blocks as u32, 2);

        let bytes = writer.into_bytes();
        let mut out = [0u8; ADTS_HEADER_LEN];
        out.copy_from_slice(&bytes[..ADTS_HEADER_LEN]);
        out
    }
}

/// One raw AAC frame with its config.
#[derive(Debug, Clone)]
pub struct AACFrame {
    /// Config of the header the frame came with.
    pub config: AACConfig,
    /// Raw frame payload, ADTS header stripped.
    pub data: Vec<u8>,
}

impl AACFrame {
    /// Wraps a raw frame.
    pub fn new(config: AACConfig, data: Vec<u8>) -> Self {
        Self { config, data }
    }
}
