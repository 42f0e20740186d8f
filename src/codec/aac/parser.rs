use bytes::{BufMut, Bytes, BytesMut};

use super::types::{AACConfig, AACFrame, ADTSHeader, ProfileType, ADTS_HEADER_LEN};
use crate::utils::BitReader;
use crate::{DemuxError, Result};

/// ADTS parser. Remembers the config of the last header it parsed so raw
/// frames can still be attributed.
#[derive(Debug, Default)]
pub struct AACParser {
    config: Option<AACConfig>,
}

impl AACParser {
    /// Parser with no config yet.
    pub fn new() -> Self {
        Self { config: None }
    }

    /// Parses one frame, ADTS-framed or raw.
    pub fn parse_frame(&mut self, data: &[u8]) -> Result<AACFrame> {
        if data.len() >= ADTS_HEADER_LEN {
            if let Ok(header) = self.parse_adts_header(data) {
                let start = header.header_len().min(data.len());
                let end = (header.frame_length as usize).clamp(start, data.len());
                let config = header.config();
                self.config = Some(config.clone());
                return Ok(AACFrame::new(config, data[start..end].to_vec()));
            }
        }

        // Raw frame: fall back to the last known config
        if let Some(config) = &self.config {
            Ok(AACFrame::new(config.clone(), data.to_vec()))
        } else {
            Err(DemuxError::Codec(
                "No AAC configuration available and data is not in ADTS format".into(),
            ))
        }
    }

    /// Parses and validates the header at the start of `data`.
    pub fn parse_adts_header(&mut self, data: &[u8]) -> Result<ADTSHeader> {
        if data.len() < ADTS_HEADER_LEN {
            return Err(DemuxError::Codec("ADTS header too short".into()));
        }

        let mut reader = BitReader::new(&data[..ADTS_HEADER_LEN]);

        let sync_word = reader.read_bits(12)?;
        if sync_word != 0xFFF {
            return Err(DemuxError::Codec("Invalid ADTS sync word".into()));
        }

        let id = reader.read_bits(1)? as u8;
        let layer = reader.read_bits(2)? as u8;
        let protection_absent = reader.read_bit()?;
        let profile = ProfileType::from(reader.read_bits(2)? as u8);
        let sample_rate_index = reader.read_bits(4)? as u8;
        let private_bit = reader.read_bit()?;
        let channel_configuration = reader.read_bits(3)? as u8;
        let original_copy = reader.read_bit()?;
        let home = reader.read_bit()?;
        let copyright_id_bit = reader.read_bit()?;
        let copyright_id_start = reader.read_bit()?;
        let frame_length = reader.read_bits(13)? as u16;
        let buffer_fullness = reader.read_bits(11)? as u16;
        let number_of_raw_blocks = reader.read_bits(2)? as u8;

        let header = ADTSHeader {
            sync_word,
            id,
            layer,
            protection_absent,
            profile,
            sample_rate_index,
            private_bit,
            channel_configuration,
            original_copy,
            home,
            copyright_id_bit,
            copyright_id_start,
            frame_length,
            buffer_fullness,
            number_of_raw_blocks,
        };

        if header.sample_rate().is_none() {
            return Err(DemuxError::Codec(format!(
                "invalid ADTS sampling frequency index {}",
                sample_rate_index
            )));
        }
        if (frame_length as usize) < header.header_len() {
            return Err(DemuxError::Codec(format!(
                "ADTS frame length {} shorter than its header",
                frame_length
            )));
        }

        Ok(header)
    }

    /// Splits a run of back-to-back ADTS frames. Each returned slice is a
    /// whole frame, header included. Splitting stops at the first header that
    /// does not parse or frame that runs past the end; what is left is
    /// reported as [`AdtsRun::rejected_tail`].
    pub fn split_frames<'a>(&mut self, data: &'a [u8]) -> AdtsRun<'a> {
        let mut frames = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let header = match self.parse_adts_header(&data[pos..]) {
                Ok(header) => header,
                Err(e) => return AdtsRun::stopped(frames, &data[pos..], e),
            };
            let len = header.frame_length as usize;
            if len > data.len() - pos {
                let err = DemuxError::Codec(format!(
                    "ADTS frame of {} bytes truncated at {}",
                    len,
                    data.len() - pos
                ));
                return AdtsRun::stopped(frames, &data[pos..], err);
            }
            self.config = Some(header.config());
            frames.push((header, &data[pos..pos + len]));
            pos += len;
        }

        AdtsRun {
            frames,
            rejected_tail: None,
        }
    }

    /// Sets the config used for raw frames.
    pub fn set_config(&mut self, config: AACConfig) {
        self.config = Some(config);
    }

    /// The last config seen or set.
    pub fn config(&self) -> Option<&AACConfig> {
        self.config.as_ref()
    }
}

/// Frames found by [`AACParser::split_frames`].
#[derive(Debug)]
pub struct AdtsRun<'a> {
    /// Complete frames in input order.
    pub frames: Vec<(ADTSHeader, &'a [u8])>,
    /// Unparseable bytes after the last complete frame, with the reason.
    pub rejected_tail: Option<(&'a [u8], DemuxError)>,
}

impl<'a> AdtsRun<'a> {
    fn stopped(frames: Vec<(ADTSHeader, &'a [u8])>, tail: &'a [u8], err: DemuxError) -> Self {
        Self {
            frames,
            rejected_tail: Some((tail, err)),
        }
    }
}

/// Prefixes a raw AAC frame with an ADTS header built from `config`.
pub fn prepend_adts_header(config: &AACConfig, payload: &[u8]) -> Bytes {
    let header = ADTSHeader::for_payload(config, payload.len());
    let mut out = BytesMut::with_capacity(ADTS_HEADER_LEN + payload.len());
    out.put_slice(&header.to_bytes());
    out.put_slice(payload);
    out.freeze()
}
