use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::nal::START_CODE;
use crate::{DemuxError, Result};

/// AVCDecoderConfigurationRecord, the `avcC` extradata form of H.264
/// parameter sets used by MP4-family containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    /// `AVCProfileIndication`.
    pub profile_idc: u8,
    /// Constraint flags byte of the first SPS.
    pub profile_compatibility: u8,
    /// `AVCLevelIndication`.
    pub level_idc: u8,
    /// Size in bytes of the length prefix in front of every sample NAL unit.
    pub nal_length_size: u8,
    /// Sequence parameter sets without length prefix.
    pub sps: Vec<Bytes>,
    /// Picture parameter sets without length prefix.
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfig {
    /// Whether `data` looks like an avcC record rather than an Annex-B run.
    pub fn is_avcc(data: &[u8]) -> bool {
        data.len() >= 7 && data[0] == 1
    }

    /// Parses a record. Trailing High-profile fields are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !Self::is_avcc(data) {
            return Err(DemuxError::Codec("not an avcC record".into()));
        }

        let profile_idc = data[1];
        let profile_compatibility = data[2];
        let level_idc = data[3];
        let nal_length_size = (data[4] & 0x03) + 1;

        let mut pos = 5;
        let sps_count = (data[pos] & 0x1F) as usize;
        pos += 1;
        let sps = Self::read_sets(data, &mut pos, sps_count)?;

        let pps_count = *data
            .get(pos)
            .ok_or_else(|| DemuxError::Codec("avcC truncated before PPS count".into()))?
            as usize;
        pos += 1;
        let pps = Self::read_sets(data, &mut pos, pps_count)?;

        Ok(Self {
            profile_idc,
            profile_compatibility,
            level_idc,
            nal_length_size,
            sps,
            pps,
        })
    }

    fn read_sets(data: &[u8], pos: &mut usize, count: usize) -> Result<Vec<Bytes>> {
        let mut sets = Vec::with_capacity(count);
        for _ in 0..count {
            if *pos + 2 > data.len() {
                return Err(DemuxError::Codec("avcC truncated in set length".into()));
            }
            let len = u16::from_be_bytes([data[*pos], data[*pos + 1]]) as usize;
            *pos += 2;
            if *pos + len > data.len() {
                return Err(DemuxError::Codec("avcC truncated in set body".into()));
            }
            sets.push(Bytes::copy_from_slice(&data[*pos..*pos + len]));
            *pos += len;
        }
        Ok(sets)
    }

    /// Serializes the record with a one-byte SPS and PPS count each.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(1);
        out.put_u8(self.profile_idc);
        out.put_u8(self.profile_compatibility);
        out.put_u8(self.level_idc);
        out.put_u8(0xFC | (self.nal_length_size.saturating_sub(1) & 0x03));
        out.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F));
        for sps in &self.sps {
            out.put_u16(sps.len() as u16);
            out.put_slice(sps);
        }
        out.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            out.put_u16(pps.len() as u16);
            out.put_slice(pps);
        }
        out.freeze()
    }

    /// Rewrites a length-prefixed sample into Annex-B framing.
    pub fn sample_to_annex_b(&self, sample: &[u8]) -> Result<Bytes> {
        let size = self.nal_length_size as usize;
        let mut out = BytesMut::with_capacity(sample.len() + 16);
        let mut pos = 0;

        while pos < sample.len() {
            if pos + size > sample.len() {
                return Err(DemuxError::Codec("truncated NAL length prefix".into()));
            }
            let len = sample[pos..pos + size]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            pos += size;
            if pos + len > sample.len() {
                return Err(DemuxError::Codec("NAL unit overruns sample".into()));
            }
            out.put_slice(&START_CODE);
            out.put_slice(&sample[pos..pos + len]);
            pos += len;
        }

        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> AvcDecoderConfig {
        AvcDecoderConfig {
            profile_idc: 66,
            profile_compatibility: 0xC0,
            level_idc: 30,
            nal_length_size: 4,
            sps: vec![Bytes::from_static(&[0x67, 0x42, 0xC0, 0x1E])],
            pps: vec![Bytes::from_static(&[0x68, 0xCE, 0x38, 0x80])],
        }
    }

    #[test]
    fn test_parse_written_record() {
        let bytes = record().to_bytes();
        assert!(AvcDecoderConfig::is_avcc(&bytes));
        assert_eq!(AvcDecoderConfig::parse(&bytes).unwrap(), record());
    }

    #[test]
    fn test_truncated_record() {
        let bytes = record().to_bytes();
        assert!(AvcDecoderConfig::parse(&bytes[..bytes.len() - 2]).is_err());
        assert!(AvcDecoderConfig::parse(&[0, 0, 0, 1, 0x67]).is_err());
    }

    #[test]
    fn test_sample_to_annex_b() {
        let sample = [0, 0, 0, 2, 0x65, 0x88, 0, 0, 0, 1, 0x06];
        let out = record().sample_to_annex_b(&sample).unwrap();
        assert_eq!(out.as_ref(), &[0, 0, 0, 1, 0x65, 0x88, 0, 0, 0, 1, 0x06][..]);

        assert!(record().sample_to_annex_b(&[0, 0, 0, 9, 0x65]).is_err());
    }
}
