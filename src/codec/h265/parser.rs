use super::types::{ProfileTierLevel, SPSInfo, NAL_SPS};
use crate::codec::nal::{nal_unit_type, remove_emulation_prevention};
use crate::av::VideoCodec;
use crate::utils::BitReader;
use crate::{DemuxError, Result};

/// Largest luma side level 6.2 allows: sqrt(8 * MaxLumaPs).
const MAX_DIMENSION: u64 = 16_888;

/// H.265/HEVC parameter set parser. Remembers the last SPS it has seen.
#[derive(Debug, Default)]
pub struct H265Parser {
    sps: Option<SPSInfo>,
}

impl H265Parser {
    /// Parser with no SPS seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a complete SPS NAL unit, two-byte header included.
    pub fn parse_sps(&mut self, nal: &[u8]) -> Result<SPSInfo> {
        if nal.len() < 3 || nal_unit_type(VideoCodec::H265, nal[0]) != NAL_SPS {
            return Err(DemuxError::Codec("not an HEVC SPS NAL unit".into()));
        }
        let rbsp = remove_emulation_prevention(&nal[2..]);
        let info = Self::parse_sps_rbsp(&rbsp)?;
        self.sps = Some(info.clone());
        Ok(info)
    }

    fn parse_sps_rbsp(data: &[u8]) -> Result<SPSInfo> {
        let mut reader = BitReader::new(data);

        let vps_id = reader.read_bits(4)? as u8;
        let max_sub_layers_minus1 = reader.read_bits(3)? as u8;
        reader.skip_bits(1)?; // sps_temporal_id_nesting_flag

        let profile_tier_level = Self::parse_profile_tier_level(&mut reader, max_sub_layers_minus1)?;

        let sps_id = reader.read_golomb()?;
        let chroma_format_idc = reader.read_golomb()?;
        let mut separate_colour_plane = false;
        if chroma_format_idc == 3 {
            separate_colour_plane = reader.read_bit()?;
        }

        let mut width = u64::from(reader.read_golomb()?);
        let mut height = u64::from(reader.read_golomb()?);

        if reader.read_bit()? {
            let left = u64::from(reader.read_golomb()?);
            let right = u64::from(reader.read_golomb()?);
            let top = u64::from(reader.read_golomb()?);
            let bottom = u64::from(reader.read_golomb()?);
            let (sub_width, sub_height) = match (chroma_format_idc, separate_colour_plane) {
                (1, _) => (2, 2),
                (2, _) => (2, 1),
                _ => (1, 1),
            };
            width = width
                .checked_sub((left + right) * sub_width)
                .ok_or_else(|| DemuxError::Codec("conformance window exceeds the picture width".into()))?;
            height = height
                .checked_sub((top + bottom) * sub_height)
                .ok_or_else(|| DemuxError::Codec("conformance window exceeds the picture height".into()))?;
        }

        let width = checked_dimension(width, "width")?;
        let height = checked_dimension(height, "height")?;

        log::trace!(
            "hevc sps: profile={} level={} {}x{}",
            profile_tier_level.profile_idc,
            profile_tier_level.level_idc,
            width,
            height
        );

        Ok(SPSInfo {
            vps_id,
            sps_id,
            max_sub_layers_minus1,
            profile_tier_level,
            chroma_format_idc,
            width,
            height,
        })
    }

    /// `profile_tier_level(1, max_sub_layers_minus1)`; sub-layer fields are
    /// skipped.
    fn parse_profile_tier_level(reader: &mut BitReader, max_sub_layers_minus1: u8) -> Result<ProfileTierLevel> {
        let profile_space = reader.read_bits(2)? as u8;
        let tier_flag = reader.read_bit()?;
        let profile_idc = reader.read_bits(5)? as u8;
        let profile_compatibility_flags = reader.read_bits(32)?;
        // progressive, interlaced, non-packed and frame-only flags, then 44
        // reserved bits
        reader.skip_bits(48)?;
        let level_idc = reader.read_bits(8)? as u8;

        let sub_layers = usize::from(max_sub_layers_minus1);
        let mut present = Vec::with_capacity(sub_layers);
        for _ in 0..sub_layers {
            let profile_present = reader.read_bit()?;
            let level_present = reader.read_bit()?;
            present.push((profile_present, level_present));
        }
        if sub_layers > 0 {
            for _ in sub_layers..8 {
                reader.skip_bits(2)?; // reserved_zero_2bits
            }
        }
        for (profile_present, level_present) in present {
            if profile_present {
                reader.skip_bits(88)?;
            }
            if level_present {
                reader.skip_bits(8)?;
            }
        }

        Ok(ProfileTierLevel {
            profile_space,
            tier_flag,
            profile_idc,
            profile_compatibility_flags,
            level_idc,
        })
    }

    /// The last SPS parsed.
    pub fn sps(&self) -> Option<&SPSInfo> {
        self.sps.as_ref()
    }

    /// Width and height of the last SPS.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.sps.as_ref().map(|sps| (sps.width, sps.height))
    }
}

fn checked_dimension(value: u64, what: &str) -> Result<u32> {
    if value == 0 || value > MAX_DIMENSION {
        return Err(DemuxError::Codec(format!("HEVC SPS {} {} out of range", what, value)));
    }
    Ok(value as u32)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Main profile, level 3.1, 4:2:0, 1280x720.
    pub(crate) const SPS_1280X720: [u8; 24] = [
        0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x03, 0x00, 0x5D, 0xA0, 0x02, 0x80, 0x80, 0x2D, 0x14,
    ];

    /// 1920x1088 coded, four chroma rows cropped at the bottom.
    const SPS_1920X1080: [u8; 25] = [
        0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x03, 0x00, 0x5D, 0xA0, 0x03, 0xC0, 0x80, 0x11, 0x07, 0xCB,
    ];

    #[test]
    fn test_parse_sps() {
        let mut parser = H265Parser::new();
        assert_eq!(parser.dimensions(), None);

        let sps = parser.parse_sps(&SPS_1280X720).unwrap();
        assert_eq!((sps.width, sps.height), (1280, 720));
        assert_eq!(sps.profile_tier_level.profile_idc, 1);
        assert_eq!(sps.profile_tier_level.level_idc, 93);
        assert_eq!(sps.profile_tier_level.profile_compatibility_flags, 0x6000_0000);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(parser.dimensions(), Some((1280, 720)));
    }

    #[test]
    fn test_conformance_window() {
        let sps = H265Parser::new().parse_sps(&SPS_1920X1080).unwrap();
        assert_eq!((sps.width, sps.height), (1920, 1080));
    }

    #[test]
    fn test_rejects_other_units_and_truncation() {
        let mut parser = H265Parser::new();
        // VPS header
        assert!(parser.parse_sps(&[0x40, 0x01, 0x0C]).is_err());
        assert!(parser.parse_sps(&SPS_1280X720[..12]).is_err());
        assert_eq!(parser.sps(), None);
    }
}
