use bytes::{BufMut, Bytes, BytesMut};

use super::types::{NALUnit, NALUnitType, PPSInfo, SPSInfo};
use crate::utils::BitReader;
use crate::{DemuxError, Result};

/// Profiles whose SPS carries the chroma format and scaling matrix fields.
const HIGH_PROFILES: [u8; 10] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138];

/// Largest picture side an SPS may declare: sqrt(8 * MaxFS) macroblocks at
/// level 6.2.
const MAX_DIMENSION: u64 = 1056 * 16;

fn checked_dimension(value: u64, what: &str) -> Result<u32> {
    if value == 0 || value > MAX_DIMENSION {
        return Err(DemuxError::Codec(format!("SPS {} {} out of range", what, value)));
    }
    Ok(value as u32)
}

/// Stateful H.264 NAL parser. Remembers the last SPS and PPS it has seen.
#[derive(Debug, Default)]
pub struct H264Parser {
    sps: Option<SPSInfo>,
    pps: Option<PPSInfo>,
    buffer: BytesMut,
}

impl H264Parser {
    /// Parser with no parameter sets seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one NAL unit. SPS and PPS units also update the remembered sets.
    pub fn parse_nalu(&mut self, data: &[u8]) -> Result<NALUnit> {
        if data.is_empty() {
            return Err(DemuxError::Codec("empty NAL unit".into()));
        }
        let rbsp = Bytes::from(self.remove_emulation_prevention(data));
        let nalu = NALUnit::new(rbsp.clone());

        match nalu.unit_type() {
            NALUnitType::Sps => self.sps = Some(Self::parse_sps_rbsp(&rbsp[1..])?),
            NALUnitType::Pps => self.pps = Some(Self::parse_pps_rbsp(&rbsp[1..])?),
            _ => {}
        }

        Ok(nalu)
    }

    /// Strips `emulation_prevention_three_byte`s, reusing an internal buffer.
    pub fn remove_emulation_prevention(&mut self, data: &[u8]) -> Vec<u8> {
        self.buffer.clear();
        let mut i = 0;

        while i < data.len() {
            if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03 {
                self.buffer.put_u8(0x00);
                self.buffer.put_u8(0x00);
                i += 3;
                continue;
            }
            self.buffer.put_u8(data[i]);
            i += 1;
        }

        self.buffer.to_vec()
    }

    /// Parses a complete SPS NAL unit, header byte included.
    pub fn parse_sps(&mut self, nal: &[u8]) -> Result<SPSInfo> {
        if nal.len() < 4 || NALUnitType::from(nal[0]) != NALUnitType::Sps {
            return Err(DemuxError::Codec("not an SPS NAL unit".into()));
        }
        let rbsp = self.remove_emulation_prevention(nal);
        let info = Self::parse_sps_rbsp(&rbsp[1..])?;
        self.sps = Some(info.clone());
        Ok(info)
    }

    fn parse_sps_rbsp(data: &[u8]) -> Result<SPSInfo> {
        let mut reader = BitReader::new(data);

        let profile_idc = reader.read_bits(8)? as u8;
        let constraint_flags = reader.read_bits(8)? as u8;
        let level_idc = reader.read_bits(8)? as u8;
        let seq_parameter_set_id = reader.read_golomb()?;

        let mut chroma_format_idc = 1;
        if HIGH_PROFILES.contains(&profile_idc) {
            chroma_format_idc = reader.read_golomb()?;
            if chroma_format_idc == 3 {
                reader.skip_bits(1)?; // separate_colour_plane_flag
            }
            reader.read_golomb()?; // bit_depth_luma_minus8
            reader.read_golomb()?; // bit_depth_chroma_minus8
            reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

            if reader.read_bit()? {
                let count = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..count {
                    if reader.read_bit()? {
                        let size = if i < 6 { 16 } else { 64 };
                        Self::skip_scaling_list(&mut reader, size)?;
                    }
                }
            }
        }

        reader.read_golomb()?; // log2_max_frame_num_minus4
        let pic_order_cnt_type = reader.read_golomb()?;

        if pic_order_cnt_type == 0 {
            reader.read_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
        } else if pic_order_cnt_type == 1 {
            reader.skip_bits(1)?; // delta_pic_order_always_zero_flag
            reader.read_signed_golomb()?; // offset_for_non_ref_pic
            reader.read_signed_golomb()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_golomb()?;
            for _ in 0..cycle {
                reader.read_signed_golomb()?;
            }
        }

        reader.read_golomb()?; // max_num_ref_frames
        reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

        // sizes are computed in u64: ue(v) fields reach 2^32 - 2
        let pic_width_in_mbs = u64::from(reader.read_golomb()?) + 1;
        let pic_height_in_map_units = u64::from(reader.read_golomb()?) + 1;
        let frame_mbs_only_flag = reader.read_bits(1)?;
        if frame_mbs_only_flag == 0 {
            reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
        }
        reader.skip_bits(1)?; // direct_8x8_inference_flag

        let field_factor = 2 - u64::from(frame_mbs_only_flag);
        let mut width = pic_width_in_mbs * 16;
        let mut height = field_factor * pic_height_in_map_units * 16;

        if reader.read_bit()? {
            let left = u64::from(reader.read_golomb()?);
            let right = u64::from(reader.read_golomb()?);
            let top = u64::from(reader.read_golomb()?);
            let bottom = u64::from(reader.read_golomb()?);
            let (crop_x, crop_y) = match chroma_format_idc {
                0 | 3 => (1, field_factor),
                2 => (2, field_factor),
                _ => (2, 2 * field_factor),
            };
            width = width
                .checked_sub((left + right) * crop_x)
                .ok_or_else(|| DemuxError::Codec("SPS cropping exceeds the picture width".into()))?;
            height = height
                .checked_sub((top + bottom) * crop_y)
                .ok_or_else(|| DemuxError::Codec("SPS cropping exceeds the picture height".into()))?;
        }

        let width = checked_dimension(width, "width")?;
        let height = checked_dimension(height, "height")?;

        log::trace!(
            "sps: profile={} level={} {}x{}",
            profile_idc,
            level_idc,
            width,
            height
        );

        Ok(SPSInfo {
            profile_idc,
            constraint_flags,
            level_idc,
            seq_parameter_set_id,
            width,
            height,
        })
    }

    fn parse_pps_rbsp(data: &[u8]) -> Result<PPSInfo> {
        let mut reader = BitReader::new(data);

        let pic_parameter_set_id = reader.read_golomb()?;
        let seq_parameter_set_id = reader.read_golomb()?;
        let entropy_coding_mode_flag = reader.read_bit()?;

        Ok(PPSInfo {
            pic_parameter_set_id,
            seq_parameter_set_id,
            entropy_coding_mode_flag,
        })
    }

    pub(crate) fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
        let mut last_scale: i64 = 8;
        let mut next_scale: i64 = 8;

        for _ in 0..size {
            if next_scale != 0 {
                let delta_scale = i64::from(reader.read_signed_golomb()?);
                next_scale = (last_scale + delta_scale).rem_euclid(256);
            }
            last_scale = if next_scale == 0 { last_scale } else { next_scale };
        }

        Ok(())
    }

    /// The last SPS parsed.
    pub fn sps(&self) -> Option<&SPSInfo> {
        self.sps.as_ref()
    }

    /// The last PPS parsed.
    pub fn pps(&self) -> Option<&PPSInfo> {
        self.pps.as_ref()
    }

    /// Width and height of the last SPS.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.sps.as_ref().map(|sps| (sps.width, sps.height))
    }
}
