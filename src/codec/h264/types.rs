use bytes::Bytes;

/// One NAL unit with emulation prevention bytes removed.
#[derive(Debug, Clone)]
pub struct NALUnit {
    /// `nal_unit_type`, 5 bits.
    pub nal_type: u8,
    /// `nal_ref_idc`, 2 bits.
    pub nal_ref_idc: u8,
    /// The whole unit, header byte included.
    pub data: Bytes,
}

impl NALUnit {
    /// Reads the type and ref idc from the header byte.
    pub fn new(data: Bytes) -> Self {
        let header = data.first().copied().unwrap_or(0);
        Self {
            nal_type: header & 0x1F,
            nal_ref_idc: (header >> 5) & 0x03,
            data,
        }
    }

    /// Typed view of `nal_type`.
    pub fn unit_type(&self) -> NALUnitType {
        NALUnitType::from(self.nal_type)
    }

    /// True for an IDR slice.
    pub fn is_idr(&self) -> bool {
        self.unit_type() == NALUnitType::IdrSlice
    }

    /// True for an SPS or PPS.
    pub fn is_parameter_set(&self) -> bool {
        matches!(self.unit_type(), NALUnitType::Sps | NALUnitType::Pps)
    }
}

/// Fields of a sequence parameter set the decoder config is built from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SPSInfo {
    /// `profile_idc`, 66 for Baseline.
    pub profile_idc: u8,
    /// constraint_set0..5 flags as one byte.
    pub constraint_flags: u8,
    /// `level_idc`, ten times the level number.
    pub level_idc: u8,
    /// `seq_parameter_set_id`.
    pub seq_parameter_set_id: u32,
    /// Cropped luma width in pixels.
    pub width: u32,
    /// Cropped luma height in pixels.
    pub height: u32,
}

/// Fields of a picture parameter set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PPSInfo {
    /// Identifier other slices refer to.
    pub pic_parameter_set_id: u32,
    /// SPS this PPS refers to.
    pub seq_parameter_set_id: u32,
    /// CABAC when set.
    pub entropy_coding_mode_flag: bool,
}

/// The NAL unit types the demuxer tells apart; everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    /// Coded slice of a non-IDR picture, type 1.
    NonIdrSlice,
    /// Coded slice of an IDR picture, type 5.
    IdrSlice,
    /// Supplemental enhancement information, type 6.
    Sei,
    /// Sequence parameter set, type 7.
    Sps,
    /// Picture parameter set, type 8.
    Pps,
    /// Access unit delimiter, type 9.
    AccessUnitDelimiter,
    /// Any other type.
    Other(u8),
}

impl From<u8> for NALUnitType {
    /// Accepts either a bare type or a full NAL header byte.
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NALUnitType::NonIdrSlice,
            5 => NALUnitType::IdrSlice,
            6 => NALUnitType::Sei,
            7 => NALUnitType::Sps,
            8 => NALUnitType::Pps,
            9 => NALUnitType::AccessUnitDelimiter,
            other => NALUnitType::Other(other),
        }
    }
}
