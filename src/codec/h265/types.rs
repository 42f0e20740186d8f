/// General profile, tier and level of an HEVC sequence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileTierLevel {
    /// `general_profile_space`.
    pub profile_space: u8,
    /// High tier when set.
    pub tier_flag: bool,
    /// `general_profile_idc`, 1 for Main.
    pub profile_idc: u8,
    /// `general_profile_compatibility_flag[0..32]`, MSB first.
    pub profile_compatibility_flags: u32,
    /// 30 times the level number, 93 for level 3.1.
    pub level_idc: u8,
}

/// Fields of an HEVC sequence parameter set the decoder config is built from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SPSInfo {
    /// `sps_video_parameter_set_id`.
    pub vps_id: u8,
    /// `sps_seq_parameter_set_id`.
    pub sps_id: u32,
    /// Temporal sub-layers minus one.
    pub max_sub_layers_minus1: u8,
    /// General profile, tier and level.
    pub profile_tier_level: ProfileTierLevel,
    /// 1 for 4:2:0.
    pub chroma_format_idc: u32,
    /// Luma width after the conformance window is applied.
    pub width: u32,
    /// Luma height after the conformance window is applied.
    pub height: u32,
}

/// Video parameter set NAL unit type.
pub const NAL_VPS: u8 = 32;
/// Sequence parameter set NAL unit type.
pub const NAL_SPS: u8 = 33;
/// Picture parameter set NAL unit type.
pub const NAL_PPS: u8 = 34;
