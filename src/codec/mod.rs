//! Elementary stream codec helpers: NAL framing, H.264 and H.265 parameter
//! sets and AAC framing.

use crate::av::VideoCodec;
use crate::Result;

/// AAC/ADTS framing and AudioSpecificConfig
pub mod aac;
/// H.264/AVC parameter sets and avcC records
pub mod h264;
/// H.265/HEVC parameter sets
pub mod h265;
/// Annex-B NAL unit framing shared by H.264 and H.265
pub mod nal;

pub use nal::ParameterSets;

/// Profile, level and size read from a sequence parameter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PictureFormat {
    /// `profile_idc`.
    pub profile: u8,
    /// `level_idc`.
    pub level: u8,
    /// Cropped luma width.
    pub width: u32,
    /// Cropped luma height.
    pub height: u32,
}

/// Reads the picture format from one SPS NAL unit of `codec`.
pub fn read_picture_format(codec: VideoCodec, sps: &[u8]) -> Result<PictureFormat> {
    match codec {
        VideoCodec::H264 => {
            let info = h264::H264Parser::new().parse_sps(sps)?;
            Ok(PictureFormat {
                profile: info.profile_idc,
                level: info.level_idc,
                width: info.width,
                height: info.height,
            })
        }
        VideoCodec::H265 => {
            let info = h265::H265Parser::new().parse_sps(sps)?;
            Ok(PictureFormat {
                profile: info.profile_tier_level.profile_idc,
                level: info.profile_tier_level.level_idc,
                width: info.width,
                height: info.height,
            })
        }
    }
}
