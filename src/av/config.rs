use bytes::Bytes;

use super::{AudioCodec, VideoCodec};

/// Decoder configuration for a video elementary stream.
///
/// `extra_data` holds the parameter sets as an Annex-B run (start code before
/// every NAL unit). A config is an immutable snapshot: a mid-stream change is
/// announced with a new `VideoConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfig {
    /// Codec of the stream.
    pub codec: VideoCodec,
    /// `profile_idc` of the active SPS.
    pub profile: u8,
    /// `level_idc` of the active SPS.
    pub level: u8,
    /// Cropped width in pixels, 0 when unknown.
    pub width: u32,
    /// Cropped height in pixels, 0 when unknown.
    pub height: u32,
    /// Annex-B parameter sets.
    pub extra_data: Bytes,
}

impl VideoConfig {
    /// Empty config for `codec`.
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            profile: 0,
            level: 0,
            width: 0,
            height: 0,
            extra_data: Bytes::new(),
        }
    }

    /// Whether the config carries any parameter sets at all.
    pub fn has_parameter_sets(&self) -> bool {
        !self.extra_data.is_empty()
    }
}

/// Decoder configuration for an audio elementary stream.
///
/// `extra_data` holds the AudioSpecificConfig for AAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Codec of the stream.
    pub codec: AudioCodec,
    /// MPEG-4 audio object type (2 = AAC LC).
    pub profile: u8,
    /// Sampling rate in Hz.
    pub sample_rate: u32,
    /// Channel configuration.
    pub channels: u8,
    /// Always 16 for AAC.
    pub bits_per_sample: u8,
    /// AudioSpecificConfig.
    pub extra_data: Bytes,
}

impl AudioConfig {
    /// Empty config for `codec`.
    pub fn new(codec: AudioCodec) -> Self {
        Self {
            codec,
            profile: 0,
            sample_rate: 0,
            channels: 0,
            bits_per_sample: 16,
            extra_data: Bytes::new(),
        }
    }
}

/// Content protection initialization data found in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmInitData {
    /// Scheme identifier from the container.
    pub protection_scheme: String,
    /// Opaque data handed to the CDM.
    pub init_data: Bytes,
}
