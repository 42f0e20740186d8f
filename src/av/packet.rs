use bytes::Bytes;

use super::StreamType;

/// Time in seconds on the player's timeline.
pub type TimeTicks = f64;

/// One clear/encrypted byte run of a subsample-encrypted packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsample {
    /// Leading bytes left in the clear.
    pub clear_bytes: u32,
    /// Encrypted bytes following them.
    pub cipher_bytes: u32,
}

/// Per-packet encryption metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionInfo {
    /// Key identifier.
    pub key_id: Vec<u8>,
    /// Initialization vector.
    pub iv: Vec<u8>,
    /// Empty when the whole packet is encrypted.
    pub subsamples: Vec<Subsample>,
}

/// One decodable unit of an elementary stream, ready for a platform decoder.
///
/// Packets are moved to whoever receives them; the pipeline never keeps a copy.
#[derive(Debug, PartialEq)]
pub struct ElementaryStreamPacket {
    /// Stream the packet belongs to.
    pub stream_type: StreamType,
    /// Presentation time in seconds, offset included.
    pub pts: TimeTicks,
    /// Decode time in seconds; equals `pts` when the container has no DTS.
    pub dts: TimeTicks,
    /// Seconds, 0 when unknown.
    pub duration: TimeTicks,
    /// Annex-B access unit or one ADTS frame.
    pub data: Bytes,
    /// Decoding can start here.
    pub is_key_frame: bool,
    /// Set for encrypted packets.
    pub encryption: Option<EncryptionInfo>,
}

impl ElementaryStreamPacket {
    /// Clear, non-key packet at time zero.
    pub fn new(stream_type: StreamType, data: impl Into<Bytes>) -> Self {
        Self {
            stream_type,
            pts: 0.0,
            dts: 0.0,
            duration: 0.0,
            data: data.into(),
            is_key_frame: false,
            encryption: None,
        }
    }

    /// Sets `pts`.
    pub fn with_pts(mut self, pts: TimeTicks) -> Self {
        self.pts = pts;
        self
    }

    /// Sets `dts`.
    pub fn with_dts(mut self, dts: TimeTicks) -> Self {
        self.dts = dts;
        self
    }

    /// Sets `duration`.
    pub fn with_duration(mut self, duration: TimeTicks) -> Self {
        self.duration = duration;
        self
    }

    /// Sets `is_key_frame`.
    pub fn with_key_flag(mut self, is_key_frame: bool) -> Self {
        self.is_key_frame = is_key_frame;
        self
    }

    /// Attaches encryption metadata.
    pub fn with_encryption(mut self, encryption: EncryptionInfo) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// True when encryption metadata is attached.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}
