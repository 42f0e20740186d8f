//! Core audio/video types shared by containers, the translator and the caller.

use std::fmt;

mod config;
mod packet;

pub use config::*;
pub use packet::*;

/// Which elementary stream a packet or config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Audio stream.
    Audio,
    /// Video stream.
    Video,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Audio => write!(f, "audio"),
            StreamType::Video => write!(f, "video"),
        }
    }
}

/// The stream-type channel a demuxer instance serves.
///
/// A player normally runs one `Audio` and one `Video` demuxer over the same
/// kind of segments; `Muxed` delivers both from one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemuxerType {
    /// Only the audio stream.
    Audio,
    /// Only the video stream.
    Video,
    /// Both streams.
    Muxed,
}

impl DemuxerType {
    /// True when packets of `stream_type` are delivered by this kind of demuxer.
    pub fn accepts(&self, stream_type: StreamType) -> bool {
        match self {
            DemuxerType::Audio => stream_type == StreamType::Audio,
            DemuxerType::Video => stream_type == StreamType::Video,
            DemuxerType::Muxed => true,
        }
    }

    /// Lowercase name, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DemuxerType::Audio => "audio",
            DemuxerType::Video => "video",
            DemuxerType::Muxed => "muxed",
        }
    }
}

/// Video codecs the containers recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// ITU-T H.264 / AVC.
    H264,
    /// ITU-T H.265 / HEVC.
    H265,
}

/// Audio codecs the containers recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// MPEG-4 AAC, ADTS-framed in TS.
    Aac,
}

/// Codec of a container stream, as reported by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// A video stream.
    Video(VideoCodec),
    /// An audio stream.
    Audio(AudioCodec),
}

impl CodecType {
    /// Audio or video.
    pub fn stream_type(&self) -> StreamType {
        match self {
            CodecType::Video(_) => StreamType::Video,
            CodecType::Audio(_) => StreamType::Audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demuxer_type_selection() {
        assert!(DemuxerType::Audio.accepts(StreamType::Audio));
        assert!(!DemuxerType::Audio.accepts(StreamType::Video));
        assert!(DemuxerType::Video.accepts(StreamType::Video));
        assert!(DemuxerType::Muxed.accepts(StreamType::Audio));
        assert!(DemuxerType::Muxed.accepts(StreamType::Video));
    }

    #[test]
    fn test_packet_builder() {
        let packet = ElementaryStreamPacket::new(StreamType::Video, vec![0x65, 0x88])
            .with_pts(1.5)
            .with_dts(1.4)
            .with_key_flag(true);
        assert_eq!(packet.pts, 1.5);
        assert_eq!(packet.dts, 1.4);
        assert!(packet.is_key_frame);
        assert!(!packet.is_encrypted());
        assert_eq!(CodecType::Audio(AudioCodec::Aac).stream_type(), StreamType::Audio);
    }
}
