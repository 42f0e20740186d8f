//! # Container parsing
//!
//! The demuxing pipeline drives containers through [`ContainerParser`], a
//! synchronous pull-based interface. A container reads bytes from a
//! [`ByteSource`] that never blocks: when the source runs dry the container
//! reports [`Progress::NeedMoreData`] and is resumed later from where it
//! stopped.
//!
//! [`ts::TsContainer`] is the bundled MPEG-2 Transport Stream implementation.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::av::{CodecType, EncryptionInfo, StreamType};
use crate::Result;

/// MPEG-2 Transport Stream container
pub mod ts;

/// Result of one pull from a [`ByteSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n > 0` bytes were copied into the caller's buffer.
    Data(usize),
    /// Nothing is available yet; more bytes may arrive later.
    NeedMoreData,
    /// Nothing is available and nothing ever will be.
    EndOfStream,
}

/// Non-blocking byte supplier handed to a container on open.
pub trait ByteSource: Send {
    /// Copies up to `buf.len()` bytes into `buf`. Never blocks.
    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome;
}

/// Outcome of a container operation that may have to wait for input.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress<T> {
    /// The operation completed.
    Ready(T),
    /// Input ran out; repeat the call once more bytes are available.
    NeedMoreData,
}

impl<T> Progress<T> {
    /// True for `Ready`.
    pub fn is_ready(&self) -> bool {
        matches!(self, Progress::Ready(_))
    }

    /// Maps the ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Progress::Ready(value) => Progress::Ready(f(value)),
            Progress::NeedMoreData => Progress::NeedMoreData,
        }
    }
}

/// Rational time base of container timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    /// Numerator.
    pub num: u32,
    /// Denominator.
    pub den: u32,
}

impl TimeBase {
    /// The 90 kHz clock of MPEG-2 systems.
    pub const MPEG: TimeBase = TimeBase { num: 1, den: 90_000 };

    /// Time base of `num / den` seconds per tick.
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Converts `ticks` to seconds; 0 for a zero denominator.
    pub fn to_seconds(&self, ticks: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ticks as f64 * self.num as f64 / self.den as f64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        TimeBase::MPEG
    }
}

/// Content protection declared by the container for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionInfo {
    /// Scheme identifier, e.g. `urn:dvb:casystemid:2560`.
    pub scheme: String,
    /// Opaque scheme data for the CDM.
    pub init_data: Bytes,
}

/// Per-stream codec description exposed by a container.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    /// Codec of the stream.
    pub codec: CodecType,
    /// avcC record or Annex-B parameter sets for video, AudioSpecificConfig
    /// for AAC. May be empty until the container has seen in-band data.
    pub extradata: Bytes,
    /// Picture width, 0 until known.
    pub width: u32,
    /// Picture height, 0 until known.
    pub height: u32,
    /// Codec profile: `profile_idc` for video, object type for AAC.
    pub profile: u8,
    /// Codec level, video only.
    pub level: u8,
    /// Audio sampling rate in Hz.
    pub sample_rate: u32,
    /// Audio channel count.
    pub channels: u8,
    /// Unit of the stream's packet timestamps.
    pub time_base: TimeBase,
    /// Protection declared for the stream, if any.
    pub protection: Option<ProtectionInfo>,
}

impl CodecParameters {
    /// Parameters of an as yet undescribed stream of `codec`.
    pub fn new(codec: CodecType) -> Self {
        Self {
            codec,
            extradata: Bytes::new(),
            width: 0,
            height: 0,
            profile: 0,
            level: 0,
            sample_rate: 0,
            channels: 0,
            time_base: TimeBase::default(),
            protection: None,
        }
    }

    /// Audio or video.
    pub fn stream_type(&self) -> StreamType {
        self.codec.stream_type()
    }
}

/// One stream of a discovered layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEntry {
    /// Index used by [`ContainerPacket::stream_index`].
    pub index: usize,
    /// Codec of the stream.
    pub codec: CodecType,
}

/// Streams found by probing: at most one video and at most one audio stream
/// are selected for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamLayout {
    /// Streams in container order.
    pub streams: Vec<StreamEntry>,
}

impl StreamLayout {
    /// Index of the first stream of `stream_type`.
    pub fn first_of(&self, stream_type: StreamType) -> Option<usize> {
        self.streams
            .iter()
            .find(|s| s.codec.stream_type() == stream_type)
            .map(|s| s.index)
    }

    /// The selected video stream.
    pub fn video(&self) -> Option<usize> {
        self.first_of(StreamType::Video)
    }

    /// The selected audio stream.
    pub fn audio(&self) -> Option<usize> {
        self.first_of(StreamType::Audio)
    }

    /// True when no supported stream was found.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// A container-level packet, timestamps still in container ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerPacket {
    /// Index into the layout.
    pub stream_index: usize,
    /// Access unit or audio frame.
    pub data: Bytes,
    /// Presentation time in container ticks.
    pub pts: Option<i64>,
    /// Decode time in container ticks.
    pub dts: Option<i64>,
    /// Duration in container ticks, 0 when unknown.
    pub duration: i64,
    /// Starts a decodable sequence.
    pub is_key: bool,
    /// Per-sample encryption, when the container carries it.
    pub encryption: Option<EncryptionInfo>,
}

impl ContainerPacket {
    /// Packet with no timing, not a key frame.
    pub fn new(stream_index: usize, data: impl Into<Bytes>) -> Self {
        Self {
            stream_index,
            data: data.into(),
            pts: None,
            dts: None,
            duration: 0,
            is_key: false,
            encryption: None,
        }
    }
}

/// Pull-based container parser driven by the parsing worker.
///
/// Every method runs on the worker thread. `NeedMoreData` results leave the
/// parser resumable: the same call is repeated once more bytes are available.
pub trait ContainerParser: Send {
    /// Binds the parser to its byte source.
    fn open(&mut self, source: Box<dyn ByteSource>) -> Result<()>;

    /// Discovers the stream layout, reading at most `probe_size` bytes.
    fn find_stream_info(&mut self, probe_size: usize) -> Result<Progress<StreamLayout>>;

    /// Next packet; `Ready(None)` marks end of stream.
    fn read_packet(&mut self) -> Result<Progress<Option<ContainerPacket>>>;

    /// Codec description of stream `index`, if it exists.
    fn stream_parameters(&self, index: usize) -> Option<&CodecParameters>;

    /// The layout found by the last successful probe.
    fn layout(&self) -> Option<&StreamLayout>;
}

/// Builds a fresh container; the worker creates a new one after every flush.
pub type ContainerFactory = Arc<dyn Fn() -> Box<dyn ContainerParser> + Send + Sync>;

impl fmt::Debug for dyn ContainerParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerParser")
            .field("layout", &self.layout())
            .finish()
    }
}
