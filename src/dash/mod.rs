//! # DASH segment addressing
//!
//! Resolves the media segments of a representation described by a
//! `<SegmentTemplate>` with a fixed `duration`. The player fetches the
//! segments and feeds their bytes to a [`crate::demuxer::Demuxer`].
//!
//! ```rust
//! use esdemux::dash::{RepresentationDescription, SegmentTemplate, SegmentTemplateSequence};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let desc = RepresentationDescription {
//!     base_url: Url::parse("https://example.com/live/")?,
//!     id: "audio-en".into(),
//!     bandwidth: 128_000,
//!     template: SegmentTemplate::new("$RepresentationID$-$Number$.ts").with_duration(4, 1),
//!     period_duration: Some(60.0),
//! };
//! let sequence = SegmentTemplateSequence::new(&desc)?;
//! let segment = sequence.media_segment_for_time(10.0).get()?;
//! assert_eq!(segment.url.as_str(), "https://example.com/live/audio-en-3.ts");
//! # Ok(())
//! # }
//! ```

mod sequence;
mod template;

pub use sequence::{
    RepresentationDescription, Segment, SegmentCursor, SegmentTemplate, SegmentTemplateSequence,
    Segments,
};
pub use template::{expand, TemplateValues};
