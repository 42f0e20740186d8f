use url::Url;

use super::template::{expand, TemplateValues};
use crate::{DemuxError, Result};

/// The `<SegmentTemplate>` attributes of one representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTemplate {
    /// `media` template.
    pub media: String,
    /// `initialization` template.
    pub initialization: Option<String>,
    /// Ticks per second of `duration`.
    pub timescale: u32,
    /// Segment duration in `timescale` ticks.
    pub duration: Option<u64>,
    /// `$Number$` of the first segment.
    pub start_number: u32,
}

impl SegmentTemplate {
    /// Template for `media`, timescale 1, first number 1.
    pub fn new(media: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            initialization: None,
            timescale: 1,
            duration: None,
            start_number: 1,
        }
    }

    /// Sets the `initialization` template.
    pub fn with_initialization(mut self, initialization: impl Into<String>) -> Self {
        self.initialization = Some(initialization.into());
        self
    }

    /// Sets a fixed segment duration in `timescale` ticks.
    pub fn with_duration(mut self, duration: u64, timescale: u32) -> Self {
        self.duration = Some(duration);
        self.timescale = timescale;
        self
    }

    /// Sets `startNumber`.
    pub fn with_start_number(mut self, start_number: u32) -> Self {
        self.start_number = start_number;
        self
    }
}

/// What the sequence needs to know about a representation.
#[derive(Debug, Clone)]
pub struct RepresentationDescription {
    /// URL segment templates resolve against.
    pub base_url: Url,
    /// `Representation@id`.
    pub id: String,
    /// `Representation@bandwidth` in bits per second.
    pub bandwidth: u64,
    /// Segment addressing of the representation.
    pub template: SegmentTemplate,
    /// Length of the period in seconds; `None` for an open-ended stream.
    pub period_duration: Option<f64>,
}

/// One addressable segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Absolute segment URL.
    pub url: Url,
    /// `$Number$` of a media segment; `None` for the init segment.
    pub number: Option<u64>,
    /// Start on the period timeline, in seconds.
    pub timestamp: f64,
    /// Seconds.
    pub duration: f64,
}

/// Media segments of a representation addressed by a `<SegmentTemplate>`
/// with a fixed duration. `<SegmentTimeline>` is not supported.
#[derive(Debug, Clone)]
pub struct SegmentTemplateSequence {
    base_url: Url,
    representation_id: String,
    bandwidth: u64,
    template: SegmentTemplate,
    start_number: u64,
    /// Number of segments, or `None` when the period has no known end.
    count: Option<u64>,
    segment_duration: f64,
}

impl SegmentTemplateSequence {
    /// Builds the sequence. Fails without a positive fixed duration.
    pub fn new(desc: &RepresentationDescription) -> Result<Self> {
        let template = &desc.template;
        let duration = template.duration.ok_or_else(|| {
            DemuxError::InvalidData("SegmentTemplate without a duration".into())
        })?;
        if duration == 0 || template.timescale == 0 {
            return Err(DemuxError::InvalidData(
                "SegmentTemplate duration and timescale must be positive".into(),
            ));
        }
        let segment_duration = duration as f64 / template.timescale as f64;

        let count = desc
            .period_duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| (d / segment_duration).ceil() as u64);

        Ok(Self {
            base_url: desc.base_url.clone(),
            representation_id: desc.id.clone(),
            bandwidth: desc.bandwidth,
            template: template.clone(),
            start_number: template.start_number as u64,
            count,
            segment_duration,
        })
    }

    /// The first segment.
    pub fn begin(&self) -> SegmentCursor<'_> {
        SegmentCursor {
            sequence: self,
            index: 0,
        }
    }

    /// One past the last segment. For an open-ended sequence this is a
    /// sentinel that iteration never reaches.
    pub fn end(&self) -> SegmentCursor<'_> {
        SegmentCursor {
            sequence: self,
            index: self.end_index(),
        }
    }

    fn end_index(&self) -> u64 {
        self.count.unwrap_or(u64::MAX)
    }

    /// The segment covering `time` seconds, or [`Self::end`] when `time`
    /// lies outside the period.
    pub fn media_segment_for_time(&self, time: f64) -> SegmentCursor<'_> {
        if !time.is_finite() || time < 0.0 {
            return self.end();
        }
        // saturates for absurdly large times, which lands on the end sentinel
        let index = (time / self.segment_duration).floor() as u64;
        if index >= self.end_index() {
            return self.end();
        }
        SegmentCursor {
            sequence: self,
            index,
        }
    }

    /// The initialization segment, when the template names one.
    pub fn init_segment(&self) -> Result<Option<Segment>> {
        let Some(initialization) = &self.template.initialization else {
            return Ok(None);
        };
        let values = TemplateValues {
            representation_id: &self.representation_id,
            bandwidth: Some(self.bandwidth),
            ..TemplateValues::default()
        };
        let url = self.resolve(&expand(initialization, &values)?)?;
        Ok(Some(Segment {
            url,
            number: None,
            timestamp: 0.0,
            duration: 0.0,
        }))
    }

    /// Seconds per segment.
    pub fn average_segment_duration(&self) -> f64 {
        self.segment_duration
    }

    /// Segment count; `None` when open-ended.
    pub fn len(&self) -> Option<u64> {
        self.count
    }

    /// True for a bounded sequence without segments.
    pub fn is_empty(&self) -> bool {
        self.count == Some(0)
    }

    /// Iterates over every segment from the first. Endless for an
    /// open-ended sequence.
    pub fn segments(&self) -> Segments<'_> {
        Segments { cursor: self.begin() }
    }

    fn timestamp(&self, index: u64) -> f64 {
        index as f64 * self.segment_duration
    }

    fn media_segment(&self, index: u64) -> Result<Segment> {
        let number = self.start_number.checked_add(index).ok_or_else(|| {
            DemuxError::InvalidData(format!("segment number overflows at index {}", index))
        })?;
        let time = match self.template.duration {
            Some(d) => Some(d.checked_mul(index).ok_or_else(|| {
                DemuxError::InvalidData(format!("segment time overflows at index {}", index))
            })?),
            None => None,
        };
        let values = TemplateValues {
            representation_id: &self.representation_id,
            number: Some(number),
            bandwidth: Some(self.bandwidth),
            time,
        };
        let url = self.resolve(&expand(&self.template.media, &values)?)?;
        Ok(Segment {
            url,
            number: Some(number),
            timestamp: self.timestamp(index),
            duration: self.segment_duration,
        })
    }

    fn resolve(&self, relative: &str) -> Result<Url> {
        self.base_url
            .join(relative)
            .map_err(|e| DemuxError::InvalidData(format!("bad segment URL {:?}: {}", relative, e)))
    }
}

/// Position in a [`SegmentTemplateSequence`].
#[derive(Debug, Clone, Copy)]
pub struct SegmentCursor<'a> {
    sequence: &'a SegmentTemplateSequence,
    index: u64,
}

impl<'a> SegmentCursor<'a> {
    /// True once past the last segment.
    pub fn is_end(&self) -> bool {
        self.index >= self.sequence.end_index()
    }

    /// Moves to the following segment.
    pub fn next_segment(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    /// Moves to the preceding segment, stopping at the first.
    pub fn prev_segment(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// The segment under the cursor. Fails at the end and when the segment
    /// number or `$Time$` value does not fit in 64 bits.
    pub fn get(&self) -> Result<Segment> {
        if self.is_end() {
            return Err(DemuxError::InvalidState("cursor is past the last segment".into()));
        }
        self.sequence.media_segment(self.index)
    }

    /// Seconds per segment.
    pub fn segment_duration(&self) -> f64 {
        self.sequence.segment_duration
    }

    /// Start of the segment under the cursor on the period timeline.
    pub fn segment_timestamp(&self) -> f64 {
        self.sequence.timestamp(self.index)
    }
}

impl PartialEq for SegmentCursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.sequence, other.sequence) && self.index == other.index
    }
}

/// Iterator returned by [`SegmentTemplateSequence::segments`].
pub struct Segments<'a> {
    cursor: SegmentCursor<'a>,
}

impl Iterator for Segments<'_> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_end() {
            return None;
        }
        let segment = self.cursor.get();
        self.cursor.next_segment();
        Some(segment)
    }
}
