//! Annex-B NAL unit framing and parameter-set collection.

use bytes::Bytes;

use crate::av::VideoCodec;

pub(crate) const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Splits an Annex-B byte stream into NAL units (start codes stripped).
///
/// Bytes before the first start code are ignored. Trailing zero bytes that
/// belong to a four-byte start code are not part of the preceding unit.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(s) = start {
                let mut end = i;
                while end > s && data[end - 1] == 0 {
                    end -= 1;
                }
                if end > s {
                    units.push(&data[s..end]);
                }
            }
            i += 3;
            start = Some(i);
            continue;
        }
        i += 1;
    }

    if let Some(s) = start {
        if s < data.len() {
            units.push(&data[s..]);
        }
    }

    units
}

/// Whether `data` begins with a three or four byte start code.
pub fn has_start_code(data: &[u8]) -> bool {
    data.starts_with(&[0x00, 0x00, 0x01]) || data.starts_with(&START_CODE)
}

/// Joins NAL units into an Annex-B run with four-byte start codes.
pub fn join_annex_b<T: AsRef<[u8]>>(units: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(units.iter().map(|u| u.as_ref().len() + 4).sum());
    for unit in units {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(unit.as_ref());
    }
    out
}

/// Strips emulation prevention bytes (`00 00 03` becomes `00 00`).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// NAL unit type of the unit starting with `header`, for the given codec.
pub fn nal_unit_type(codec: VideoCodec, header: u8) -> u8 {
    match codec {
        VideoCodec::H264 => header & 0x1F,
        VideoCodec::H265 => (header >> 1) & 0x3F,
    }
}

/// The parameter sets a decoder needs before the first key frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    /// H.265 only.
    pub vps: Vec<Bytes>,
    /// Sequence parameter sets, in order of appearance.
    pub sps: Vec<Bytes>,
    /// Picture parameter sets, in order of appearance.
    pub pps: Vec<Bytes>,
}

impl ParameterSets {
    /// True when no parameter set of any kind has been collected.
    pub fn is_empty(&self) -> bool {
        self.vps.is_empty() && self.sps.is_empty() && self.pps.is_empty()
    }

    /// True when enough is present to configure a decoder.
    pub fn is_complete(&self, codec: VideoCodec) -> bool {
        let base = !self.sps.is_empty() && !self.pps.is_empty();
        match codec {
            VideoCodec::H264 => base,
            VideoCodec::H265 => base && !self.vps.is_empty(),
        }
    }

    /// Collects in-band parameter sets from an Annex-B access unit.
    pub fn from_annex_b(codec: VideoCodec, data: &[u8]) -> Self {
        let mut sets = ParameterSets::default();
        for unit in split_annex_b(data) {
            sets.push_unit(codec, unit);
        }
        sets
    }

    /// Files one NAL unit under its parameter-set kind; other units are ignored.
    pub fn push_unit(&mut self, codec: VideoCodec, unit: &[u8]) {
        let Some(&header) = unit.first() else {
            return;
        };
        let slot = match (codec, nal_unit_type(codec, header)) {
            (VideoCodec::H264, 7) | (VideoCodec::H265, 33) => &mut self.sps,
            (VideoCodec::H264, 8) | (VideoCodec::H265, 34) => &mut self.pps,
            (VideoCodec::H265, 32) => &mut self.vps,
            _ => return,
        };
        if !slot.iter().any(|existing| existing.as_ref() == unit) {
            slot.push(Bytes::copy_from_slice(unit));
        }
    }

    /// Annex-B rendering in VPS, SPS, PPS order.
    pub fn to_annex_b(&self) -> Bytes {
        let units: Vec<&Bytes> = self
            .vps
            .iter()
            .chain(self.sps.iter())
            .chain(self.pps.iter())
            .collect();
        Bytes::from(join_annex_b(&units))
    }
}

/// Whether an Annex-B access unit contains an instantaneous decoder refresh.
pub fn contains_idr(codec: VideoCodec, data: &[u8]) -> bool {
    split_annex_b(data).iter().any(|unit| {
        unit.first().map_or(false, |&h| match codec {
            VideoCodec::H264 => nal_unit_type(codec, h) == 5,
            VideoCodec::H265 => matches!(nal_unit_type(codec, h), 16..=21),
        })
    })
}
