use crate::{DemuxError, Result};

/// Values substituted into a SegmentTemplate `media` or `initialization`
/// attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateValues<'a> {
    /// Substituted for `$RepresentationID$`.
    pub representation_id: &'a str,
    /// Substituted for `$Number$`.
    pub number: Option<u64>,
    /// Substituted for `$Bandwidth$`.
    pub bandwidth: Option<u64>,
    /// Substituted for `$Time$`, in timescale ticks.
    pub time: Option<u64>,
}

/// Expands `$RepresentationID$`, `$Number$`, `$Bandwidth$`, `$Time$` and
/// `$$`. The numeric identifiers take an optional `%0<width>d` format tag,
/// as in `$Number%05d$`.
pub fn expand(template: &str, values: &TemplateValues<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('$').ok_or_else(|| {
            DemuxError::InvalidData(format!("unterminated identifier in template {:?}", template))
        })?;
        let identifier = &after[..end];
        rest = &after[end + 1..];

        if identifier.is_empty() {
            out.push('$');
            continue;
        }
        if identifier == "RepresentationID" {
            out.push_str(values.representation_id);
            continue;
        }

        let (name, width) = match identifier.find('%') {
            Some(pos) => (&identifier[..pos], Some(parse_width(&identifier[pos..])?)),
            None => (identifier, None),
        };
        let value = match name {
            "Number" => values.number,
            "Bandwidth" => values.bandwidth,
            "Time" => values.time,
            _ => {
                return Err(DemuxError::InvalidData(format!(
                    "unknown template identifier ${}$",
                    identifier
                )))
            }
        }
        .ok_or_else(|| DemuxError::InvalidData(format!("no value for ${}$", name)))?;

        match width {
            Some(width) => out.push_str(&format!("{:0width$}", value, width = width)),
            None => out.push_str(&value.to_string()),
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Parses a `%0<width>d` format tag.
fn parse_width(tag: &str) -> Result<usize> {
    let digits = tag
        .strip_prefix('%')
        .and_then(|t| t.strip_suffix('d'))
        .ok_or_else(|| DemuxError::InvalidData(format!("bad format tag {:?}", tag)))?;
    let digits = digits.strip_prefix('0').unwrap_or(digits);
    if digits.is_empty() {
        return Ok(1);
    }
    digits
        .parse()
        .map_err(|_| DemuxError::InvalidData(format!("bad format tag {:?}", tag)))
}
