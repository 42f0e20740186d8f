//! AAC framing: ADTS headers and the AudioSpecificConfig.

/// ADTS header parsing and frame splitting
pub mod parser;
/// AAC config and header types
pub mod types;

pub use parser::{prepend_adts_header, AACParser, AdtsRun};
pub use types::*;
