use std::num::ParseIntError;
use thiserror::Error;

/// Errors produced by the demultiplexing pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// The container could not bind to the byte source.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// Stream layout could not be discovered within the probe budget.
    #[error("probe incomplete: {0}")]
    ProbeIncomplete(String),

    /// Structural corruption the container could not resynchronize past.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// In-band parameter extraction failed for one packet.
    #[error("parameter extraction degraded: {0}")]
    ExtractionDegraded(String),

    /// The parsing worker thread could not be spawned.
    #[error("worker thread could not be started: {0}")]
    ThreadStartFailed(String),

    /// The demuxer has been closed.
    #[error("demuxer is closed")]
    Closed,

    /// A lifecycle call was made in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Bit-level decoding error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Malformed input outside of the container grammar.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Configuration loading or initialization error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O failure, such as an unreadable config file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A numeric config override did not parse.
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// Coarse classification of a [`DemuxError`], used to decide on recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`DemuxError::OpenFailed`].
    OpenFailed,
    /// See [`DemuxError::ProbeIncomplete`].
    ProbeIncomplete,
    /// Container corruption or an undecodable bitstream.
    ParseFailed,
    /// See [`DemuxError::ExtractionDegraded`].
    ExtractionDegraded,
    /// See [`DemuxError::ThreadStartFailed`].
    ThreadStartFailed,
    /// The demuxer was used after `close`.
    Closed,
    /// See [`DemuxError::InvalidState`].
    InvalidState,
    /// See [`DemuxError::InvalidData`].
    InvalidData,
    /// Bad configuration, including unparseable overrides.
    Config,
    /// I/O failure.
    Io,
}

impl DemuxError {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DemuxError::OpenFailed(_) => ErrorKind::OpenFailed,
            DemuxError::ProbeIncomplete(_) => ErrorKind::ProbeIncomplete,
            DemuxError::ParseFailed(_) | DemuxError::Codec(_) => ErrorKind::ParseFailed,
            DemuxError::ExtractionDegraded(_) => ErrorKind::ExtractionDegraded,
            DemuxError::ThreadStartFailed(_) => ErrorKind::ThreadStartFailed,
            DemuxError::Closed => ErrorKind::Closed,
            DemuxError::InvalidState(_) => ErrorKind::InvalidState,
            DemuxError::InvalidData(_) => ErrorKind::InvalidData,
            DemuxError::Config(_) | DemuxError::ParseInt(_) => ErrorKind::Config,
            DemuxError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error ends the demuxer instance when raised by the worker.
    ///
    /// Only `ExtractionDegraded` is tolerated; everything else that reaches the
    /// worker loop terminates it with a single error message.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::ExtractionDegraded)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DemuxError>;
