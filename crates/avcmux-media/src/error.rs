//! Error types for avcmux-media.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for avcmux-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which of the two in-band parameter sets an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSetKind {
    /// Sequence parameter set (NAL type 7).
    Sps,
    /// Picture parameter set (NAL type 8).
    Pps,
}

impl fmt::Display for ParameterSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sps => f.write_str("SPS"),
            Self::Pps => f.write_str("PPS"),
        }
    }
}

/// Error type for avcmux-media operations.
///
/// Every variant is terminal for the conversion it came from. [`Error::code`]
/// maps each one onto the negative result code handed back to host callers.
#[derive(Debug, Error)]
pub enum Error {
    /// A second SPS or PPS appeared after one was already captured.
    #[error("duplicate {0} in stream")]
    DuplicateParameterSet(ParameterSetKind),

    /// The stream ended without both parameter sets.
    #[error("missing parameter set (sps_len={sps_len}, pps_len={pps_len})")]
    MissingParameterSet { sps_len: usize, pps_len: usize },

    /// A growable buffer could not be enlarged.
    #[error("allocation failure while growing scan buffers")]
    Allocation,

    /// The source stream could not be opened.
    #[error("failed to open source {path:?}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination file could not be created.
    #[error("failed to create destination {path:?}: {source}")]
    DestinationOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing the container failed part-way.
    #[error("write error: {0}")]
    Write(#[source] io::Error),

    /// Caller-supplied geometry or rate is out of range.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A value does not fit the 32-bit (or 16-bit) field the container stores it in.
    #[error("too large: {0}")]
    TooLarge(String),

    /// Reading the source stream failed.
    #[error("read error: {0}")]
    Read(#[source] io::Error),

    /// A parameter set is present but unusable.
    #[error("invalid parameter set: {0}")]
    InvalidParameterSet(String),

    /// A produced file failed read-back.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),
}

impl Error {
    /// Result code reported to host callers. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            Self::DuplicateParameterSet(ParameterSetKind::Sps) => -1,
            Self::DuplicateParameterSet(ParameterSetKind::Pps) => -2,
            Self::MissingParameterSet { .. } => -3,
            Self::Allocation => -4,
            Self::SourceOpen { .. } => -5,
            Self::DestinationOpen { .. } => -6,
            Self::Write(_) => -7,
            Self::InvalidParameters(_) => -8,
            Self::TooLarge(_) => -9,
            Self::Read(_) => -10,
            Self::InvalidParameterSet(_) => -11,
            Self::InvalidMp4(_) => -12,
        }
    }

    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create a too-large error.
    pub fn too_large(msg: impl Into<String>) -> Self {
        Self::TooLarge(msg.into())
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::Allocation
    }
}
