// Conversion errors
// Fatal configuration and layout failures plus per-record skip reasons.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the conversion engine.
///
/// The first three are fatal for a run; the rest describe why a single
/// record was not written and never stop the batch.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("required configuration file not found: {}", path.display())]
    ConfigurationMissing { path: PathBuf },

    #[error("configuration file {} is invalid: {message}", path.display())]
    ConfigurationInvalid { path: PathBuf, message: String },

    #[error("'Blocks' directory not found in {}, please work within the standard game filesystem", path.display())]
    SourceLayoutInvalid { path: PathBuf },

    #[error("{}: {message}", path.display())]
    RecordIo { path: PathBuf, message: String },

    #[error("contains no convertible blocks or items")]
    NoConvertibleContent,

    #[error("invalid blocks ({kept} of {total} kept)")]
    PartiallyInvalidRecord { kept: usize, total: usize },
}

impl ConvertError {
    pub fn record_io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ConvertError::RecordIo {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error should abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConvertError::ConfigurationMissing { .. }
                | ConvertError::ConfigurationInvalid { .. }
                | ConvertError::SourceLayoutInvalid { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
