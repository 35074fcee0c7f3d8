//! Error taxonomy for the bundling pipeline.
//!
//! Leaf modules report their own error types; everything that reaches a
//! caller is folded into [`BundleError`], which carries a stable code and a
//! client/server class so the boundary can map it to a response.

use crate::archive::ArchiveError;
use crate::codec::CodecError;
use crate::generate::SourceError;
use crate::session::StagingError;

pub type BundleResult<T> = Result<T, BundleError>;

/// Which party is responsible for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad request, or a request that must be regenerated.
    Client,
    /// Unrecoverable render or packaging failure.
    Server,
}

#[derive(thiserror::Error, Debug)]
pub enum BundleError {
    /// Missing mandatory field, malformed reference or invalid value.
    #[error("invalid input: {0}")]
    Input(String),

    /// A staged layer can no longer be resolved; the caller must regenerate.
    #[error("staged image expired, please regenerate: {0}")]
    StagingExpired(String),

    /// A mandatory layer could not be decoded, or packaging failed.
    #[error("asset assembly failed: {0}")]
    Assembly(String),
}

impl BundleError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn staging_expired(msg: impl Into<String>) -> Self {
        Self::StagingExpired(msg.into())
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Input(_) => "invalid_input",
            Self::StagingExpired(_) => "staging_expired",
            Self::Assembly(_) => "assembly_failed",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Input(_) | Self::StagingExpired(_) => ErrorClass::Client,
            Self::Assembly(_) => ErrorClass::Server,
        }
    }
}

impl From<StagingError> for BundleError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::NotFound(_) => Self::StagingExpired(err.to_string()),
            StagingError::Malformed(_) | StagingError::OutsideSession(_) => {
                Self::Input(err.to_string())
            }
            StagingError::Io(_) => Self::Assembly(err.to_string()),
        }
    }
}

impl From<ArchiveError> for BundleError {
    fn from(err: ArchiveError) -> Self {
        Self::Assembly(err.to_string())
    }
}

impl From<CodecError> for BundleError {
    fn from(err: CodecError) -> Self {
        Self::Assembly(err.to_string())
    }
}

impl From<SourceError> for BundleError {
    fn from(err: SourceError) -> Self {
        Self::Assembly(err.to_string())
    }
}
