//! Archive container boundary.
//!
//! The assembler decides what goes into a bundle and in which order; an
//! [`ArchiveWriter`] only knows how to encode the container.

use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("failed to add {path} to archive: {reason}")]
    Add { path: String, reason: String },

    #[error("failed to serialize archive: {0}")]
    Serialize(String),
}

/// Sink for the files of one bundle.
pub trait ArchiveWriter {
    /// Adds a file at `path` (forward-slash separated, relative).
    fn add(&mut self, path: &str, bytes: &[u8]) -> Result<(), ArchiveError>;

    /// Finishes the container and returns its bytes.
    fn finish(self) -> Result<Vec<u8>, ArchiveError>;
}

/// In-memory zip archive.
pub struct ZipArchiveWriter {
    zip: zip::ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl Default for ZipArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchiveWriter {
    pub fn new() -> Self {
        Self {
            zip: zip::ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn add(&mut self, path: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        let add_err = |reason: String| ArchiveError::Add {
            path: path.to_string(),
            reason,
        };
        self.zip
            .start_file(path, self.options)
            .map_err(|e| add_err(e.to_string()))?;
        self.zip.write_all(bytes).map_err(|e| add_err(e.to_string()))
    }

    fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| ArchiveError::Serialize(e.to_string()))
    }
}
