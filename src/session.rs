//! On-disk staging of layer images between preview and finalize.
//!
//! Each session owns one directory under a shared root, named by its UUID.
//! Staged files are addressed by `(session, role)` only, so a reference can
//! cross an untrusted boundary without carrying a path.

use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layer::LayerRole;

#[derive(thiserror::Error, Debug)]
pub enum StagingError {
    /// The session or file no longer exists.
    #[error("staged file not found: {0}")]
    NotFound(String),

    /// The reference itself is not well formed.
    #[error("malformed staging reference: {0}")]
    Malformed(String),

    /// The reference resolved to a file outside its session directory.
    #[error("staging reference escapes its session: {0}")]
    OutsideSession(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

// ============================================================================
// SessionId / StagedRef
// ============================================================================

/// Opaque, collision-resistant session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = StagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| StagingError::Malformed(format!("invalid session id {s:?}")))
    }
}

/// Pointer to one staged layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedRef {
    pub session_id: SessionId,
    pub role: LayerRole,
}

/// Lifecycle state of a session as seen from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Directory exists, nothing staged yet.
    Created,
    /// At least one layer is staged.
    Staged,
    /// No directory: destroyed, expired, or never created.
    Destroyed,
}

// ============================================================================
// SessionStore
// ============================================================================

/// Manages session staging directories under a single root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a fresh session with its own empty directory.
    pub fn create_session(&self) -> Result<SessionId, StagingError> {
        // A v4 collision is practically impossible; retry once regardless.
        for _ in 0..2 {
            let id = SessionId::generate();
            match fs::create_dir(self.session_dir(id)) {
                Ok(()) => {
                    tracing::debug!(session = %id, "created staging session");
                    return Ok(id);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StagingError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique session directory",
        )))
    }

    /// Writes `bytes` as the staged image for `role`.
    ///
    /// The file is written beside its final name and renamed into place, so
    /// a concurrent `resolve` never sees a partial image.
    pub fn stage(
        &self,
        session: SessionId,
        role: LayerRole,
        bytes: &[u8],
    ) -> Result<StagedRef, StagingError> {
        let dir = self.session_dir(session);
        if !dir.is_dir() {
            return Err(StagingError::NotFound(format!("session {session}")));
        }
        let final_path = dir.join(file_name(role));
        let partial_path = dir.join(format!(".{}.partial", file_name(role)));
        fs::write(&partial_path, bytes)?;
        fs::rename(&partial_path, &final_path)?;

        tracing::debug!(session = %session, %role, bytes = bytes.len(), "staged layer");
        Ok(StagedRef {
            session_id: session,
            role,
        })
    }

    /// Reads a staged image.
    ///
    /// A missing session or file is [`StagingError::NotFound`]; a file that
    /// resolves outside the session directory is rejected.
    pub fn resolve(&self, reference: &StagedRef) -> Result<Vec<u8>, StagingError> {
        let dir = self.session_dir(reference.session_id);
        let path = dir.join(file_name(reference.role));
        let not_found = || {
            StagingError::NotFound(format!(
                "{} of session {}",
                reference.role, reference.session_id
            ))
        };

        let lookup = |p: &Path| {
            fs::canonicalize(p).map_err(|e| match e.kind() {
                ErrorKind::NotFound => not_found(),
                _ => StagingError::Io(e),
            })
        };

        let canonical_dir = lookup(&dir)?;
        let canonical_file = lookup(&path)?;
        if !canonical_file.starts_with(&canonical_dir) {
            return Err(StagingError::OutsideSession(format!(
                "{} of session {}",
                reference.role, reference.session_id
            )));
        }

        match fs::read(&canonical_file) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a session and everything staged in it.
    ///
    /// Destroying a missing session is not an error.
    pub fn destroy(&self, session: SessionId) -> Result<(), StagingError> {
        match fs::remove_dir_all(self.session_dir(session)) {
            Ok(()) => {
                tracing::debug!(session = %session, "destroyed staging session");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn state(&self, session: SessionId) -> SessionState {
        let dir = self.session_dir(session);
        if !dir.is_dir() {
            return SessionState::Destroyed;
        }
        let staged = LayerRole::ALL
            .iter()
            .any(|role| dir.join(file_name(*role)).is_file());
        if staged {
            SessionState::Staged
        } else {
            SessionState::Created
        }
    }

    fn session_dir(&self, session: SessionId) -> PathBuf {
        self.root.join(session.to_string())
    }
}

fn file_name(role: LayerRole) -> String {
    format!("{}.png", role.key())
}

// ============================================================================
// Tests
// ============================================================================
