//! Elevation session lifecycle and filesystem ownership.
//!
//! A [`Session`] is the value object for one elevation request: the command
//! text, validated options, a unique identifier, and the private temp
//! subtree derived from it. Sessions execute independently end-to-end; no
//! shared mutable state exists between concurrent sessions, and isolation
//! is guaranteed solely by the per-session directory.

pub mod id;
pub mod phase;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use id::{SessionId, SESSION_ID_LEN};
pub use phase::{Phase, PhaseTracker};

use crate::error::{ElevationError, ElevationResult};
use crate::options::ValidatedOptions;

/// What happens to the session's temp subtree after result collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Remove the subtree after the result (or classified error) is
    /// collected. Best-effort; a failed removal is logged, not surfaced.
    #[default]
    Remove,
    /// Keep the subtree on disk for debugging.
    Retain,
}

/// One elevation request from staging through result collection.
#[derive(Debug, Clone)]
pub struct Session {
    command: String,
    options: ValidatedOptions,
    id: SessionId,
    root: PathBuf,
    retention: Retention,
}

impl Session {
    /// Builds a session rooted under the system temp directory with the
    /// default retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Internal`] if the command is prefixed with
    /// `sudo` (the prompt mechanism supplies elevation itself) or if
    /// identifier generation fails.
    pub fn build(command: &str, options: ValidatedOptions) -> ElevationResult<Self> {
        Self::build_in(std::env::temp_dir(), command, options, Retention::default())
    }

    /// Builds a session rooted under `temp_root` with an explicit retention
    /// policy.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Session::build`].
    pub fn build_in(
        temp_root: PathBuf,
        command: &str,
        options: ValidatedOptions,
        retention: Retention,
    ) -> ElevationResult<Self> {
        if command.trim_start().to_ascii_lowercase().starts_with("sudo") {
            return Err(ElevationError::internal(
                "command must not be prefixed with \"sudo\"",
            ));
        }
        let id = SessionId::generate(options.name(), command)?;
        let root = temp_root.join(id.as_str());
        Ok(Self {
            command: command.to_string(),
            options,
            id,
            root,
            retention,
        })
    }

    /// The command text to run elevated.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Validated request options.
    #[must_use]
    pub fn options(&self) -> &ValidatedOptions {
        &self.options
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Root of the session's private temp subtree (`<temp_root>/<id>`).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Retention policy for the temp subtree.
    #[must_use]
    pub const fn retention(&self) -> Retention {
        self.retention
    }

    /// Creates the session root directory.
    ///
    /// # Errors
    ///
    /// An already-existing root means two sessions collided on an
    /// identifier, which the entropy width makes practically impossible;
    /// it is surfaced as [`ElevationError::Internal`] rather than reused.
    pub(crate) async fn create_root(&self) -> ElevationResult<()> {
        match tokio::fs::create_dir_all(self.root.parent().unwrap_or(&self.root)).await {
            Ok(()) => {},
            Err(err) => return Err(ElevationError::internal(err.to_string())),
        }
        match tokio::fs::create_dir(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ElevationError::internal(format!(
                    "session directory already exists: {}",
                    self.root.display()
                )))
            },
            Err(err) => Err(ElevationError::internal(err.to_string())),
        }
    }

    /// Applies the retention policy after result collection.
    pub(crate) async fn cleanup(&self) {
        if self.retention == Retention::Retain {
            tracing::debug!(root = %self.root.display(), "retaining session directory");
            return;
        }
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {},
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => {
                tracing::warn!(
                    root = %self.root.display(),
                    error = %err,
                    "failed to remove session directory"
                );
            },
        }
    }
}
