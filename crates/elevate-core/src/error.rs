//! Error taxonomy for elevation requests.
//!
//! All three platform executors converge on the same five error kinds so
//! callers never need platform-specific handling. Low-level I/O errors are
//! surfaced unchanged inside [`ElevationError::Internal`] unless a platform
//! rule reclassifies them (for example, a missing result file after a macOS
//! launch becomes [`ElevationError::PermissionDenied`], because that is the
//! only observable signal of denial).

use thiserror::Error;

/// Result type for elevation operations.
pub type ElevationResult<T> = Result<T, ElevationError>;

/// Errors that can occur while brokering one elevated execution.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// The interactive user declined the authorization prompt.
    #[error("user did not grant permission")]
    PermissionDenied,

    /// Elevation was granted but the wrapped command exited nonzero.
    #[error("elevated command failed with exit code {exit_code}")]
    CommandFailed {
        /// Exit code reported for the wrapped command.
        exit_code: i32,
        /// Captured stderr of the wrapped command.
        stderr: String,
    },

    /// No authentication agent is available to present a prompt (Linux).
    #[error("no polkit authentication agent found")]
    AgentMissing,

    /// Required runtime context or helper binary is missing.
    #[error("environment error: {detail}")]
    Environment {
        /// What was missing or unusable.
        detail: String,
    },

    /// Unexpected I/O failure or invariant violation.
    #[error("internal error: {detail}")]
    Internal {
        /// Description of the failure.
        detail: String,
    },
}

impl ElevationError {
    /// Builds an [`ElevationError::Environment`] from any displayable detail.
    pub(crate) fn environment(detail: impl Into<String>) -> Self {
        Self::Environment {
            detail: detail.into(),
        }
    }

    /// Builds an [`ElevationError::Internal`] from any displayable detail.
    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }
}

impl From<std::io::Error> for ElevationError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ElevationError::PermissionDenied.to_string(),
            "user did not grant permission"
        );
        assert_eq!(
            ElevationError::AgentMissing.to_string(),
            "no polkit authentication agent found"
        );

        let err = ElevationError::CommandFailed {
            exit_code: 3,
            stderr: "boom".to_string(),
        };
        assert!(err.to_string().contains("exit code 3"));
    }

    #[test]
    fn test_io_error_maps_to_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied by fs");
        let err = ElevationError::from(io);
        match err {
            ElevationError::Internal { detail } => assert!(detail.contains("denied by fs")),
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
