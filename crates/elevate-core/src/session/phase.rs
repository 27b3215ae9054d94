//! Executor lifecycle state machine.
//!
//! All three platform executors drive the same strictly sequential phase
//! sequence:
//!
//! ```text
//! Initializing ──► ArtifactsStaged ──► Elevating ──► AwaitingCompletion ──► Completed
//!       │                 │                │                  │
//!       └─────────────────┴────────────────┴──────────────────┴──────────► Failed
//! ```
//!
//! The only intra-phase retries are the Linux helper probing (within
//! `Initializing`) and the Windows status-file polling (within
//! `AwaitingCompletion`). An out-of-order advance indicates a logic error
//! and is reported as [`ElevationError::Internal`].

use std::fmt;

use crate::error::{ElevationError, ElevationResult};

/// Phases of one elevation session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Probing the environment and deriving paths.
    Initializing,
    /// Ephemeral scripts/bundles are on disk (or composed, on Linux).
    ArtifactsStaged,
    /// The native prompt mechanism has been launched.
    Elevating,
    /// Waiting for the platform's completion signal.
    AwaitingCompletion,
    /// A classified result was produced.
    Completed,
    /// The session ended in a classified error.
    Failed,
}

impl Phase {
    /// Phase name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::ArtifactsStaged => "ArtifactsStaged",
            Self::Elevating => "Elevating",
            Self::AwaitingCompletion => "AwaitingCompletion",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::ArtifactsStaged)
                | (Self::ArtifactsStaged, Self::Elevating)
                | (Self::Elevating, Self::AwaitingCompletion)
                | (Self::AwaitingCompletion, Self::Completed)
                | (
                    Self::Initializing | Self::ArtifactsStaged | Self::Elevating
                        | Self::AwaitingCompletion,
                    Self::Failed,
                )
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current phase of one session and rejects illegal advances.
#[derive(Debug)]
pub struct PhaseTracker {
    current: Phase,
}

impl PhaseTracker {
    /// Starts a tracker in [`Phase::Initializing`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Phase::Initializing,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn current(&self) -> Phase {
        self.current
    }

    /// Advances to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::Internal`] when `next` is not the legal
    /// successor of the current phase.
    pub fn advance(&mut self, next: Phase) -> ElevationResult<()> {
        if !self.current.can_advance_to(next) {
            return Err(ElevationError::internal(format!(
                "invalid phase transition from {} to {next}",
                self.current
            )));
        }
        tracing::trace!(from = %self.current, to = %next, "session phase advance");
        self.current = next;
        Ok(())
    }

    /// Marks the session failed, from any non-terminal phase.
    pub fn fail(&mut self) {
        if !matches!(self.current, Phase::Completed | Phase::Failed) {
            tracing::trace!(from = %self.current, "session phase failed");
            self.current = Phase::Failed;
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sequence() {
        let mut tracker = PhaseTracker::new();
        for phase in [
            Phase::ArtifactsStaged,
            Phase::Elevating,
            Phase::AwaitingCompletion,
            Phase::Completed,
        ] {
            tracker.advance(phase).unwrap();
            assert_eq!(tracker.current(), phase);
        }
    }

    #[test]
    fn test_rejects_skipped_phase() {
        let mut tracker = PhaseTracker::new();
        let err = tracker.advance(Phase::Elevating).unwrap_err();
        assert!(matches!(err, ElevationError::Internal { .. }));
        assert_eq!(tracker.current(), Phase::Initializing);
    }

    #[test]
    fn test_rejects_backward_transition() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(Phase::ArtifactsStaged).unwrap();
        assert!(tracker.advance(Phase::ArtifactsStaged).is_err());
    }

    #[test]
    fn test_fail_from_any_active_phase() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(Phase::ArtifactsStaged).unwrap();
        tracker.fail();
        assert_eq!(tracker.current(), Phase::Failed);

        // Failing again is a no-op, not an error.
        tracker.fail();
        assert_eq!(tracker.current(), Phase::Failed);
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(Phase::ArtifactsStaged).unwrap();
        tracker.advance(Phase::Elevating).unwrap();
        tracker.advance(Phase::AwaitingCompletion).unwrap();
        tracker.advance(Phase::Completed).unwrap();
        assert!(tracker.advance(Phase::Failed).is_err());
    }
}
