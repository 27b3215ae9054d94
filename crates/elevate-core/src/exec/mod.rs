//! Platform executors and dispatch.
//!
//! Each supported platform gets one executor implementing [`Elevator`]:
//! stage the ephemeral artifacts its native prompt mechanism needs, launch
//! that mechanism, and reconcile its platform-specific signaling into an
//! [`ExecOutput`] or a classified [`ElevationError`]. The protocols differ
//! because each platform's elevation tool hides failure differently:
//!
//! - macOS's relay leaves no trace on denial, so absent result files are
//!   the denial signal ([`macos`]).
//! - Linux helpers conflate denial with command failure in their exit
//!   codes, so a sentinel on stdout is the only trustworthy approval
//!   signal ([`linux`]).
//! - Windows's launcher cannot synchronously wait on every supported
//!   version, so completion is observed by polling a status artifact
//!   ([`windows`]).
//!
//! All three drive the session phase sequence described in
//! [`crate::session::phase`].

pub mod linux;
pub mod macos;
pub mod windows;

use async_trait::async_trait;

pub use linux::LinuxExecutor;
pub use macos::MacExecutor;
pub use windows::WindowsExecutor;

use crate::error::ElevationResult;
use crate::session::Session;

/// Captured output of a successfully elevated command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    /// The wrapped command's stdout.
    pub stdout: String,
    /// The wrapped command's stderr.
    pub stderr: String,
}

/// Contract shared by all platform executors.
///
/// One executor consumes one [`Session`]; retention of the session's temp
/// subtree is applied after result collection, on success and classified
/// failure alike.
#[async_trait]
pub trait Elevator {
    /// Runs the session's command elevated and returns its output.
    async fn elevate(&self, session: &Session) -> ElevationResult<ExecOutput>;
}

/// Runs the executor matching the compile-time target platform.
#[allow(unused_variables)]
pub(crate) async fn dispatch(session: &Session) -> ElevationResult<ExecOutput> {
    #[cfg(target_os = "macos")]
    {
        MacExecutor::new().elevate(session).await
    }
    #[cfg(target_os = "linux")]
    {
        LinuxExecutor::new().elevate(session).await
    }
    #[cfg(target_os = "windows")]
    {
        WindowsExecutor::new().elevate(session).await
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(crate::error::ElevationError::environment(
            "platform not supported",
        ))
    }
}
