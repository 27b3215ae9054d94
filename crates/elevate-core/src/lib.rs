//! Run one command with elevated privileges via the native OS
//! authorization prompt.
//!
//! This crate brokers a single authorized execution: it stages whatever
//! ephemeral artifacts the host platform's privilege-prompt mechanism
//! needs, launches that mechanism, and reconciles its ambiguous signaling
//! into the wrapped command's `{stdout, stderr}` or a classified
//! [`ElevationError`]. It is not a sandbox and keeps no audit trail.
//!
//! # Platforms
//!
//! | OS | Mechanism | Denial signal |
//! |----|-----------|---------------|
//! | macOS | staged prompt-relay bundle | absent result files |
//! | Linux | kdesudo / pkexec + sentinel | missing stdout sentinel |
//! | Windows | `Start-Process -Verb runAs` + status polling | launcher failure |
//!
//! # Example
//!
//! ```no_run
//! use elevate_core::{execute, ElevationOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ElevationOptions::new("My App")
//!     .with_env_var("MODE", "install")
//!     .validate()?;
//! let output = execute("systemsetup -settimezone UTC", options).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```
//!
//! The executors are also usable directly when their knobs matter (helper
//! preference order, wait pacing, artifact retention); see
//! [`config::BrokerConfig`] for the configuration-file form of the same
//! knobs.

pub mod config;
pub mod error;
pub mod escape;
pub mod exec;
pub mod options;
pub mod session;
pub mod wait;

pub use config::{BrokerConfig, ConfigError};
pub use error::{ElevationError, ElevationResult};
pub use escape::{escape_cmd_meta, escape_double_quotes};
pub use exec::{Elevator, ExecOutput, LinuxExecutor, MacExecutor, WindowsExecutor};
pub use options::{ElevationOptions, OptionsError, ValidatedOptions};
pub use session::{Retention, Session, SessionId};
pub use wait::WaitConfig;

/// Runs one command elevated with default configuration, dispatching to
/// the executor for the compile-time target platform.
///
/// # Errors
///
/// Returns a classified [`ElevationError`]; see [`error`] for the
/// taxonomy shared by all platforms.
pub async fn execute(command: &str, options: ValidatedOptions) -> ElevationResult<ExecOutput> {
    let session = Session::build(command, options)?;
    exec::dispatch(&session).await
}
