//! Linux executor: sentinel protocol over an elevation helper.
//!
//! Helper tools return inconsistent, sometimes undocumented exit codes
//! that conflate "user declined" with "command failed". kdesudo offers no
//! way at all to tell them apart; pkexec documents 126/127 but localizes
//! its messages. The one unambiguous signal available is output the
//! elevated shell produces itself, so the composed invocation echoes a
//! fixed sentinel before the real command. Sentinel present means
//! elevation occurred; everything after it belongs to the command.
//!
//! No artifacts are persisted: the whole protocol is a single composed
//! shell line executed directly.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{ElevationError, ElevationResult};
use crate::escape::escape_double_quotes;
use crate::exec::{Elevator, ExecOutput};
use crate::session::{Phase, PhaseTracker, Session};

/// Marker emitted by the elevated shell before the real command's output.
pub const SENTINEL: &str = "ELEVATE_SENTINEL\n";

/// Per-stream capture cap; generous so chatty elevated commands survive.
pub const MAX_CAPTURE_BYTES: u64 = 128 * 1024 * 1024;

/// Default helper preference order.
pub const DEFAULT_HELPERS: [&str; 2] = ["/usr/bin/kdesudo", "/usr/bin/pkexec"];

/// Emitted on stderr by pkexec when no authentication agent is running.
/// Matched literally; pkexec does not localize this particular message.
const AGENT_MISSING_PATTERN: &str = "No authentication agent found";

/// Executor for Linux elevation helpers.
#[derive(Debug, Clone)]
pub struct LinuxExecutor {
    helpers: Vec<PathBuf>,
}

impl Default for LinuxExecutor {
    fn default() -> Self {
        Self {
            helpers: DEFAULT_HELPERS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl LinuxExecutor {
    /// Executor with the default helper preference order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor probing the given ordered helper list instead.
    #[must_use]
    pub fn with_helpers(helpers: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            helpers: helpers.into_iter().collect(),
        }
    }

    /// Returns the first helper on the list that exists.
    async fn probe_helper(&self) -> ElevationResult<PathBuf> {
        for helper in &self.helpers {
            if tokio::fs::metadata(helper).await.is_ok() {
                return Ok(helper.clone());
            }
        }
        Err(ElevationError::environment(
            "no supported elevation helper found",
        ))
    }

    /// Assembles the single shell invocation handed to `/bin/sh -c`.
    fn compose(session: &Session, helper: &Path) -> ElevationResult<String> {
        let cwd = std::env::current_dir()
            .map_err(|err| ElevationError::internal(format!("working directory: {err}")))?;

        let mut parts = Vec::new();
        parts.push(format!(
            "cd \"{}\";",
            escape_double_quotes(&cwd.to_string_lossy())
        ));
        for (key, value) in session.options().env() {
            parts.push(format!("export {key}=\"{}\";", escape_double_quotes(value)));
        }
        parts.push(format!(
            "\"{}\"",
            escape_double_quotes(&helper.to_string_lossy())
        ));

        let helper_name = helper
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if helper_name.contains("kdesudo") {
            parts.push("--comment".to_string());
            parts.push(format!(
                "\"{} wants to make changes. Enter your password to allow this.\"",
                session.options().name()
            ));
            // Do not show the command to be run in the dialog.
            parts.push("-d".to_string());
            parts.push("--".to_string());
        } else if helper_name.contains("pkexec") {
            parts.push("--disable-internal-agent".to_string());
        }

        parts.push(format!(
            "/bin/bash -c \"echo {}; {}\"",
            escape_double_quotes(SENTINEL.trim_end()),
            escape_double_quotes(session.command())
        ));
        Ok(parts.join(" "))
    }

    /// Reconciles raw helper output into the uniform result.
    ///
    /// Once the sentinel is observed the result is success-shaped even when
    /// the wrapped command's own exit status is nonzero: the executor only
    /// certifies that elevation occurred, and callers inspect the returned
    /// streams for command-level failure.
    fn classify(
        stdout: String,
        stderr: String,
        success: bool,
        exit_code: Option<i32>,
    ) -> ElevationResult<ExecOutput> {
        if let Some(rest) = stdout.strip_prefix(SENTINEL) {
            return Ok(ExecOutput {
                stdout: rest.to_string(),
                stderr,
            });
        }
        if stderr.contains(AGENT_MISSING_PATTERN) {
            return Err(ElevationError::AgentMissing);
        }
        if !success {
            // Ambiguous between denial and a pre-command shell error; the
            // helper's exit code cannot distinguish the two.
            return Err(ElevationError::CommandFailed {
                exit_code: exit_code.unwrap_or(-1),
                stderr,
            });
        }
        Ok(ExecOutput { stdout, stderr })
    }

    async fn run(&self, session: &Session, phases: &mut PhaseTracker) -> ElevationResult<ExecOutput> {
        let helper = self.probe_helper().await?;
        let line = Self::compose(session, &helper)?;
        phases.advance(Phase::ArtifactsStaged)?;

        tracing::debug!(session = %session.id(), helper = %helper.display(), "launching elevation helper");
        phases.advance(Phase::Elevating)?;
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ElevationError::internal("child stdout not captured"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ElevationError::internal("child stderr not captured"))?;

        phases.advance(Phase::AwaitingCompletion)?;
        let (stdout, stderr) = tokio::join!(read_capped(stdout_pipe), read_capped(stderr_pipe));
        let status = child.wait().await?;

        let result = Self::classify(
            String::from_utf8_lossy(&stdout?).into_owned(),
            String::from_utf8_lossy(&stderr?).into_owned(),
            status.success(),
            status.code(),
        );
        if result.is_ok() {
            phases.advance(Phase::Completed)?;
        }
        result
    }
}

#[async_trait]
impl Elevator for LinuxExecutor {
    async fn elevate(&self, session: &Session) -> ElevationResult<ExecOutput> {
        let mut phases = PhaseTracker::new();
        let result = self.run(session, &mut phases).await;
        if let Err(err) = &result {
            phases.fail();
            tracing::warn!(session = %session.id(), error = %err, "elevation failed");
        }
        session.cleanup().await;
        result
    }
}

/// Reads a stream to the end, capped at [`MAX_CAPTURE_BYTES`].
async fn read_capped<R>(reader: R) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.take(MAX_CAPTURE_BYTES).read_to_end(&mut buf).await?;
    Ok(buf)
}
