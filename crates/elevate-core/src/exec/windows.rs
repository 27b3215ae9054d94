//! Windows executor: batch staging, UAC launch, status-file polling.
//!
//! The elevation-capable launcher (`Start-Process -Verb runAs`) cannot
//! synchronously wait for the elevated process on every supported Windows
//! version, and reports nothing when the user declines the UAC prompt.
//! Completion is therefore observed through files the elevated side writes
//! itself: an execute script redirects the command script's streams to
//! `stdout`/`stderr` files and records `%ERRORLEVEL%` in a `status` file,
//! which this side polls for.
//!
//! A second quirk: the launcher mis-handles certain characters in the
//! script path. When the session path contains one, the system command
//! interpreter is copied into the session directory and launched by
//! relative path, so the problematic path never crosses the launcher.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{ElevationError, ElevationResult};
use crate::escape::escape_cmd_meta;
use crate::exec::{Elevator, ExecOutput};
use crate::session::{Phase, PhaseTracker, Session};
use crate::wait::{wait_for, WaitConfig};

/// Staged script that restores cwd, exports env, and runs the command.
pub const COMMAND_SCRIPT: &str = "command.bat";

/// Staged script that captures the command script's streams and exit code.
pub const EXECUTE_SCRIPT: &str = "execute.bat";

/// File the execute script writes `%ERRORLEVEL%` to.
pub const STATUS_FILE: &str = "status";

/// File the execute script redirects stdout to.
pub const STDOUT_FILE: &str = "stdout";

/// File the execute script redirects stderr to.
pub const STDERR_FILE: &str = "stderr";

/// A complete status file holds at least one digit plus a line terminator.
const MIN_STATUS_LEN: u64 = 2;

/// Characters the elevation launcher cannot safely pass inside a path.
const SPECIAL_PATH_CHARS: [char; 8] = ['&', '`', '\'', '"', '<', '>', '|', '^'];

/// Executor for the Windows UAC prompt.
#[derive(Debug, Clone, Default)]
pub struct WindowsExecutor {
    wait: WaitConfig,
    cancel: CancellationToken,
}

impl WindowsExecutor {
    /// Executor with the default wait policy (1 second interval, no
    /// deadline) and no cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the status-file wait policy.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Attaches a cancellation token aborting the status-file wait.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the session path forces the interpreter-copy workaround.
    fn needs_interpreter_copy(path: &str) -> bool {
        path.contains(SPECIAL_PATH_CHARS)
    }

    /// Command script text (CRLF): UTF-8 code page, restored working
    /// directory, escaped environment exports, then the command.
    fn command_script(session: &Session) -> ElevationResult<String> {
        let cwd = std::env::current_dir()
            .map_err(|err| ElevationError::internal(format!("working directory: {err}")))?;
        let cwd = cwd.to_string_lossy().into_owned();
        if cwd.contains('"') {
            // Double quotes are reserved on Windows; refuse rather than
            // generate a script that would mis-parse.
            return Err(ElevationError::internal(
                "working directory must not contain double quotes",
            ));
        }

        let mut lines = Vec::new();
        lines.push("@echo off".to_string());
        lines.push("chcp 65001>nul".to_string());
        // /d switches drive as well, for a cwd on another volume.
        lines.push(format!("cd /d \"{cwd}\""));
        for (key, value) in session.options().env() {
            // cmd assigns everything after the equals sign to the value,
            // quotes included, so metacharacters are caret-escaped instead.
            lines.push(format!("set {key}={}", escape_cmd_meta(value)));
        }
        lines.push(session.command().to_string());
        Ok(lines.join("\r\n"))
    }

    /// Execute script text (CRLF): run the command script with redirected
    /// streams, then record its exit code.
    fn execute_script(root: &Path) -> String {
        let command = root.join(COMMAND_SCRIPT);
        let stdout = root.join(STDOUT_FILE);
        let stderr = root.join(STDERR_FILE);
        let status = root.join(STATUS_FILE);
        [
            "@echo off".to_string(),
            format!(
                "call \"{}\" > \"{}\" 2> \"{}\"",
                command.display(),
                stdout.display(),
                stderr.display()
            ),
            format!("(echo %ERRORLEVEL%) > \"{}\"", status.display()),
        ]
        .join("\r\n")
    }

    /// Arguments for the elevation launcher, plus the working directory to
    /// launch from when the interpreter-copy workaround is active.
    fn launch_args(root: &Path, interpreter_copied: bool) -> (Vec<String>, Option<PathBuf>) {
        let mut args = vec![
            "Start-Process".to_string(),
            "-FilePath".to_string(),
        ];
        let cwd = if interpreter_copied {
            // The problematic path never crosses the launcher: the copied
            // interpreter and the script are both reached relatively.
            args.push(".\\cmd.exe".to_string());
            args.push("-ArgumentList".to_string());
            args.push(format!("\"/C\",\"{EXECUTE_SCRIPT}\""));
            Some(root.to_path_buf())
        } else {
            // Double quotes for cmd, single quotes for PowerShell, with
            // embedded single quotes backtick-escaped.
            let execute = root.join(EXECUTE_SCRIPT);
            args.push(format!(
                "\"'{}'\"",
                execute.display().to_string().replace('\'', "`'")
            ));
            None
        };
        args.push("-WindowStyle".to_string());
        args.push("hidden".to_string());
        args.push("-Verb".to_string());
        args.push("runAs".to_string());
        (args, cwd)
    }

    /// Stages both batch scripts and, when needed, the interpreter copy.
    /// Returns whether the copy workaround is active.
    async fn stage(session: &Session) -> ElevationResult<bool> {
        let root_str = session.root().to_string_lossy().into_owned();
        if root_str.contains('"') {
            // Double quotes are reserved on Windows; a generated path
            // containing one must never be embedded in a script.
            return Err(ElevationError::internal(
                "session path must not contain double quotes",
            ));
        }
        session.create_root().await?;

        tokio::fs::write(
            session.root().join(COMMAND_SCRIPT),
            Self::command_script(session)?,
        )
        .await?;
        tokio::fs::write(
            session.root().join(EXECUTE_SCRIPT),
            Self::execute_script(session.root()),
        )
        .await?;

        let interpreter_copied = Self::needs_interpreter_copy(&root_str);
        if interpreter_copied {
            let system_root = std::env::var_os("SystemRoot").ok_or_else(|| {
                ElevationError::environment("SystemRoot environment variable is not set")
            })?;
            let source = PathBuf::from(system_root)
                .join("System32")
                .join("cmd.exe");
            tokio::fs::copy(&source, session.root().join("cmd.exe")).await?;
        }
        Ok(interpreter_copied)
    }

    /// Invokes the elevation launcher. Any launcher failure is classified
    /// as denial: a refused UAC prompt is the only observable cause.
    async fn launch(session: &Session, interpreter_copied: bool) -> ElevationResult<()> {
        let (args, cwd) = Self::launch_args(session.root(), interpreter_copied);
        let mut command = Command::new("powershell.exe");
        command
            .args(&args)
            // A dangling stdin makes PowerShell wait forever on some
            // supported versions.
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        match command.status().await {
            Ok(status) if status.success() => Ok(()),
            _ => Err(ElevationError::PermissionDenied),
        }
    }

    /// Polls until the status file exists with a plausible length.
    async fn await_completion(&self, root: &Path) -> ElevationResult<()> {
        let status_path = root.join(STATUS_FILE);
        wait_for(&self.wait, &self.cancel, || {
            let status_path = status_path.clone();
            async move {
                match tokio::fs::metadata(&status_path).await {
                    Ok(meta) if meta.len() >= MIN_STATUS_LEN => Ok(Some(())),
                    // Present but still being written; keep polling.
                    Ok(_) => Ok(None),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(err.into()),
                }
            }
        })
        .await
    }

    /// Reads the status/stdout/stderr files and reconciles them.
    async fn collect(session: &Session) -> ElevationResult<ExecOutput> {
        let root = session.root();
        let status_text = read_lossy(&root.join(STATUS_FILE)).await?;
        let stdout = read_lossy(&root.join(STDOUT_FILE)).await?;
        let stderr = read_lossy(&root.join(STDERR_FILE)).await?;

        let exit_code: i32 = status_text.trim().parse().map_err(|_| {
            ElevationError::internal(format!("unparseable status file {status_text:?}"))
        })?;
        if exit_code == 0 {
            Ok(ExecOutput { stdout, stderr })
        } else {
            tracing::debug!(session = %session.id(), exit_code, "elevated command failed");
            Err(ElevationError::CommandFailed { exit_code, stderr })
        }
    }

    async fn run(&self, session: &Session, phases: &mut PhaseTracker) -> ElevationResult<ExecOutput> {
        let interpreter_copied = Self::stage(session).await?;
        phases.advance(Phase::ArtifactsStaged)?;

        tracing::debug!(
            session = %session.id(),
            interpreter_copied,
            "launching elevation prompt"
        );
        phases.advance(Phase::Elevating)?;
        Self::launch(session, interpreter_copied).await?;

        phases.advance(Phase::AwaitingCompletion)?;
        self.await_completion(session.root()).await?;

        let result = Self::collect(session).await;
        if result.is_ok() {
            phases.advance(Phase::Completed)?;
        }
        result
    }
}

#[async_trait]
impl Elevator for WindowsExecutor {
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

/// Reads a result file, tolerating non-UTF-8 bytes from the console code
/// page.
async fn read_lossy(path: &Path) -> ElevationResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
