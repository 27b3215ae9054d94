//! macOS executor: staged prompt-relay bundle.
//!
//! The authorization dialog is presented by a small relay binary launched
//! from inside a freshly staged application bundle. On approval the relay
//! runs the staged command script and writes an exit-code file plus the
//! captured streams next to itself; on denial it writes nothing and exits.
//! Absent result files are therefore the denial signal - the relay leaves
//! no other trace when the user declines.
//!
//! The relay binary is an external artifact (the `elevate-applet` crate in
//! this workspace, or any executable honoring the same contract). It is
//! located through the executor configuration, the `ELEVATE_APPLET`
//! environment variable, or next to the current executable, in that order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{ElevationError, ElevationResult};
use crate::escape::escape_double_quotes;
use crate::exec::{Elevator, ExecOutput};
use crate::session::{Phase, PhaseTracker, Session};

/// Environment variable overriding the relay binary location.
pub const APPLET_ENV_VAR: &str = "ELEVATE_APPLET";

/// File name of the relay binary inside the bundle.
pub const APPLET_BINARY: &str = "elevate-applet";

/// File name of the staged command script inside `Contents/MacOS`.
pub const COMMAND_SCRIPT: &str = "elevate.command";

/// Result file holding the wrapped command's exit code.
pub const RESULT_CODE_FILE: &str = "code";

/// Result file holding the wrapped command's stdout.
pub const RESULT_STDOUT_FILE: &str = "stdout";

/// Result file holding the wrapped command's stderr.
pub const RESULT_STDERR_FILE: &str = "stderr";

/// Icon resource name the authorization dialog picks up.
const ICON_RESOURCE: &str = "applet.icns";

/// Executor for the macOS authorization prompt.
#[derive(Debug, Clone, Default)]
pub struct MacExecutor {
    applet: Option<PathBuf>,
}

impl MacExecutor {
    /// Executor resolving the relay binary through the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor using an explicit relay binary path.
    #[must_use]
    pub fn with_applet(applet: impl Into<PathBuf>) -> Self {
        Self {
            applet: Some(applet.into()),
        }
    }

    /// Resolves the relay binary: config override, then `ELEVATE_APPLET`,
    /// then next to the current executable.
    fn locate_applet(&self) -> ElevationResult<PathBuf> {
        let candidate = if let Some(applet) = &self.applet {
            applet.clone()
        } else if let Some(env) = std::env::var_os(APPLET_ENV_VAR).filter(|v| !v.is_empty()) {
            PathBuf::from(env)
        } else {
            let exe = std::env::current_exe()
                .map_err(|err| ElevationError::internal(format!("current executable: {err}")))?;
            exe.parent()
                .map(|dir| dir.join(APPLET_BINARY))
                .unwrap_or_else(|| PathBuf::from(APPLET_BINARY))
        };
        if std::fs::metadata(&candidate).is_err() {
            return Err(ElevationError::environment(format!(
                "prompt relay binary not found at {}",
                candidate.display()
            )));
        }
        Ok(candidate)
    }

    /// Bundle directory for this session: `<root>/<name>.app`.
    fn bundle_dir(session: &Session) -> PathBuf {
        session
            .root()
            .join(format!("{}.app", session.options().name()))
    }

    /// Command script text: restore the working directory, export the
    /// environment, then the literal command.
    fn command_script(session: &Session) -> ElevationResult<String> {
        let cwd = std::env::current_dir()
            .map_err(|err| ElevationError::internal(format!("working directory: {err}")))?;

        let mut lines = Vec::new();
        // Runs in a subshell; relative paths in the command keep working.
        lines.push(format!(
            "cd \"{}\"",
            escape_double_quotes(&cwd.to_string_lossy())
        ));
        for (key, value) in session.options().env() {
            lines.push(format!("export {key}=\"{}\"", escape_double_quotes(value)));
        }
        lines.push(session.command().to_string());
        Ok(lines.join("\n"))
    }

    /// Display name shown by the authorization dialog.
    ///
    /// The bundle metadata update embeds this value single-quoted and has
    /// no way to escape a quote inside it, so one is refused outright.
    fn display_name(name: &str) -> ElevationResult<String> {
        let value = format!("{name} Password Prompt");
        if value.contains('\'') {
            return Err(ElevationError::internal(
                "display name must not contain single quotes",
            ));
        }
        Ok(value)
    }

    /// Minimal property list staged with the bundle skeleton.
    fn info_plist(session: &Session) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleExecutable</key>
	<string>{APPLET_BINARY}</string>
	<key>CFBundleIdentifier</key>
	<string>com.elevate.session-{id}</string>
	<key>CFBundleName</key>
	<string>{name}</string>
	<key>CFBundlePackageType</key>
	<string>APPL</string>
</dict>
</plist>
"#,
            id = session.id(),
            name = session.options().name(),
        )
    }

    /// Stages the bundle skeleton, relay binary, icon, command script, and
    /// property list. Returns the bundle directory.
    async fn stage(&self, session: &Session, applet: &Path) -> ElevationResult<PathBuf> {
        session.create_root().await?;
        let bundle = Self::bundle_dir(session);
        let macos_dir = bundle.join("Contents").join("MacOS");
        let resources_dir = bundle.join("Contents").join("Resources");
        tokio::fs::create_dir_all(&macos_dir).await?;
        tokio::fs::create_dir_all(&resources_dir).await?;

        let staged_applet = macos_dir.join(APPLET_BINARY);
        tokio::fs::copy(applet, &staged_applet).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staged_applet, std::fs::Permissions::from_mode(0o755))
                .await?;
        }

        if let Some(icon) = session.options().icon_path() {
            tokio::fs::copy(icon, resources_dir.join(ICON_RESOURCE)).await?;
        }

        tokio::fs::write(
            macos_dir.join(COMMAND_SCRIPT),
            Self::command_script(session)?,
        )
        .await?;
        tokio::fs::write(
            bundle.join("Contents").join("Info.plist"),
            Self::info_plist(session),
        )
        .await?;
        Ok(bundle)
    }

    /// Rewrites the bundle's display name so the prompt says who is asking.
    async fn set_display_name(session: &Session, bundle: &Path) -> ElevationResult<()> {
        let value = Self::display_name(session.options().name())?;
        let plist = bundle.join("Contents").join("Info.plist");
        let output = Command::new("/usr/bin/defaults")
            .arg("write")
            .arg(&plist)
            .arg("CFBundleName")
            .arg(&value)
            .output()
            .await?;
        if !output.status.success() {
            return Err(ElevationError::internal(format!(
                "defaults write failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Launches the relay and waits for it to exit.
    ///
    /// The relay is started by relative path with the bundle's `MacOS`
    /// directory as its working directory so it resolves the staged
    /// command script and writes its result files next to itself. Its exit
    /// status is not consulted; the result files are the only signal.
    async fn launch(bundle: &Path) -> ElevationResult<()> {
        let macos_dir = bundle.join("Contents").join("MacOS");
        let _ = Command::new(format!("./{APPLET_BINARY}"))
            .current_dir(&macos_dir)
            .output()
            .await?;
        Ok(())
    }

    /// Reads the three result files and reconciles them.
    async fn collect(session: &Session, bundle: &Path) -> ElevationResult<ExecOutput> {
        let macos_dir = bundle.join("Contents").join("MacOS");
        let code_text = read_result(&macos_dir.join(RESULT_CODE_FILE)).await?;
        let stdout = read_result(&macos_dir.join(RESULT_STDOUT_FILE)).await?;
        let stderr = read_result(&macos_dir.join(RESULT_STDERR_FILE)).await?;

        let exit_code: i32 = code_text.trim().parse().map_err(|_| {
            ElevationError::internal(format!("unparseable exit code {code_text:?}"))
        })?;
        if exit_code == 0 {
            Ok(ExecOutput { stdout, stderr })
        } else {
            tracing::debug!(session = %session.id(), exit_code, "elevated command failed");
            Err(ElevationError::CommandFailed { exit_code, stderr })
        }
    }

    async fn run(&self, session: &Session, phases: &mut PhaseTracker) -> ElevationResult<ExecOutput> {
        // The staged command script runs under the invoking user; without
        // an identity there is nothing to prompt for.
        if std::env::var("USER").map(|u| u.is_empty()).unwrap_or(true) {
            return Err(ElevationError::environment(
                "USER environment variable is not set",
            ));
        }
        let applet = self.locate_applet()?;

        let bundle = self.stage(session, &applet).await?;
        Self::set_display_name(session, &bundle).await?;
        phases.advance(Phase::ArtifactsStaged)?;

        tracing::debug!(session = %session.id(), bundle = %bundle.display(), "launching prompt relay");
        phases.advance(Phase::Elevating)?;
        Self::launch(&bundle).await?;

        phases.advance(Phase::AwaitingCompletion)?;
        let result = Self::collect(session, &bundle).await;
        if result.is_ok() {
            phases.advance(Phase::Completed)?;
        }
        result
    }
}

#[async_trait]
impl Elevator for MacExecutor {
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

/// Reads one result file; a missing file means the user declined, because
/// the relay writes nothing on denial.
async fn read_result(path: &Path) -> ElevationResult<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(ElevationError::PermissionDenied)
        },
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ElevationOptions;
    use crate::session::Retention;

    fn session(command: &str) -> Session {
        let options = ElevationOptions::new("Test App")
            .with_env_var("GREETING", "hello world")
            .validate()
            .unwrap();
        Session::build(command, options).unwrap()
    }

    #[test]
    fn test_command_script_shape() {
        let script = MacExecutor::command_script(&session("echo hi")).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert!(lines[0].starts_with("cd \""));
        assert_eq!(lines[1], "export GREETING=\"hello world\"");
        assert_eq!(lines[2], "echo hi");
        assert!(!script.contains("\r\n"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            MacExecutor::display_name("Test App").unwrap(),
            "Test App Password Prompt"
        );
        assert!(MacExecutor::display_name("It's App").is_err());
    }

    #[test]
    fn test_info_plist_names_relay_binary() {
        let plist = MacExecutor::info_plist(&session("echo hi"));
        assert!(plist.contains("<string>elevate-applet</string>"));
        assert!(plist.contains("com.elevate.session-"));
    }

    #[test]
    fn test_bundle_dir_uses_prompt_name() {
        let session = session("echo hi");
        let bundle = MacExecutor::bundle_dir(&session);
        assert_eq!(bundle.file_name().unwrap().to_str().unwrap(), "Test App.app");
        assert_eq!(bundle.parent().unwrap(), session.root());
    }

    async fn bundle_with_results(
        dir: &Path,
        files: &[(&str, &str)],
    ) -> (Session, PathBuf) {
        let options = ElevationOptions::new("Test App").validate().unwrap();
        let session = Session::build_in(
            dir.to_path_buf(),
            "echo hi",
            options,
            Retention::Retain,
        )
        .unwrap();
        let bundle = MacExecutor::bundle_dir(&session);
        let macos_dir = bundle.join("Contents").join("MacOS");
        tokio::fs::create_dir_all(&macos_dir).await.unwrap();
        for (name, contents) in files {
            tokio::fs::write(macos_dir.join(name), contents).await.unwrap();
        }
        (session, bundle)
    }

    #[tokio::test]
    async fn test_collect_success() {
        let temp = tempfile::tempdir().unwrap();
        let (session, bundle) = bundle_with_results(
            temp.path(),
            &[("code", "0\n"), ("stdout", "hello\n"), ("stderr", "")],
        )
        .await;

        let output = MacExecutor::collect(&session, &bundle).await.unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "");
    }

    #[tokio::test]
    async fn test_collect_nonzero_code_is_command_failed() {
        let temp = tempfile::tempdir().unwrap();
        let (session, bundle) = bundle_with_results(
            temp.path(),
            &[("code", "2\n"), ("stdout", ""), ("stderr", "nope\n")],
        )
        .await;

        let err = MacExecutor::collect(&session, &bundle).await.unwrap_err();
        match err {
            ElevationError::CommandFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "nope\n");
            },
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_collect_missing_files_is_denial() {
        let temp = tempfile::tempdir().unwrap();
        let (session, bundle) = bundle_with_results(temp.path(), &[]).await;

        let err = MacExecutor::collect(&session, &bundle).await.unwrap_err();
        assert!(matches!(err, ElevationError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_collect_unparseable_code_is_internal() {
        let temp = tempfile::tempdir().unwrap();
        let (session, bundle) = bundle_with_results(
            temp.path(),
            &[("code", "junk\n"), ("stdout", ""), ("stderr", "")],
        )
        .await;

        let err = MacExecutor::collect(&session, &bundle).await.unwrap_err();
        assert!(matches!(err, ElevationError::Internal { .. }));
    }

    #[test]
    fn test_locate_applet_reports_missing_binary() {
        let executor = MacExecutor::with_applet("/nonexistent/elevate-applet");
        let err = executor.locate_applet().unwrap_err();
        assert!(matches!(err, ElevationError::Environment { .. }));
    }

    #[test]
    fn test_locate_applet_accepts_explicit_path() {
        let temp = tempfile::tempdir().unwrap();
        let applet = temp.path().join(APPLET_BINARY);
        std::fs::write(&applet, b"stub").unwrap();

        let executor = MacExecutor::with_applet(&applet);
        assert_eq!(executor.locate_applet().unwrap(), applet);
    }
}
