//! End-to-end tests for the Linux sentinel protocol.
//!
//! Real elevation needs an interactive agent, so these tests inject fake
//! helper binaries through the executor's ordered helper list. A
//! cooperative helper simply executes its arguments, which exercises the
//! full path: compose, spawn, sentinel detection, stream capture, and
//! classification.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use elevate_core::exec::linux::SENTINEL;
use elevate_core::{
    ElevationError, ElevationOptions, Elevator, LinuxExecutor, Session, ValidatedOptions,
};

/// Writes an executable helper script into `dir`.
fn fake_helper(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    file.write_all(body.as_bytes()).unwrap();
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn options() -> ValidatedOptions {
    ElevationOptions::new("Test App").validate().unwrap()
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn approved_command_returns_its_streams() {
    let dir = tempfile::tempdir().unwrap();
    let helper = fake_helper(dir.path(), "granting-helper", "exec \"$@\"\n");
    let executor = LinuxExecutor::with_helpers([helper]);

    let session = Session::build("echo out; echo err >&2", options()).unwrap();
    let output = executor.elevate(&session).await.unwrap();

    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn environment_variable_reaches_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let helper = fake_helper(dir.path(), "granting-helper", "exec \"$@\"\n");
    let executor = LinuxExecutor::with_helpers([helper]);

    let validated = ElevationOptions::new("Test App")
        .with_env_var("VAR", "hello world")
        .validate()
        .unwrap();
    let session = Session::build("echo \"$VAR\"", validated).unwrap();
    let output = executor.elevate(&session).await.unwrap();

    assert_eq!(output.stdout, "hello world\n");
    assert_eq!(output.stderr, "");
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn pkexec_style_helper_receives_agent_flag() {
    let dir = tempfile::tempdir().unwrap();
    // A helper named pkexec gets --disable-internal-agent prepended; this
    // fake asserts it arrived, then executes the rest.
    let helper = fake_helper(
        dir.path(),
        "pkexec",
        "[ \"$1\" = \"--disable-internal-agent\" ] || exit 99\nshift\nexec \"$@\"\n",
    );
    let executor = LinuxExecutor::with_helpers([helper]);

    let session = Session::build("echo flagged", options()).unwrap();
    let output = executor.elevate(&session).await.unwrap();
    assert_eq!(output.stdout, "flagged\n");
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn sentinel_makes_nonzero_command_exit_success_shaped() {
    let dir = tempfile::tempdir().unwrap();
    let helper = fake_helper(dir.path(), "granting-helper", "exec \"$@\"\n");
    let executor = LinuxExecutor::with_helpers([helper]);

    // The wrapped command fails, but elevation was approved; callers get
    // the streams, not an error.
    let session = Session::build("echo partial; exit 3", options()).unwrap();
    let output = executor.elevate(&session).await.unwrap();
    assert_eq!(output.stdout, "partial\n");
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn denial_without_sentinel_surfaces_helper_failure() {
    let dir = tempfile::tempdir().unwrap();
    let helper = fake_helper(
        dir.path(),
        "denying-helper",
        "echo \"Request dismissed\" >&2\nexit 126\n",
    );
    let executor = LinuxExecutor::with_helpers([helper]);

    let session = Session::build("echo never", options()).unwrap();
    let err = executor.elevate(&session).await.unwrap_err();
    match err {
        ElevationError::CommandFailed { exit_code, stderr } => {
            assert_eq!(exit_code, 126);
            assert!(stderr.contains("Request dismissed"));
        },
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn missing_agent_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let helper = fake_helper(
        dir.path(),
        "pkexec",
        "echo \"Error getting authority: No authentication agent found.\" >&2\nexit 127\n",
    );
    let executor = LinuxExecutor::with_helpers([helper]);

    let session = Session::build("echo never", options()).unwrap();
    let err = executor.elevate(&session).await.unwrap_err();
    assert!(matches!(err, ElevationError::AgentMissing));
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn no_helper_on_the_list_is_an_environment_error() {
    let executor = LinuxExecutor::with_helpers([PathBuf::from("/nonexistent/kdesudo")]);
    let session = Session::build("echo never", options()).unwrap();
    let err = executor.elevate(&session).await.unwrap_err();
    match err {
        ElevationError::Environment { detail } => {
            assert!(detail.contains("no supported elevation helper"));
        },
        other => panic!("expected Environment, got {other:?}"),
    }
}

#[cfg_attr(miri, ignore)] // Miri can't spawn processes
#[tokio::test]
async fn sentinel_is_stripped_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let helper = fake_helper(dir.path(), "granting-helper", "exec \"$@\"\n");
    let executor = LinuxExecutor::with_helpers([helper]);

    // A command that prints the sentinel itself keeps that copy.
    let command = format!("echo {}", SENTINEL.trim_end());
    let session = Session::build(&command, options()).unwrap();
    let output = executor.elevate(&session).await.unwrap();
    assert_eq!(output.stdout, SENTINEL);
}

#[cfg(target_os = "linux")]
mod through_broker_config {
    use elevate_core::BrokerConfig;

    use super::*;

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn config_helper_override_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let helper = fake_helper(dir.path(), "granting-helper", "exec \"$@\"\n");

        let config = BrokerConfig {
            helpers: Some(vec![helper]),
            ..BrokerConfig::default()
        };
        let output = config.execute("echo via-config", options()).await.unwrap();
        assert_eq!(output.stdout, "via-config\n");
    }
}
