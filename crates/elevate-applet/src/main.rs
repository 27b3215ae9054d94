//! Minimal macOS prompt relay.
//!
//! `elevate-core` stages this binary inside a fresh application bundle and
//! launches it with the bundle's `MacOS` directory as the working
//! directory. The relay presents the OS authorization dialog; on approval
//! the elevated shell runs the staged command script and writes the
//! `code`, `stdout`, and `stderr` result files next to this binary. On
//! denial nothing is written and the relay exits nonzero — the absence of
//! the result files is the denial signal the library relies on.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};
use elevate_core::escape_double_quotes;
use elevate_core::exec::macos::{
    COMMAND_SCRIPT, RESULT_CODE_FILE, RESULT_STDERR_FILE, RESULT_STDOUT_FILE,
};

fn main() -> Result<()> {
    if !cfg!(target_os = "macos") {
        bail!("the prompt relay only works on macOS");
    }

    let exe = std::env::current_exe().context("locate relay binary")?;
    let dir: PathBuf = exe
        .parent()
        .context("relay binary has no parent directory")?
        .to_path_buf();
    let script = dir.join(COMMAND_SCRIPT);
    if !script.exists() {
        bail!("missing command script at {}", script.display());
    }

    // One elevated shell both runs the command script and records its
    // results, so approval and completion are captured in a single round
    // trip. The exit-code file is written last; the library treats a
    // present code file as proof that the streams are final.
    let inner = format!(
        "cd \"{dir}\"; /bin/bash \"./{COMMAND_SCRIPT}\" > \"./{RESULT_STDOUT_FILE}\" 2> \"./{RESULT_STDERR_FILE}\"; /bin/echo $? > \"./{RESULT_CODE_FILE}\"",
        dir = escape_double_quotes(&dir.to_string_lossy()),
    );
    let prompt = format!(
        "do shell script \"{}\" with administrator privileges",
        escape_double_quotes(&inner)
    );

    let status = Command::new("/usr/bin/osascript")
        .arg("-e")
        .arg(&prompt)
        .status()
        .context("launch osascript")?;
    if !status.success() {
        // The user declined (or the dialog could not be shown). Write
        // nothing: the missing result files carry the signal.
        bail!("authorization was not granted");
    }
    Ok(())
}
