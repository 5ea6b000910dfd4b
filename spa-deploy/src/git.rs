//! Working tree check run before a deploy.
//!
//! A deploy is expected to ship exactly what is committed; uncommitted changes abort the run
//! unless explicitly ignored.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};
use tracing::{error, info, warn};

/// Output of `git status --porcelain` in `pwd`, or `None` when git could not be run there.
pub fn git_changes(pwd: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(pwd)
        .arg("status")
        .arg("--porcelain")
        .output();

    match output {
        Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(out) => {
            error!(
                path = %pwd.display(),
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "Git status exited with non-zero code: {}", out.status
            );
            None
        }
        Err(e) => {
            error!(path = %pwd.display(), error = %e, "Failed to run git");
            None
        }
    }
}

/// Fail when `pwd` has uncommitted changes or is not a git checkout, unless `ignore` is set.
pub fn ensure_clean(pwd: &Path, ignore: bool) -> Result<()> {
    match git_changes(pwd) {
        Some(changes) if changes.trim().is_empty() => {
            info!(path = %pwd.display(), "Git working tree is clean");
            Ok(())
        }
        _ if ignore => {
            warn!(path = %pwd.display(), "Changes detected in git, continuing anyway");
            Ok(())
        }
        Some(changes) => {
            bail!(
                "detected changes in git, the working tree must be clean to deploy:\n{}",
                changes.trim_end()
            )
        }
        None => bail!("error detecting git in {}", pwd.display()),
    }
}
