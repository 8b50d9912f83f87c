//! Locating compose files and configuration scripts on disk.
//!
//! Both searches start from a file or directory and walk up toward the
//! filesystem root, the way the tools themselves resolve their files.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Find a `docker-compose.yml` / `docker-compose.yaml` at or above
/// `relative_to`.
///
/// A `.lua` start path searches from its parent directory; an explicit
/// compose file path is returned as-is if it exists.
pub fn find_docker_compose(relative_to: &Path) -> Option<PathBuf> {
    let start = relative_to.canonicalize().ok()?;
    let dir = if start.is_dir() {
        start
    } else if start.extension().is_some_and(|e| e == "lua") {
        start.parent()?.to_path_buf()
    } else {
        return start.exists().then_some(start);
    };
    for base in dir.ancestors() {
        for name in ["docker-compose.yml", "docker-compose.yaml"] {
            let candidate = base.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Find a `dcmon.lua` configuration script at or above `relative_to`.
///
/// A non-`.lua` file start path searches from its parent directory.
pub fn find_config_script(relative_to: &Path) -> Option<PathBuf> {
    let start = relative_to.canonicalize().ok()?;
    if start.is_file() && start.extension().is_some_and(|e| e == "lua") {
        return Some(start);
    }
    let dir = if start.is_dir() {
        start
    } else {
        start.parent()?.to_path_buf()
    };
    for base in dir.ancestors() {
        let candidate = base.join("dcmon.lua");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Check a compose file by running `docker-compose config` over it.
///
/// Returns `Ok(())` when the tool accepts the file.  With `quiet` the
/// tool's stderr is suppressed; otherwise it is forwarded so the user
/// sees what was wrong.
pub fn validate_docker_compose(dc_file: &Path, quiet: bool) -> std::io::Result<()> {
    let mut cmd = Command::new("docker-compose");
    cmd.arg("-f").arg(dc_file).arg("config").stdout(Stdio::null());
    if quiet {
        cmd.stderr(Stdio::null());
    }
    let status = cmd.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "docker-compose rejected {}",
            dc_file.display()
        )))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
