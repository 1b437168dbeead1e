//! Tool preflight - find required executables on a job's PATH

use crate::execution::session::JobSession;
use std::path::{Path, PathBuf};

const DEFAULT_PATHEXT: &str = ".COM;.EXE;.BAT;.CMD";

/// Locate an executable
///
/// Names containing a path separator are checked as given (relative to
/// `cwd`). On Windows, `PATHEXT` extensions are tried for names without one.
pub fn locate(tool: &str, path_var: Option<&str>, pathext: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    let extensions: Vec<String> = if cfg!(windows) && Path::new(tool).extension().is_none() {
        let mut exts: Vec<String> = pathext
            .unwrap_or(DEFAULT_PATHEXT)
            .split(';')
            .filter(|e| !e.is_empty())
            .map(|e| e.to_ascii_lowercase())
            .collect();
        exts.insert(0, String::new());
        exts
    } else {
        vec![String::new()]
    };

    let candidates = |base: PathBuf| -> Option<PathBuf> {
        extensions.iter().find_map(|ext| {
            let mut candidate = base.clone().into_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            is_executable(&candidate).then_some(candidate)
        })
    };

    if tool.contains('/') || tool.contains('\\') {
        return candidates(cwd.join(tool));
    }

    let path_var = path_var?;
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| candidates(dir.join(tool)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Check every required tool against the session's PATH
///
/// Returns the names of the missing tools.
pub fn preflight(requires: &[String], session: &JobSession) -> Result<(), Vec<String>> {
    let path_var = session.var("PATH");
    let pathext = session.var("PATHEXT");

    let missing: Vec<String> = requires
        .iter()
        .filter(|tool| locate(tool, path_var, pathext, session.cwd()).is_none())
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}
