//! Small test helpers.

use std::path::PathBuf;

/// Locates an executable on the path.
///
/// Searches the current directory first, then each `PATH` entry, appending
/// the platform executable suffix. Returns the first match, or `None`.
#[must_use]
pub fn locate(name: &str) -> Option<PathBuf> {
    let file = format!("{name}{}", std::env::consts::EXE_SUFFIX);

    let mut dirs = vec![PathBuf::from(".")];
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }

    dirs.into_iter()
        .map(|dir| dir.join(&file))
        .find(|candidate| candidate.exists())
}
