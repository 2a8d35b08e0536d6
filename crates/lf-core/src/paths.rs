//! # Safe Path Resolver
//!
//! Every storage path is computed here before anything touches the disk.
//! Resolution is purely lexical: no I/O, symlinks are not followed.

use crate::error::{AppError, Result};
use std::path::{Component, Path, PathBuf};

/// Resolves `candidate` against `root` and rejects anything that would escape it.
///
/// `root` should already be absolute and normalized (see [`normalize`]). Backslashes in the
/// candidate are treated as separators so that `..\..\etc` cannot slip through on Unix.
/// Absolute candidates are allowed only when they land inside `root`.
pub fn resolve(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let candidate = candidate.as_ref();
    let unified = PathBuf::from(candidate.to_string_lossy().replace('\\', "/"));

    let resolved = normalize(&root.join(unified));

    if !resolved.starts_with(root) {
        return Err(AppError::ForbiddenPath(candidate.to_path_buf()));
    }

    Ok(resolved)
}

/// Lexically collapses `.` and `..` segments.
///
/// `..` at the filesystem root stays at the root, mirroring how the OS treats `/..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            Component::Normal(segment) => normalized.push(segment),
        }
    }

    normalized
}
