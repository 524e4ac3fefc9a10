//! Working-directory containment.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `requested` (or `root` when empty) to an absolute, lexically
/// cleaned path and accept it only if it is `root` or lies beneath it.
///
/// Returns `Ok(None)` when the path escapes the root. No filesystem access is
/// made beyond reading the agent's current directory for relative input.
pub fn resolve_working_dir(requested: Option<&str>, root: &Path) -> io::Result<Option<PathBuf>> {
    let requested = match requested {
        Some(dir) if !dir.is_empty() => Path::new(dir),
        _ => root,
    };

    let cleaned = clean(&absolutize(requested)?);
    let root = clean(&absolutize(root)?);
    // Component-wise comparison: `/mnt/data2` does not start with `/mnt/data`.
    if cleaned.starts_with(&root) {
        Ok(Some(cleaned))
    } else {
        Ok(None)
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Lexically normalise a path: drop `.`, resolve `..` against the preceding
/// component (never climbing above `/`), collapse separators.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
