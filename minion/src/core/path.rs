//! Lexical path confinement to the repository root.
//!
//! Nothing here touches the filesystem: `.` and `..` are resolved purely on
//! the path components so that traversal attempts are rejected before any
//! filesystem call is made. Symlink checks happen later in the executor.

use std::path::{Component, Path, PathBuf};

/// Resolve `requested` against `root` and return it if it stays inside `root`.
///
/// `root` must be absolute and already canonical. Relative paths are joined
/// to `root`; absolute paths are accepted only if they lie under it. Returns
/// `None` when the normalized path escapes the root.
pub fn confine(root: &Path, requested: &str) -> Option<PathBuf> {
    let candidate = Path::new(requested);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let normalized = normalize(&joined)?;
    normalized.starts_with(root).then_some(normalized)
}

/// Lexically normalize an absolute path. `None` if `..` climbs above `/`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}
