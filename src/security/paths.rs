//! Path guard for sandboxed local reads.
//!
//! [`guard_path`] resolves a caller-supplied storage key below a sandbox root
//! and refuses anything that could land outside it: absolute keys, `..`
//! segments at any depth, and symlinks whose target leaves the root.

use crate::error::VisionError;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Resolve `key` below `root`, asserting the result stays inside the
/// canonical root.
///
/// The returned path need not exist. Its deepest existing ancestor has been
/// canonicalised, so a symlink inside the sandbox that points elsewhere is
/// caught here rather than at read time.
pub fn guard_path(root: &Path, key: &str) -> Result<PathBuf, VisionError> {
    if key.trim().is_empty() || key.contains('\0') {
        return Err(VisionError::PathError);
    }
    let base = root.canonicalize().map_err(|_| VisionError::PathError)?;

    let mut joined = base.clone();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(VisionError::PathEscape)
            }
        }
    }

    let resolved = canonicalize_existing_prefix(&joined)?;
    if resolved.starts_with(&base) {
        Ok(resolved)
    } else {
        Err(VisionError::PathEscape)
    }
}

/// Canonicalise the deepest existing ancestor of `path` and re-append the
/// missing tail. The tail only holds normal components at this point.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, VisionError> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            out.extend(tail.iter().rev());
            return Ok(out);
        }
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => return Err(VisionError::PathError),
        }
    }
}
