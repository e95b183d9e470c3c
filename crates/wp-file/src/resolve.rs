//! Case-insensitive sample path resolution
//!
//! Sample packs are frequently authored on case-insensitive filesystems.
//! On case-sensitive platforms, every path component that does not exist
//! verbatim falls back to a case-insensitive scan of its parent directory
//! and is rewritten to the on-disk spelling.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

/// Resolve `filename` against `root`.
///
/// Returns true when the file exists, possibly after rewriting `filename`
/// to the spelling actually present on disk. `.` and `..` components pass
/// through verbatim. On platforms whose filesystems already match
/// case-insensitively, only existence is checked.
pub fn resolve_sample_path(root: &Path, filename: &mut String) -> bool {
    if root.join(&*filename).exists() {
        return true;
    }
    resolve_fallback(root, filename)
}

#[cfg(windows)]
fn resolve_fallback(_root: &Path, _filename: &mut String) -> bool {
    // The filesystem already matched case-insensitively; nothing to rewrite.
    false
}

#[cfg(not(windows))]
fn resolve_fallback(root: &Path, filename: &mut String) -> bool {
    let mut current = root.to_path_buf();
    let mut rewritten = PathBuf::new();

    for component in Path::new(&*filename).components() {
        match component {
            Component::CurDir | Component::ParentDir => {
                current.push(component.as_os_str());
                rewritten.push(component.as_os_str());
            }
            Component::Normal(part) => {
                if current.join(part).exists() {
                    current.push(part);
                    rewritten.push(part);
                    continue;
                }
                let Some(matched) = scan_case_insensitive(&current, part) else {
                    log::debug!("could not resolve sample path {filename}");
                    return false;
                };
                current.push(&matched);
                rewritten.push(&matched);
            }
            _ => return false,
        }
    }

    let resolved = rewritten.to_string_lossy().into_owned();
    log::debug!("resolved sample path {filename} to {resolved}");
    *filename = resolved;
    true
}

#[cfg(not(windows))]
fn scan_case_insensitive(dir: &Path, target: &OsStr) -> Option<OsString> {
    let target = target.to_string_lossy().to_lowercase();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::debug!("directory scan failed under {}: {err}", dir.display());
            return None;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().to_lowercase() == target {
            return Some(name);
        }
    }
    None
}
