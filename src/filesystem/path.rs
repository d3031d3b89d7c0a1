// src/filesystem/path.rs

//! Path sanitization for names read from manifests and archives
//!
//! Manifests and tarballs are portable artifacts that may come from another
//! machine, so every name they carry is checked before it touches the disk.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Sanitize a relative path read from an archive entry
///
/// Leading slashes and `.` components are dropped; any `..` component is a
/// traversal attempt and rejected.
///
/// ```
/// use toolpack::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("llvm/bin/clang").unwrap(), PathBuf::from("llvm/bin/clang"));
/// assert_eq!(sanitize_path("/llvm/bin/clang").unwrap(), PathBuf::from("llvm/bin/clang"));
/// assert!(sanitize_path("llvm/../../etc/passwd").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{}' is empty after sanitization",
            path_str
        )));
    }

    Ok(normalized)
}

/// Join an untrusted relative path onto `root`, refusing to escape it
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_path(path.as_ref())?;
    let joined = root.join(&sanitized);

    // Existing symlinks inside root could still point outside it
    if let (Ok(canonical_root), Ok(canonical_joined)) =
        (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Validate a single file name from a deduplication manifest
///
/// The binary directory is flat, so names may not contain separators.
///
/// ```
/// use toolpack::filesystem::path::sanitize_filename;
///
/// assert_eq!(sanitize_filename("clang++").unwrap(), "clang++");
/// assert!(sanitize_filename("../clang").is_err());
/// assert!(sanitize_filename("bin/clang").is_err());
/// ```
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(format!(
            "file name contains a path separator: {}",
            name
        )));
    }

    if name == ".." || name == "." {
        return Err(Error::PathTraversal(format!("invalid file name: {}", name)));
    }

    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidPath(format!("invalid file name: {:?}", name)));
    }

    Ok(name.to_string())
}

/// Archive-relative path with forward slashes, for policy matching
pub fn archive_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_normal() {
        assert_eq!(
            sanitize_path("toolchain/lib/libLLVM.so").unwrap(),
            PathBuf::from("toolchain/lib/libLLVM.so")
        );
        assert_eq!(
            sanitize_path("///toolchain/bin/lld").unwrap(),
            PathBuf::from("toolchain/bin/lld")
        );
        assert_eq!(
            sanitize_path("./toolchain/./bin/lld").unwrap(),
            PathBuf::from("toolchain/bin/lld")
        );
    }

    #[test]
    fn test_sanitize_path_traversal_rejected() {
        assert!(sanitize_path("..").is_err());
        assert!(sanitize_path("../etc/passwd").is_err());
        assert!(sanitize_path("toolchain/bin/../../..").is_err());
        assert!(sanitize_path("/toolchain/../etc/passwd").is_err());
    }

    #[test]
    fn test_sanitize_path_empty_rejected() {
        assert!(matches!(sanitize_path(""), Err(Error::InvalidPath(_))));
        assert!(sanitize_path("/").is_err());
        assert!(sanitize_path("./").is_err());
    }

    #[test]
    fn test_safe_join() {
        let root = PathBuf::from("/tmp/toolpack-root");
        assert_eq!(
            safe_join(&root, "bin/clang").unwrap(),
            PathBuf::from("/tmp/toolpack-root/bin/clang")
        );
        assert!(safe_join(&root, "bin/../../etc").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clang-cl.exe").unwrap(), "clang-cl.exe");
        assert!(sanitize_filename("sub/clang").is_err());
        assert!(sanitize_filename("sub\\clang").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("").is_err());
    }

    #[test]
    fn test_archive_path_uses_forward_slashes() {
        let path = Path::new("./llvm").join("lib").join("clang").join("stddef.h");
        assert_eq!(archive_path(&path), "llvm/lib/clang/stddef.h");
    }
}
