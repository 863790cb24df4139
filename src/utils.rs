//! Small filesystem and FFI helpers shared across the crate.

use crate::error::{JudgeError, Result};
use std::ffi::CString;
use std::fs;
use std::path::Path;

/// Final path component of a slash-separated path, or the whole string when
/// no slash is present.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Convert a string to a `CString` for exec-style syscalls.
pub fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| JudgeError::Config(format!("interior NUL byte in `{s}`")))
}

/// Copy `src` to `dst`, creating or truncating `dst`.
pub fn copy_file(dst: &Path, src: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| {
        JudgeError::Sandbox(format!(
            "copy {} -> {}: {}",
            src.display(),
            dst.display(),
            e
        ))
    })?;
    Ok(())
}

/// Stage `src` at `dst` via hardlink, falling back to a copy when the link
/// crosses devices or the filesystem refuses it.
pub fn stage_link(dst: &Path, src: &Path) -> Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.raw_os_error(),
                Some(libc::EXDEV) | Some(libc::EPERM) | Some(libc::EMLINK)
            ) =>
        {
            log::debug!(
                "hardlink {} -> {} refused ({}), copying instead",
                src.display(),
                dst.display(),
                e
            );
            copy_file(dst, src)
        }
        Err(e) => Err(JudgeError::Sandbox(format!(
            "link {} -> {}: {}",
            src.display(),
            dst.display(),
            e
        ))),
    }
}

/// Remove a directory tree. Missing paths are not an error.
pub fn remove_dir_recursive(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JudgeError::Sandbox(format!(
            "remove {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_leading_directories() {
        assert_eq!(file_name("./abc_solution"), "abc_solution");
        assert_eq!(file_name("/usr/bin/g++"), "g++");
        assert_eq!(file_name("g++"), "g++");
        assert_eq!(file_name("a/b/"), "");
    }

    #[test]
    fn stage_link_creates_a_second_name_for_the_same_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dst = tmp.path().join("dst.txt");
        fs::write(&src, b"payload").unwrap();

        stage_link(&dst, &src).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn remove_dir_recursive_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("stage");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("file"), b"x").unwrap();

        remove_dir_recursive(&dir).unwrap();
        assert!(!dir.exists());
        remove_dir_recursive(&dir).unwrap();
    }

    #[test]
    fn c_string_rejects_interior_nul() {
        assert!(c_string("ok").is_ok());
        assert!(c_string("bad\0bad").is_err());
    }
}
