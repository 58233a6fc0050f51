//! Guest file-descriptor table and path sandboxing.
//!
//! Grounded on `include/arion/common/file_system_manager.hpp`'s
//! `ARION_FILE`/`FileSystemManager`. Serialization of table entries is
//! handled through `serde` rather than a hand-rolled
//! `serialize_arion_file`/`deserialize_arion_file` byte-vector pair.

use crate::error::{ArionResult, FsError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArionFile {
    pub fd: i32,
    pub path: String,
    pub flags: i32,
    pub mode: u32,
    pub saved_off: i64,
    /// A real host fd backing this entry directly (pipes, dup'd stdio) for
    /// descriptors that have no sandbox path to reopen by.
    pub host_fd: Option<i32>,
}

impl ArionFile {
    pub fn new(fd: i32, path: impl Into<String>, flags: i32, mode: u32) -> Self {
        Self {
            fd,
            path: path.into(),
            flags,
            mode,
            saved_off: 0,
            host_fd: None,
        }
    }

    pub fn with_host_fd(fd: i32, path: impl Into<String>, host_fd: i32) -> Self {
        Self {
            fd,
            path: path.into(),
            flags: 0,
            mode: 0,
            saved_off: 0,
            host_fd: Some(host_fd),
        }
    }
}

#[derive(Clone)]
pub struct FileSystemManager {
    pub files: HashMap<i32, ArionFile>,
    fs_path: PathBuf,
    cwd_path: String,
}

impl FileSystemManager {
    pub fn initialize(fs_path: impl Into<PathBuf>, cwd_path: impl Into<String>) -> Self {
        let mut files = HashMap::new();
        // Guest fd 0/1/2 pre-seeded to the host's stdio.
        for (fd, name) in [(0, "stdin"), (1, "stdout"), (2, "stderr")] {
            files.insert(fd, ArionFile::new(fd, format!("/dev/{name}"), 0, 0));
        }
        Self {
            files,
            fs_path: fs_path.into(),
            cwd_path: cwd_path.into(),
        }
    }

    pub fn get_fs_path(&self) -> &Path {
        &self.fs_path
    }

    pub fn get_cwd_path(&self) -> &str {
        &self.cwd_path
    }

    pub fn set_cwd_path(&mut self, cwd: impl Into<String>) {
        self.cwd_path = cwd.into();
    }

    pub fn add_file_entry(&mut self, target_fd: i32, file: ArionFile, safe: bool) -> ArionResult<()> {
        if safe && self.files.contains_key(&target_fd) {
            return Err(FsError::FdInUse(target_fd).into());
        }
        self.files.insert(target_fd, file);
        Ok(())
    }

    pub fn has_file_entry(&self, target_fd: i32) -> bool {
        self.files.contains_key(&target_fd)
    }

    pub fn rm_file_entry(&mut self, target_fd: i32) {
        self.files.remove(&target_fd);
    }

    pub fn get_arion_file(&self, target_fd: i32) -> ArionResult<&ArionFile> {
        self.files.get(&target_fd).ok_or(FsError::NoSuchFd(target_fd).into())
    }

    pub fn get_arion_file_mut(&mut self, target_fd: i32) -> ArionResult<&mut ArionFile> {
        self.files.get_mut(&target_fd).ok_or(FsError::NoSuchFd(target_fd).into())
    }

    /// Whether `path`, once resolved, lies under the sandbox root.
    pub fn is_in_fs(&self, path: &str) -> bool {
        self.to_fs_path_checked(path).is_ok()
    }

    /// `to_fs_path(path)`: rewrites a guest path into the host path inside
    /// the sandbox, rejecting anything that escapes `fs_root` after symlink
    /// resolution.
    pub fn to_fs_path(&self, path: &str) -> ArionResult<PathBuf> {
        self.to_fs_path_checked(path)
    }

    fn to_fs_path_checked(&self, path: &str) -> ArionResult<PathBuf> {
        let candidate = if path.starts_with('/') {
            self.fs_path.join(path.trim_start_matches('/'))
        } else {
            self.fs_path.join(&self.cwd_path).join(path)
        };

        let root_canon = self.fs_path.canonicalize().unwrap_or_else(|_| self.fs_path.clone());
        let resolved = normalize_lexically(&candidate);
        let resolved_canon = resolved.canonicalize().unwrap_or(resolved.clone());

        if resolved_canon.starts_with(&root_canon) || resolved.starts_with(&self.fs_path) {
            Ok(resolved)
        } else {
            Err(FsError::Sandbox(path.to_string()).into())
        }
    }

    /// Host-side helper mirroring the original's static `find_fd_path`: best
    /// effort resolution of what host path a raw fd currently points at.
    pub fn find_fd_path(fd: i32) -> Option<String> {
        std::fs::read_link(format!("/proc/self/fd/{fd}"))
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

/// Lexical `..`/`.` collapsing without requiring the path to exist, so a
/// sandbox escape via `../../etc/passwd` is caught even when nothing at that
/// path exists yet (e.g. inside `open(..., O_CREAT)`).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_fds_are_preseeded() {
        let fs = FileSystemManager::initialize("/tmp/root", "/");
        assert!(fs.has_file_entry(0));
        assert!(fs.has_file_entry(1));
        assert!(fs.has_file_entry(2));
    }

    #[test]
    fn escaping_path_is_rejected() {
        let fs = FileSystemManager::initialize("/tmp/arion-root", "/");
        assert!(fs.to_fs_path("/../../etc/passwd").is_err());
    }

    #[test]
    fn in_sandbox_path_is_accepted() {
        let fs = FileSystemManager::initialize("/tmp/arion-root", "/");
        let resolved = fs.to_fs_path("/bin/ls").unwrap();
        assert!(resolved.starts_with("/tmp/arion-root"));
    }

    #[test]
    fn no_two_entries_share_a_fd() {
        let mut fs = FileSystemManager::initialize("/tmp/root", "/");
        let res = fs.add_file_entry(1, ArionFile::new(1, "/x", 0, 0), true);
        assert!(res.is_err());
    }
}
