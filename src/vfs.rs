//! Virtual filesystem provider
//!
//! Normalizes real filesystem access behind a uniform request/response
//! contract for in-environment applications. Every operation catches failures
//! locally and returns a tagged [`FsError`]; nothing here raises an uncaught
//! fault. Results are never cached - listings always reflect live queries.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::constants::vfs::{HIDDEN_PREFIX, VIRTUAL_ROOT, WINDOWS_EXECUTABLE_EXTENSIONS};
use crate::ipc::messages::{FsEntry, FsError, PathInfo, SpecialPaths};

pub mod drives;

use drives::DriveEnumerator;

pub struct Vfs {
    drives: Box<dyn DriveEnumerator>,
    home: PathBuf,
}

impl Vfs {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        Self::with_parts(drives::platform_strategy(), home)
    }

    /// Provider with explicit drive strategy and home directory
    pub fn with_parts(drives: Box<dyn DriveEnumerator>, home: PathBuf) -> Self {
        // Canonical home makes the deletion guard robust against trailing
        // separators and symlinked representations
        let home = fs::canonicalize(&home).unwrap_or(home);
        Self { drives, home }
    }

    /// List a directory's immediate children
    ///
    /// The virtual-root sentinel enumerates mounted drives/volumes; an empty
    /// path substitutes the user's home directory. Hidden entries are
    /// excluded, directories sort before files, lexicographic within each
    /// group. A stat failure for one entry degrades that entry to defaults
    /// instead of failing the listing.
    pub fn list_directory(&self, path: &str) -> Result<Vec<FsEntry>, FsError> {
        if path == VIRTUAL_ROOT {
            return Ok(self.drives.drives());
        }
        let dir = if path.is_empty() {
            self.home.clone()
        } else {
            PathBuf::from(path)
        };

        let read = fs::read_dir(&dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FsError::NotFound {
                    path: dir.display().to_string(),
                }
            } else {
                FsError::io(e)
            }
        })?;

        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(FsError::io)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(HIDDEN_PREFIX) {
                continue;
            }
            let full = entry.path();
            let (is_directory, size, modified_ms) = match entry.metadata() {
                Ok(meta) => (
                    meta.is_dir(),
                    if meta.is_file() { meta.len() } else { 0 },
                    modified_unix_ms(&meta),
                ),
                Err(e) => {
                    debug!(path = %full.display(), error = %e, "Stat failed for entry, using defaults");
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    (is_dir, 0, None)
                }
            };
            entries.push(FsEntry {
                name,
                is_directory,
                path: full.display().to_string(),
                size,
                modified_ms,
            });
        }

        entries.sort_by(|a, b| match (a.is_directory, b.is_directory) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(entries)
    }

    /// Create a directory, refusing to overwrite an existing target
    pub fn create_folder(&self, path: &str) -> Result<(), FsError> {
        let target = Path::new(path);
        if target.exists() {
            return Err(FsError::AlreadyExists {
                path: path.to_string(),
            });
        }
        fs::create_dir(target).map_err(FsError::io)
    }

    /// Create a file with the given content, refusing to overwrite
    pub fn create_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let target = Path::new(path);
        if target.exists() {
            return Err(FsError::AlreadyExists {
                path: path.to_string(),
            });
        }
        fs::write(target, content).map_err(FsError::io)
    }

    /// Recursively remove a file or directory, tolerating prior absence
    ///
    /// The home directory and the filesystem root are refused for every
    /// textual representation of those paths.
    pub fn delete(&self, path: &str) -> Result<(), FsError> {
        let normalized = normalize(path);
        if normalized == self.home || normalized.parent().is_none() {
            return Err(FsError::Protected {
                path: path.to_string(),
            });
        }

        let meta = match fs::symlink_metadata(&normalized) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FsError::io(e)),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&normalized).map_err(FsError::io)
        } else {
            fs::remove_file(&normalized).map_err(FsError::io)
        }
    }

    /// Minimal metadata for an existing path; `None` when it cannot be
    /// inspected
    pub fn stat_path(&self, path: &str) -> Option<PathInfo> {
        let meta = fs::metadata(path).ok()?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        Some(PathInfo {
            name,
            is_directory: meta.is_dir(),
            path: path.to_string(),
        })
    }

    /// Launch a path with the host OS default handler
    ///
    /// Windows executables are refused on other host families with a
    /// descriptive error instead of a doomed launch attempt.
    pub fn open_path(&self, path: &str) -> Result<(), FsError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if !cfg!(windows) {
            if let Some(ext) = &extension {
                if WINDOWS_EXECUTABLE_EXTENSIONS.contains(&ext.as_str()) {
                    return Err(FsError::PlatformUnsupported {
                        path: path.to_string(),
                        reason: format!(
                            "Windows executable (.{ext}) cannot run on this host"
                        ),
                    });
                }
            }
        }
        open::that(path).map_err(FsError::io)
    }

    /// Virtual-root sentinel plus resolved well-known directories
    pub fn special_paths(&self) -> SpecialPaths {
        let resolve = |dir: Option<PathBuf>, fallback: &str| {
            dir.unwrap_or_else(|| self.home.join(fallback))
                .display()
                .to_string()
        };
        SpecialPaths {
            root: VIRTUAL_ROOT.to_string(),
            home: self.home.display().to_string(),
            downloads: resolve(dirs::download_dir(), "Downloads"),
            documents: resolve(dirs::document_dir(), "Documents"),
            desktop: resolve(dirs::desktop_dir(), "Desktop"),
        }
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

fn modified_unix_ms(meta: &fs::Metadata) -> Option<u64> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
}

/// Normalize a path for the deletion guard: canonical when the target exists,
/// component-cleaned otherwise (strips trailing separators and `.` parts)
fn normalize(path: &str) -> PathBuf {
    let p = Path::new(path);
    fs::canonicalize(p).unwrap_or_else(|_| p.components().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDrives;

    impl DriveEnumerator for NoDrives {
        fn drives(&self) -> Vec<FsEntry> {
            Vec::new()
        }
    }

    /// Scripted drive set standing in for a host with two mounted drives
    struct TwoDrives;

    impl DriveEnumerator for TwoDrives {
        fn drives(&self) -> Vec<FsEntry> {
            ["C:\\", "D:\\"]
                .iter()
                .map(|d| FsEntry {
                    name: d.to_string(),
                    is_directory: true,
                    path: d.to_string(),
                    size: 0,
                    modified_ms: None,
                })
                .collect()
        }
    }

    fn vfs_with_home(home: &Path) -> Vfs {
        Vfs::with_parts(Box::new(NoDrives), home.to_path_buf())
    }

    fn names(entries: &[FsEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_listing_sorts_directories_before_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zeta.txt"), "z").unwrap();
        fs::write(dir.path().join("alpha.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("music")).unwrap();
        fs::create_dir(dir.path().join("books")).unwrap();

        let vfs = vfs_with_home(dir.path());
        let entries = vfs
            .list_directory(&dir.path().display().to_string())
            .unwrap();
        assert_eq!(names(&entries), vec!["books", "music", "alpha.txt", "zeta.txt"]);
    }

    #[test]
    fn test_listing_is_order_stable() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        let vfs = vfs_with_home(dir.path());
        let path = dir.path().display().to_string();

        let first = vfs.list_directory(&path).unwrap();
        let second = vfs.list_directory(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hidden_entries_never_appear() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::create_dir(dir.path().join(".config")).unwrap();
        fs::write(dir.path().join("visible.txt"), "").unwrap();

        let vfs = vfs_with_home(dir.path());
        let entries = vfs
            .list_directory(&dir.path().display().to_string())
            .unwrap();
        assert_eq!(names(&entries), vec!["visible.txt"]);
    }

    #[test]
    fn test_empty_path_substitutes_home() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("greeting.txt"), "hi").unwrap();

        let vfs = vfs_with_home(dir.path());
        let entries = vfs.list_directory("").unwrap();
        assert_eq!(names(&entries), vec!["greeting.txt"]);
        assert_eq!(entries[0].size, 2);
        assert!(entries[0].modified_ms.is_some());
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        let missing = dir.path().join("nope").display().to_string();

        match vfs.list_directory(&missing) {
            Err(FsError::NotFound { path }) => assert!(path.contains("nope")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_virtual_root_lists_drives() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = Vfs::with_parts(Box::new(TwoDrives), dir.path().to_path_buf());

        let entries = vfs.list_directory(VIRTUAL_ROOT).unwrap();
        assert_eq!(names(&entries), vec!["C:\\", "D:\\"]);
        for entry in &entries {
            assert!(entry.is_directory);
            assert_eq!(entry.size, 0);
            assert_eq!(entry.modified_ms, None);
        }
    }

    #[test]
    fn test_create_folder_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        let target = dir.path().join("stuff").display().to_string();

        vfs.create_folder(&target).unwrap();
        match vfs.create_folder(&target) {
            Err(FsError::AlreadyExists { .. }) => {}
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        // Filesystem unchanged: still a directory
        assert!(dir.path().join("stuff").is_dir());
    }

    #[test]
    fn test_create_file_refuses_existing_and_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        let target = dir.path().join("note.txt").display().to_string();

        vfs.create_file(&target, "original").unwrap();
        match vfs.create_file(&target, "clobber") {
            Err(FsError::AlreadyExists { .. }) => {}
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(dir.path().join("note.txt")).unwrap(), "original");
    }

    #[test]
    fn test_delete_home_is_protected_in_every_representation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "").unwrap();
        let vfs = vfs_with_home(dir.path());

        let home = fs::canonicalize(dir.path()).unwrap().display().to_string();
        for repr in [home.clone(), format!("{home}/"), format!("{home}/.")] {
            match vfs.delete(&repr) {
                Err(FsError::Protected { .. }) => {}
                other => panic!("expected Protected for {repr:?}, got {other:?}"),
            }
        }
        // Nothing was removed
        assert!(dir.path().join("keep.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_filesystem_root_is_protected() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        for repr in ["/", "//", "/./"] {
            match vfs.delete(repr) {
                Err(FsError::Protected { .. }) => {}
                other => panic!("expected Protected for {repr:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_delete_is_recursive_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("f.txt"), "x").unwrap();
        let target = dir.path().join("a").display().to_string();

        vfs.delete(&target).unwrap();
        assert!(!dir.path().join("a").exists());
        // Already gone - still fine
        vfs.delete(&target).unwrap();
    }

    #[test]
    fn test_stat_path() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        let file = dir.path().join("report.pdf");
        fs::write(&file, "pdf").unwrap();

        let info = vfs.stat_path(&file.display().to_string()).unwrap();
        assert_eq!(info.name, "report.pdf");
        assert!(!info.is_directory);

        assert!(vfs
            .stat_path(&dir.path().join("ghost").display().to_string())
            .is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_refuses_windows_executables_on_unix() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        for name in ["setup.exe", "run.BAT", "install.Msi", "script.cmd"] {
            let path = dir.path().join(name).display().to_string();
            match vfs.open_path(&path) {
                Err(FsError::PlatformUnsupported { reason, .. }) => {
                    assert!(reason.contains("cannot run"));
                }
                other => panic!("expected PlatformUnsupported for {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_special_paths_carry_virtual_root_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_with_home(dir.path());
        let paths = vfs.special_paths();
        assert_eq!(paths.root, VIRTUAL_ROOT);
        assert_eq!(paths.home, fs::canonicalize(dir.path()).unwrap().display().to_string());
    }
}
