//! Platform drive/volume enumeration strategies
//!
//! The virtual root is synthetic: listing it enumerates mounted drives or
//! volumes rather than a real directory. The strategy is selected once at
//! provider construction based on the host platform family.

use std::fs;
use std::path::{Path, PathBuf};

use crate::ipc::messages::FsEntry;

/// Enumerates mounted drives/volumes as synthetic directory entries
pub trait DriveEnumerator: Send {
    fn drives(&self) -> Vec<FsEntry>;
}

/// Strategy for the compile-time host family
pub fn platform_strategy() -> Box<dyn DriveEnumerator> {
    #[cfg(windows)]
    {
        Box::new(DriveLetters)
    }
    #[cfg(not(windows))]
    {
        Box::new(MountedVolumes)
    }
}

/// Drive/volume entries are always directories with zero size and no
/// modified time
fn drive_entry(name: &str, path: &str) -> FsEntry {
    FsEntry {
        name: name.to_string(),
        is_directory: true,
        path: path.to_string(),
        size: 0,
        modified_ms: None,
    }
}

/// Windows family: probe drive letters `A:\` through `Z:\` for existence
pub struct DriveLetters;

impl DriveEnumerator for DriveLetters {
    fn drives(&self) -> Vec<FsEntry> {
        let mut drives = Vec::new();
        for letter in b'A'..=b'Z' {
            let drive = format!("{}:\\", letter as char);
            if Path::new(&drive).exists() {
                drives.push(drive_entry(&drive, &drive));
            }
        }
        drives
    }
}

/// Unix family: the filesystem root plus volumes under the usual mount bases
pub struct MountedVolumes;

/// Bases whose children are volumes (one extra per-user level for the first
/// two)
const USER_MOUNT_BASES: &[&str] = &["/run/media", "/media"];
const FLAT_MOUNT_BASES: &[&str] = &["/mnt", "/Volumes"];

fn subdirectories(path: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(path) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect()
}

fn volume_entry(path: &Path) -> FsEntry {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    drive_entry(&name, &path.display().to_string())
}

impl DriveEnumerator for MountedVolumes {
    fn drives(&self) -> Vec<FsEntry> {
        let mut drives = vec![drive_entry("/", "/")];
        for base in USER_MOUNT_BASES {
            for user_dir in subdirectories(Path::new(base)) {
                for volume in subdirectories(&user_dir) {
                    drives.push(volume_entry(&volume));
                }
            }
        }
        for base in FLAT_MOUNT_BASES {
            for volume in subdirectories(Path::new(base)) {
                drives.push(volume_entry(&volume));
            }
        }
        drives
    }
}
