//! Kernel-related files and how each kind is removed.
//!
//! Every path the scanner picks up becomes a [`ManagedFile`] tagged with a
//! [`FileRole`]. The role decides the removal strategy:
//!
//! - plain files (images, maps, configs, initramfs) are unlinked
//! - module trees and build directories are removed recursively
//! - stray parent directories are removed only if they are empty
//!
//! Kernel images and module trees carry extra data and live in
//! [`image`] and [`modules`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod image;
pub mod modules;

pub use image::KernelImage;
pub use modules::ModuleDirectory;

/// Role of a file within a kernel install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    #[serde(rename = "vmlinuz")]
    Kernel,
    #[serde(rename = "systemmap")]
    SystemMap,
    Config,
    Initramfs,
    Modules,
    Build,
    Misc,
    #[serde(rename = "emptydir")]
    EmptyDir,
}

impl FileRole {
    pub const ALL: [FileRole; 8] = [
        FileRole::Kernel,
        FileRole::SystemMap,
        FileRole::Config,
        FileRole::Initramfs,
        FileRole::Modules,
        FileRole::Build,
        FileRole::Misc,
        FileRole::EmptyDir,
    ];

    /// Name used in exclusion lists and reports.
    pub fn name(self) -> &'static str {
        match self {
            FileRole::Kernel => "vmlinuz",
            FileRole::SystemMap => "systemmap",
            FileRole::Config => "config",
            FileRole::Initramfs => "initramfs",
            FileRole::Modules => "modules",
            FileRole::Build => "build",
            FileRole::Misc => "misc",
            FileRole::EmptyDir => "emptydir",
        }
    }

    /// How files of this role are removed.
    pub fn removal(self) -> Removal {
        match self {
            FileRole::Kernel
            | FileRole::SystemMap
            | FileRole::Config
            | FileRole::Initramfs
            | FileRole::Misc => Removal::Unlink,
            FileRole::Modules | FileRole::Build => Removal::RemoveTree,
            FileRole::EmptyDir => Removal::RemoveIfEmpty,
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FileRole::ALL
            .into_iter()
            .find(|role| role.name() == wanted)
            .ok_or_else(|| {
                let known = FileRole::ALL.map(FileRole::name).join(", ");
                format!("unknown file role '{}' (expected one of: {})", s, known)
            })
    }
}

/// Removal strategy for a [`FileRole`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Unlink,
    RemoveTree,
    RemoveIfEmpty,
}

/// Result of [`ManagedFile::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    /// Directory still has content and was left in place.
    Kept,
    /// Path was already gone; nothing to do.
    AlreadyGone,
}

/// A filesystem path with an assigned role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedFile {
    path: PathBuf,
    role: FileRole,
}

impl ManagedFile {
    /// Wrap an existing path.
    ///
    /// Fails with `NotFound` if nothing exists at `path`. Dangling symlinks
    /// count as existing. Use [`ManagedFile::empty_dir`] for the one role
    /// that tolerates a missing path.
    pub fn new(path: impl Into<PathBuf>, role: FileRole) -> io::Result<Self> {
        let path = path.into();
        if role != FileRole::EmptyDir {
            fs::symlink_metadata(&path)?;
        }
        Ok(Self { path, role })
    }

    /// A parent directory to drop once it has been emptied.
    pub fn empty_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: FileRole::EmptyDir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    /// Remove the underlying filesystem object.
    ///
    /// A missing path is reported as [`RemovalOutcome::AlreadyGone`]. A
    /// non-empty directory with the [`FileRole::EmptyDir`] role is
    /// reported as [`RemovalOutcome::Kept`]. Other failures propagate.
    pub fn remove(&self) -> io::Result<RemovalOutcome> {
        let result = match self.role.removal() {
            Removal::Unlink => fs::remove_file(&self.path).map(|()| RemovalOutcome::Removed),
            Removal::RemoveTree => remove_tree(&self.path).map(|()| RemovalOutcome::Removed),
            Removal::RemoveIfEmpty => remove_if_empty(&self.path),
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} already gone", self.path.display());
                Ok(RemovalOutcome::AlreadyGone)
            }
            other => other,
        }
    }
}

impl AsRef<ManagedFile> for ManagedFile {
    fn as_ref(&self) -> &ManagedFile {
        self
    }
}

impl fmt::Display for ManagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.role)
    }
}

// Symlinks and stray files are unlinked, never followed.
fn remove_tree(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn remove_if_empty(path: &Path) -> io::Result<RemovalOutcome> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(RemovalOutcome::Removed),
        Err(e) if matches!(e.raw_os_error(), Some(libc::ENOTEMPTY) | Some(libc::EEXIST)) => {
            log::debug!("{} not empty, keeping it", path.display());
            Ok(RemovalOutcome::Kept)
        }
        Err(e) => Err(e),
    }
}
