//! Kernel module trees (`/lib/modules/<version>`).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{FileRole, ManagedFile};

/// A module tree. Removed recursively.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModuleDirectory {
    file: ManagedFile,
}

impl ModuleDirectory {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        Ok(Self {
            file: ManagedFile::new(path, FileRole::Modules)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file(&self) -> &ManagedFile {
        &self.file
    }

    /// Target of the `build` link inside this tree.
    ///
    /// Relative link targets are resolved against the module directory.
    pub fn resolve_build_dir(&self) -> io::Result<PathBuf> {
        let target = fs::read_link(self.path().join("build"))?;
        Ok(self.path().join(target))
    }
}

impl AsRef<ManagedFile> for ModuleDirectory {
    fn as_ref(&self) -> &ManagedFile {
        &self.file
    }
}

impl fmt::Debug for ModuleDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleDirectory({:?})", self.file.path())
    }
}

impl fmt::Display for ModuleDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.file, f)
    }
}
