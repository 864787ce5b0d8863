//! Kernel image files.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::{FileRole, ManagedFile};
use crate::image::{self, ImageError};

/// A kernel image together with the version it reports about itself.
///
/// The internal version comes from the image bytes, not the file name, so
/// `vmlinuz-custom` may well report `6.6.13-gentoo`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KernelImage {
    file: ManagedFile,
    internal_version: String,
}

impl KernelImage {
    /// Open `path` and read its internal version.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let file = ManagedFile::new(path, FileRole::Kernel)?;
        let mut reader = BufReader::new(File::open(file.path())?);
        let internal_version = image::parse_version(&mut reader)?;
        log::debug!(
            "{}: internal version {}",
            file.path().display(),
            internal_version
        );
        Ok(Self {
            file,
            internal_version,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file(&self) -> &ManagedFile {
        &self.file
    }

    pub fn internal_version(&self) -> &str {
        &self.internal_version
    }
}

impl AsRef<ManagedFile> for KernelImage {
    fn as_ref(&self) -> &ManagedFile {
        &self.file
    }
}

impl fmt::Debug for KernelImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KernelImage({:?}, {:?})",
            self.file.path(),
            self.internal_version
        )
    }
}

impl fmt::Display for KernelImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.file, self.internal_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn open_reads_internal_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vmlinuz-custom");
        fs::write(
            &path,
            b"\x7fELF....Linux version 6.6.13-gentoo (root@build) #1 SMP\0",
        )
        .unwrap();

        let image = KernelImage::open(&path).unwrap();
        assert_eq!(image.internal_version(), "6.6.13-gentoo");
        assert_eq!(image.path(), path);
        assert_eq!(image.as_ref().role(), FileRole::Kernel);
        assert!(image.to_string().ends_with("(vmlinuz) [6.6.13-gentoo]"));
    }

    #[test]
    fn open_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = KernelImage::open(temp.path().join("vmlinuz-1.0")).unwrap_err();
        assert!(matches!(err, ImageError::Io(_)));
    }

    #[test]
    fn open_unrecognized() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vmlinuz-1.0");
        fs::write(&path, b"not a kernel at all").unwrap();

        let err = KernelImage::open(&path).unwrap_err();
        assert!(matches!(err, ImageError::Unrecognized(_)));
    }
}
