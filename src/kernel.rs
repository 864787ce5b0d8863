//! Logical kernels assembled from the files found on disk.
//!
//! A [`Kernel`] groups everything installed for one version key: image,
//! symbol map, config, initramfs, module tree and build directory. Each
//! slot holds at most one file. Filling a slot twice with different paths
//! is a [`SlotCollision`], since it means the version key no longer
//! identifies a single kernel.

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

use crate::file::{FileRole, KernelImage, ManagedFile, ModuleDirectory};

/// Two different files claim the same slot of one kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("colliding {role} files for kernel {version}: {} and {}", .existing.display(), .incoming.display())]
pub struct SlotCollision {
    pub role: FileRole,
    pub version: String,
    pub existing: PathBuf,
    pub incoming: PathBuf,
}

/// All files belonging to one kernel version key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    version: String,
    image: Option<KernelImage>,
    system_map: Option<ManagedFile>,
    config: Option<ManagedFile>,
    initramfs: Option<ManagedFile>,
    modules: Option<ModuleDirectory>,
    build: Option<ManagedFile>,
}

impl Kernel {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            image: None,
            system_map: None,
            config: None,
            initramfs: None,
            modules: None,
            build: None,
        }
    }

    /// Version key derived from file names (may end in `.old`).
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_old(&self) -> bool {
        self.version.ends_with(".old")
    }

    pub fn image(&self) -> Option<&KernelImage> {
        self.image.as_ref()
    }

    pub fn system_map(&self) -> Option<&ManagedFile> {
        self.system_map.as_ref()
    }

    pub fn config(&self) -> Option<&ManagedFile> {
        self.config.as_ref()
    }

    pub fn initramfs(&self) -> Option<&ManagedFile> {
        self.initramfs.as_ref()
    }

    pub fn modules(&self) -> Option<&ModuleDirectory> {
        self.modules.as_ref()
    }

    pub fn build(&self) -> Option<&ManagedFile> {
        self.build.as_ref()
    }

    pub fn set_image(&mut self, image: KernelImage) -> Result<(), SlotCollision> {
        occupy(&mut self.image, image, FileRole::Kernel, &self.version)
    }

    pub fn set_system_map(&mut self, file: ManagedFile) -> Result<(), SlotCollision> {
        occupy(&mut self.system_map, file, FileRole::SystemMap, &self.version)
    }

    pub fn set_config(&mut self, file: ManagedFile) -> Result<(), SlotCollision> {
        occupy(&mut self.config, file, FileRole::Config, &self.version)
    }

    pub fn set_initramfs(&mut self, file: ManagedFile) -> Result<(), SlotCollision> {
        occupy(&mut self.initramfs, file, FileRole::Initramfs, &self.version)
    }

    pub fn set_modules(&mut self, modules: ModuleDirectory) -> Result<(), SlotCollision> {
        occupy(&mut self.modules, modules, FileRole::Modules, &self.version)
    }

    pub fn set_build(&mut self, file: ManagedFile) -> Result<(), SlotCollision> {
        occupy(&mut self.build, file, FileRole::Build, &self.version)
    }

    /// Route a plain file to the slot matching its role.
    ///
    /// Images and module trees carry extra data and go through
    /// [`Kernel::set_image`] and [`Kernel::set_modules`] instead, so those
    /// roles (and roles with no slot) are handed back unchanged.
    pub fn assign(&mut self, file: ManagedFile) -> Result<Option<ManagedFile>, SlotCollision> {
        match file.role() {
            FileRole::SystemMap => self.set_system_map(file)?,
            FileRole::Config => self.set_config(file)?,
            FileRole::Initramfs => self.set_initramfs(file)?,
            FileRole::Build => self.set_build(file)?,
            _ => return Ok(Some(file)),
        }
        Ok(None)
    }

    pub fn inherit_system_map(&mut self, file: &ManagedFile) -> bool {
        fill(&mut self.system_map, file)
    }

    pub fn inherit_config(&mut self, file: &ManagedFile) -> bool {
        fill(&mut self.config, file)
    }

    pub fn inherit_modules(&mut self, modules: &ModuleDirectory) -> bool {
        fill(&mut self.modules, modules)
    }

    pub fn inherit_build(&mut self, file: &ManagedFile) -> bool {
        fill(&mut self.build, file)
    }

    /// Present members, in slot order.
    pub fn all_files(&self) -> impl Iterator<Item = &ManagedFile> {
        [
            self.image.as_ref().map(KernelImage::file),
            self.system_map.as_ref(),
            self.config.as_ref(),
            self.initramfs.as_ref(),
            self.modules.as_ref().map(ModuleDirectory::file),
            self.build.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Version the image reports about itself, if there is an image.
    pub fn real_kernel_version(&self) -> Option<&str> {
        self.image.as_ref().map(KernelImage::internal_version)
    }

    /// Newest modification time among the members that can be stat'ed.
    pub fn mtime(&self) -> Option<SystemTime> {
        self.all_files()
            .filter_map(|f| fs::symlink_metadata(f.path()).ok())
            .filter_map(|meta| meta.modified().ok())
            .max()
    }
}

fn occupy<T: AsRef<ManagedFile>>(
    slot: &mut Option<T>,
    file: T,
    role: FileRole,
    version: &str,
) -> Result<(), SlotCollision> {
    if let Some(existing) = slot.as_ref() {
        if existing.as_ref().path() != file.as_ref().path() {
            return Err(SlotCollision {
                role,
                version: version.to_string(),
                existing: existing.as_ref().path().to_path_buf(),
                incoming: file.as_ref().path().to_path_buf(),
            });
        }
        return Ok(());
    }
    *slot = Some(file);
    Ok(())
}

fn fill<T: Clone>(slot: &mut Option<T>, file: &T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(file.clone());
    true
}
