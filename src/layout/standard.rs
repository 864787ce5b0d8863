//! Classic flat `/boot` layout.
//!
//! Everything for a kernel sits directly in the boot directory under a
//! well-known prefix followed by the version key, e.g. `vmlinuz-6.1.0`,
//! `System.map-6.1.0`, `initramfs-6.1.0.img`. Module trees are the
//! entries of the module directory. Renamed leftovers of the previous
//! kernel carry a `.old` suffix.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ImageErrorPolicy, Layout, LayoutError, ScanReport, SkippedImage};
use crate::file::{FileRole, KernelImage, ManagedFile, ModuleDirectory};
use crate::kernel::Kernel;

pub const DEFAULT_BOOT_DIR: &str = "/boot";
pub const DEFAULT_MODULE_DIR: &str = "/lib/modules";

const OLD_SUFFIX: &str = ".old";

#[derive(Debug, Clone, Copy)]
enum Root {
    Boot,
    Modules,
}

struct Rule {
    role: FileRole,
    root: Root,
    prefix: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        role: FileRole::Kernel,
        root: Root::Boot,
        prefix: "vmlinuz-",
    },
    Rule {
        role: FileRole::Kernel,
        root: Root::Boot,
        prefix: "vmlinux-",
    },
    Rule {
        role: FileRole::Kernel,
        root: Root::Boot,
        prefix: "kernel-",
    },
    Rule {
        role: FileRole::Kernel,
        root: Root::Boot,
        prefix: "bzImage-",
    },
    Rule {
        role: FileRole::SystemMap,
        root: Root::Boot,
        prefix: "System.map-",
    },
    Rule {
        role: FileRole::Config,
        root: Root::Boot,
        prefix: "config-",
    },
    Rule {
        role: FileRole::Initramfs,
        root: Root::Boot,
        prefix: "initramfs-",
    },
    Rule {
        role: FileRole::Initramfs,
        root: Root::Boot,
        prefix: "initrd-",
    },
    Rule {
        role: FileRole::Modules,
        root: Root::Modules,
        prefix: "",
    },
];

/// Flat `/boot` plus `/lib/modules/<version>` layout.
#[derive(Debug, Clone)]
pub struct StdLayout {
    boot_dir: PathBuf,
    module_dir: PathBuf,
    exclusions: BTreeSet<FileRole>,
    on_image_error: ImageErrorPolicy,
}

impl Default for StdLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BOOT_DIR, DEFAULT_MODULE_DIR)
    }
}

impl StdLayout {
    pub fn new(boot_dir: impl Into<PathBuf>, module_dir: impl Into<PathBuf>) -> Self {
        Self {
            boot_dir: boot_dir.into(),
            module_dir: module_dir.into(),
            exclusions: BTreeSet::new(),
            on_image_error: ImageErrorPolicy::default(),
        }
    }

    /// Ignore files of these roles entirely.
    pub fn with_exclusions(mut self, roles: impl IntoIterator<Item = FileRole>) -> Self {
        self.exclusions.extend(roles);
        self
    }

    pub fn with_image_error_policy(mut self, policy: ImageErrorPolicy) -> Self {
        self.on_image_error = policy;
        self
    }

    pub fn boot_dir(&self) -> &Path {
        &self.boot_dir
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn is_excluded(&self, role: FileRole) -> bool {
        self.exclusions.contains(&role)
    }

    fn root(&self, root: Root) -> &Path {
        match root {
            Root::Boot => &self.boot_dir,
            Root::Modules => &self.module_dir,
        }
    }
}

impl Layout for StdLayout {
    fn name(&self) -> &'static str {
        "std"
    }

    fn find_kernels(&self) -> Result<ScanReport, LayoutError> {
        let mut scan = Scan::new(self);

        for rule in RULES {
            if self.is_excluded(rule.role) {
                continue;
            }
            for (path, suffix) in list_prefixed(self.root(rule.root), rule.prefix)? {
                let key = version_key(rule.role, &suffix);
                scan.add(rule.role, path, key)?;
            }
        }

        let report = scan.finish();
        log::info!(
            "found {} kernel(s) in {} and {} ({} image(s) skipped)",
            report.kernels.len(),
            self.boot_dir.display(),
            self.module_dir.display(),
            report.skipped.len()
        );
        Ok(report)
    }
}

/// Device and inode; two paths with the same id are the same directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    fn of(path: &Path) -> Option<Self> {
        fs::metadata(path).ok().map(|meta| FileId {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

struct Scan<'a> {
    layout: &'a StdLayout,
    kernels: Vec<Kernel>,
    index: HashMap<String, usize>,
    seen: HashSet<FileId>,
    skipped: Vec<SkippedImage>,
}

impl<'a> Scan<'a> {
    fn new(layout: &'a StdLayout) -> Self {
        Self {
            layout,
            kernels: Vec::new(),
            index: HashMap::new(),
            seen: HashSet::new(),
            skipped: Vec::new(),
        }
    }

    fn kernel_index(&mut self, version: &str) -> usize {
        if let Some(&idx) = self.index.get(version) {
            return idx;
        }
        let idx = self.kernels.len();
        self.kernels.push(Kernel::new(version));
        self.index.insert(version.to_string(), idx);
        idx
    }

    fn remember(&mut self, path: &Path) {
        if let Some(id) = FileId::of(path) {
            self.seen.insert(id);
        }
    }

    fn add(&mut self, role: FileRole, path: PathBuf, key: String) -> Result<(), LayoutError> {
        log::debug!("{} matches {} for {}", path.display(), role, key);
        match role {
            FileRole::Kernel => self.add_image(path, &key),
            FileRole::Modules => self.add_modules(path, &key),
            FileRole::SystemMap | FileRole::Config | FileRole::Initramfs | FileRole::Build => {
                let file = ManagedFile::new(&path, role).map_err(|source| LayoutError::Io {
                    path: path.clone(),
                    source,
                })?;
                self.remember(&path);
                let idx = self.kernel_index(&key);
                let kernel = &mut self.kernels[idx];
                match role {
                    FileRole::SystemMap => kernel.set_system_map(file)?,
                    FileRole::Config => kernel.set_config(file)?,
                    FileRole::Initramfs => kernel.set_initramfs(file)?,
                    // Build
                    _ => kernel.set_build(file)?,
                }
                Ok(())
            }
            FileRole::Misc | FileRole::EmptyDir => {
                log::debug!("{} has no slot in a kernel, ignoring it", path.display());
                Ok(())
            }
        }
    }

    fn add_image(&mut self, path: PathBuf, key: &str) -> Result<(), LayoutError> {
        let image = match KernelImage::open(&path) {
            Ok(image) => image,
            Err(error) => match self.layout.on_image_error {
                ImageErrorPolicy::Collect => {
                    log::warn!("skipping kernel file {}: {}", path.display(), error);
                    self.skipped.push(SkippedImage { path, error });
                    return Ok(());
                }
                ImageErrorPolicy::FailFast => {
                    return Err(LayoutError::Image {
                        path,
                        source: error,
                    })
                }
            },
        };
        self.remember(&path);
        let real_version = image.internal_version().to_string();
        let idx = self.kernel_index(key);
        self.kernels[idx].set_image(image)?;

        // A version names exactly one entry of the module directory.
        if real_version.is_empty()
            || real_version == "."
            || real_version == ".."
            || real_version.contains('/')
        {
            log::warn!(
                "{} reports unusable version '{}', not looking up its modules",
                path.display(),
                real_version
            );
            return Ok(());
        }

        let modules_path = self.layout.module_dir.join(&real_version);
        if !self.layout.is_excluded(FileRole::Modules) && modules_path.is_dir() {
            let modules = ModuleDirectory::new(&modules_path).map_err(|source| LayoutError::Io {
                path: modules_path.clone(),
                source,
            })?;
            self.kernels[idx].set_modules(modules)?;
            self.remember(&modules_path);
        }

        let build_path = modules_path.join("build");
        if !self.layout.is_excluded(FileRole::Build) && build_path.is_dir() {
            let build = ManagedFile::new(&build_path, FileRole::Build).map_err(|source| {
                LayoutError::Io {
                    path: build_path.clone(),
                    source,
                }
            })?;
            self.kernels[idx].set_build(build)?;
            self.remember(&build_path);
        }
        Ok(())
    }

    fn add_modules(&mut self, path: PathBuf, key: &str) -> Result<(), LayoutError> {
        if let Some(id) = FileId::of(&path) {
            if self.seen.contains(&id) {
                log::debug!("{} already matched under another name", path.display());
                return Ok(());
            }
        }

        let modules = ModuleDirectory::new(&path).map_err(|source| LayoutError::Io {
            path: path.clone(),
            source,
        })?;
        self.remember(&path);
        let idx = self.kernel_index(key);
        self.kernels[idx].set_modules(modules)?;

        let build_path = path.join("build");
        if !self.layout.is_excluded(FileRole::Build) && build_path.is_dir() {
            let build = ManagedFile::new(&build_path, FileRole::Build).map_err(|source| {
                LayoutError::Io {
                    path: build_path.clone(),
                    source,
                }
            })?;
            self.kernels[idx].set_build(build)?;
        }

        let old_key = format!("{}{}", key, OLD_SUFFIX);
        if let Some(&old_idx) = self.index.get(&old_key) {
            let modules = self.kernels[idx].modules().cloned();
            let build = self.kernels[idx].build().cloned();
            let old = &mut self.kernels[old_idx];
            if let Some(modules) = &modules {
                if old.inherit_modules(modules) {
                    log::debug!("{} shares modules with {}", old_key, key);
                }
            }
            if let Some(build) = &build {
                old.inherit_build(build);
            }
        }
        Ok(())
    }

    /// Some distributions rename only the image to `.old`; let the old
    /// kernel keep pointing at the map and config it was installed with.
    fn finish(mut self) -> ScanReport {
        for idx in 0..self.kernels.len() {
            let old_key = format!("{}{}", self.kernels[idx].version(), OLD_SUFFIX);
            let old_idx = match self.index.get(&old_key) {
                Some(&old_idx) => old_idx,
                None => continue,
            };

            let system_map = self.kernels[idx].system_map().cloned();
            let config = self.kernels[idx].config().cloned();
            let old = &mut self.kernels[old_idx];
            if let Some(map) = &system_map {
                if old.inherit_system_map(map) {
                    log::debug!("{} inherits {}", old_key, map.path().display());
                }
            }
            if let Some(config) = &config {
                if old.inherit_config(config) {
                    log::debug!("{} inherits {}", old_key, config.path().display());
                }
            }
        }

        ScanReport {
            kernels: self.kernels,
            skipped: self.skipped,
        }
    }
}

/// Version key for a file name suffix.
///
/// Initramfs images drop their `.img` extension but keep a `.old` marker:
/// `5.10.0.img` becomes `5.10.0` and `5.10.0.img.old` becomes `5.10.0.old`.
fn version_key(role: FileRole, suffix: &str) -> String {
    if role == FileRole::Initramfs {
        if let Some(version) = suffix.strip_suffix(".img") {
            return version.to_string();
        }
        if let Some(version) = suffix.strip_suffix(".img.old") {
            return format!("{}{}", version, OLD_SUFFIX);
        }
    }
    suffix.to_string()
}

/// Entries of `dir` whose names start with `prefix`, sorted by name,
/// paired with the rest of the name.
///
/// A missing directory has no entries. An empty prefix skips dot-entries,
/// like a shell `*` would.
fn list_prefixed(dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, String)>, LayoutError> {
    if !dir.is_dir() {
        log::debug!("{} does not exist, nothing to scan", dir.display());
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| LayoutError::Io {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;

        let name = match entry.file_name().to_str() {
            Some(name) => name,
            None => {
                log::debug!("skipping non-UTF-8 name {}", entry.path().display());
                continue;
            }
        };
        if prefix.is_empty() && name.starts_with('.') {
            continue;
        }
        if let Some(suffix) = name.strip_prefix(prefix) {
            found.push((entry.path().to_path_buf(), suffix.to_string()));
        }
    }
    Ok(found)
}
