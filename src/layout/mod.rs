//! Boot layouts: where kernels live and how their files are named.
//!
//! A [`Layout`] walks the directories it knows about and groups what it
//! finds into [`Kernel`]s. Only the classic flat `/boot` layout is
//! provided ([`StdLayout`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use kernel_inventory::layout::{Layout, StdLayout};
//!
//! let report = StdLayout::default().find_kernels()?;
//! for kernel in &report.kernels {
//!     println!("{} ({} files)", kernel.version(), kernel.all_files().count());
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::image::ImageError;
use crate::kernel::{Kernel, SlotCollision};

pub mod standard;

pub use standard::StdLayout;

/// A source of installed kernels.
pub trait Layout {
    /// Short identifier, e.g. `"std"`.
    fn name(&self) -> &'static str;

    /// Scan the filesystem and group files into kernels.
    fn find_kernels(&self) -> Result<ScanReport, LayoutError>;
}

/// What to do when a kernel image cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageErrorPolicy {
    /// Record the image in [`ScanReport::skipped`] and keep scanning.
    #[default]
    Collect,
    /// Abort the scan with [`LayoutError::Image`].
    FailFast,
}

/// A kernel image left out of the scan because its version was unreadable.
#[derive(Debug)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub error: ImageError,
}

/// Result of a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Kernels in discovery order. Order carries no meaning.
    pub kernels: Vec<Kernel>,
    pub skipped: Vec<SkippedImage>,
}

impl ScanReport {
    pub fn kernel(&self, version: &str) -> Option<&Kernel> {
        self.kernels.iter().find(|k| k.version() == version)
    }
}

/// Fatal scan errors.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(transparent)]
    Collision(#[from] SlotCollision),

    #[error("kernel file {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("scanning {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
