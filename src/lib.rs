//! Discovery of installed kernels and their boot artifacts.
//!
//! This crate finds kernel images, module trees, initramfs images, symbol
//! maps, configs and build links on a filesystem and groups them into
//! logical [`Kernel`]s that can be inspected or removed as a unit.
//!
//! - **`image`** - reads the version a kernel image reports about itself
//!   (raw or compressed streams, PE/EFI containers, x86 boot setup headers)
//! - **`file`** - file roles and per-role removal
//! - **`kernel`** - the per-version aggregate and its slot rules
//! - **`layout`** - directory scanners; the classic `/boot` one is [`StdLayout`]
//!
//! # Example
//!
//! ```rust,ignore
//! use kernel_inventory::{Layout, StdLayout};
//!
//! let report = StdLayout::default().find_kernels()?;
//! for kernel in &report.kernels {
//!     for file in kernel.all_files() {
//!         println!("{}: {}", kernel.version(), file);
//!     }
//! }
//! ```
//!
//! Deciding which kernels to remove is left to the caller. Removal itself
//! goes through [`ManagedFile::remove`].

pub mod config;
pub mod file;
pub mod image;
pub mod kernel;
pub mod layout;
pub mod logging;

pub use config::{load_config, ScanConfig};
pub use file::{FileRole, KernelImage, ManagedFile, ModuleDirectory, RemovalOutcome};
pub use image::{parse_version, Codec, ImageError};
pub use kernel::{Kernel, SlotCollision};
pub use layout::{ImageErrorPolicy, Layout, LayoutError, ScanReport, SkippedImage, StdLayout};
