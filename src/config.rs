//! Scan configuration, loaded from a TOML file.
//!
//! ```toml
//! [layout]
//! boot_dir = "/boot"
//! module_dir = "/lib/modules"
//! exclude = ["build"]
//! on_image_error = "fail-fast"
//! ```
//!
//! Every key is optional.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::file::FileRole;
use crate::layout::standard::{DEFAULT_BOOT_DIR, DEFAULT_MODULE_DIR};
use crate::layout::{ImageErrorPolicy, StdLayout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub boot_dir: PathBuf,
    pub module_dir: PathBuf,
    pub exclude: Vec<FileRole>,
    pub on_image_error: ImageErrorPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            boot_dir: PathBuf::from(DEFAULT_BOOT_DIR),
            module_dir: PathBuf::from(DEFAULT_MODULE_DIR),
            exclude: Vec::new(),
            on_image_error: ImageErrorPolicy::default(),
        }
    }
}

impl ScanConfig {
    pub fn layout(&self) -> StdLayout {
        StdLayout::new(&self.boot_dir, &self.module_dir)
            .with_exclusions(self.exclude.iter().copied())
            .with_image_error_policy(self.on_image_error)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    layout: Option<LayoutToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutToml {
    boot_dir: Option<PathBuf>,
    module_dir: Option<PathBuf>,
    exclude: Option<Vec<String>>,
    on_image_error: Option<String>,
}

pub fn load_config(config_path: &Path) -> Result<ScanConfig> {
    let text = fs::read_to_string(config_path)
        .with_context(|| format!("reading config '{}'", config_path.display()))?;
    parse_config(&text, config_path)
}

fn parse_config(text: &str, config_path: &Path) -> Result<ScanConfig> {
    let parsed: ConfigToml = toml::from_str(text)
        .with_context(|| format!("parsing config '{}'", config_path.display()))?;

    let mut config = ScanConfig::default();
    let layout = match parsed.layout {
        Some(layout) => layout,
        None => return Ok(config),
    };

    if let Some(boot_dir) = layout.boot_dir {
        config.boot_dir = boot_dir;
    }
    if let Some(module_dir) = layout.module_dir {
        config.module_dir = module_dir;
    }

    for name in layout.exclude.unwrap_or_default() {
        let role = match name.parse::<FileRole>() {
            Ok(role) => role,
            Err(e) => bail!(
                "invalid config '{}': layout.exclude: {}",
                config_path.display(),
                e
            ),
        };
        if !config.exclude.contains(&role) {
            config.exclude.push(role);
        }
    }

    if let Some(policy) = layout.on_image_error {
        config.on_image_error = match policy.trim().to_ascii_lowercase().as_str() {
            "collect" => ImageErrorPolicy::Collect,
            "fail-fast" => ImageErrorPolicy::FailFast,
            other => bail!(
                "invalid config '{}': layout.on_image_error must be 'collect' or 'fail-fast', got '{}'",
                config_path.display(),
                other
            ),
        };
    }

    Ok(config)
}
