use std::path::Path;

use anyhow::{bail, Context, Result};
use kernel_inventory::{load_config, logging, Layout, ScanConfig, ScanReport};

fn usage() -> &'static str {
    "Usage:\n  kernel-inventory list [config.toml]\n\nSet KERNEL_INVENTORY_LOG=debug for scan details."
}

fn main() -> Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("warning: logger already installed: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [list] if list == "list" => list_kernels(&ScanConfig::default()),
        [list, config] if list == "list" => list_kernels(&load_config(Path::new(config))?),
        _ => bail!(usage()),
    }
}

fn list_kernels(config: &ScanConfig) -> Result<()> {
    let layout = config.layout();
    let report = layout.find_kernels().with_context(|| {
        format!(
            "scanning '{}' and '{}' with the {} layout",
            config.boot_dir.display(),
            config.module_dir.display(),
            layout.name()
        )
    })?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    let mut kernels: Vec<_> = report.kernels.iter().collect();
    kernels.sort_by(|a, b| a.version().cmp(b.version()));

    for kernel in kernels {
        match kernel.real_kernel_version() {
            Some(real) if real != kernel.version() => {
                println!("{} (reports {})", kernel.version(), real)
            }
            _ => println!("{}", kernel.version()),
        }
        for file in kernel.all_files() {
            println!("  {:<10} {}", file.role().name(), file.path().display());
        }
    }

    for skipped in &report.skipped {
        println!("skipped {}: {}", skipped.path.display(), skipped.error);
    }
}
