//! Write a default configuration file.

use std::path::PathBuf;

use deid_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_file_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    // Start from defaults, keeping only the verbosity already applied.
    let mut fresh = AppConfig::default();
    fresh.logging.level = config.logging.level.clone();
    fresh.save_to(&path)?;

    println!("Wrote configuration to {}", path.display());
    println!("  Model weights: {}", fresh.model.weights.display());
    println!("  Working dir:   {}", fresh.paths.working_dir.display());
    println!("  Shared dir:    {}", fresh.paths.shared_dir.display());
    Ok(())
}
