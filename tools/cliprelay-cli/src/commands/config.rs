//! Manage the configuration file.

use cliprelay_common::config::{config_file_path, AppConfig};

pub fn init(force: bool) -> anyhow::Result<()> {
    let path = config_file_path();
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    AppConfig::default().save()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.store.api_key.is_some() {
        shown.store.api_key = Some("********".to_string());
    }
    println!("# {}", config_file_path().display());
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
