//! Check the media engine and configuration.

use cliprelay_common::config::{config_file_path, AppConfig};
use cliprelay_media::binary_version;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("cliprelay System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for (label, path) in [
        ("ffmpeg", &config.extraction.ffmpeg_path),
        ("ffprobe", &config.extraction.ffprobe_path),
    ] {
        match binary_version(path).await {
            Some(version) => println!("[OK] {label}: {version}"),
            None => {
                println!("[MISSING] {label} not runnable at {}", path.display());
                ready = false;
            }
        }
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: defaults (no file at {})", config_path.display());
    }

    match config.validate() {
        Ok(()) => println!("[OK] Configuration is valid"),
        Err(e) => {
            println!("[ERROR] {e}");
            ready = false;
        }
    }

    if config.store.api_key.is_some() {
        println!("[OK] Asset store: {}", config.store.endpoint);
    } else {
        println!("[WARN] Asset store: no API key; segments will use local fallback");
    }

    match &config.locator.cache_dir {
        Some(dir) if dir.is_dir() => println!("[OK] Content cache: {}", dir.display()),
        Some(dir) => println!("[WARN] Content cache missing: {}", dir.display()),
        None => println!("[INFO] Content cache: not configured"),
    }
    println!("[INFO] Extraction mode: {:?}", config.extraction.mode);

    println!();
    if ready {
        println!("cliprelay is ready.");
    } else {
        println!("Some requirements are missing. See above.");
    }

    Ok(())
}
