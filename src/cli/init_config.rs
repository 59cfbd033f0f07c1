use super::config::{default_config_path, default_storage_path, TrustChainConfig};
use std::path::PathBuf;

/// Write a commented default configuration file
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn execute(path: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    TrustChainConfig::create_default(&config_path, &default_storage_path(&config_path))?;
    println!("📝 Created: {}", config_path.display());
    Ok(())
}
