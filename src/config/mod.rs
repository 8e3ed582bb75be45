mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = ["./config.toml", "./vodforge.toml", "/etc/vodforge/config.toml"];

    for path_str in default_paths {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.pipeline.chunk_secs <= 0.0 {
        anyhow::bail!("chunk_secs must be positive");
    }

    if config.pipeline.worker_concurrency == 0 {
        anyhow::bail!("worker_concurrency cannot be 0");
    }

    if config.pipeline.max_attempts == 0 {
        anyhow::bail!("max_attempts cannot be 0");
    }

    if config.pipeline.transcode_timeout_secs == 0 {
        anyhow::bail!("transcode_timeout_secs cannot be 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.pipeline.chunk_secs, 4.0);
        assert_eq!(config.pipeline.max_attempts, 3);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            root = "/var/lib/vodforge"

            [pipeline]
            chunk_secs = 6.0
            worker_concurrency = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.root, std::path::PathBuf::from("/var/lib/vodforge"));
        assert_eq!(config.pipeline.chunk_secs, 6.0);
        assert_eq!(config.pipeline.worker_concurrency, 4);
        // Unspecified fields keep their defaults.
        assert_eq!(config.pipeline.max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.pipeline.chunk_secs = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.pipeline.worker_concurrency = 0;
        assert!(validate_config(&config).is_err());
    }
}
