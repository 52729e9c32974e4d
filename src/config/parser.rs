use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `[api] username`
pub const USERNAME_ENV: &str = "DANBOORU_USERNAME";

/// Environment variable overriding `[api] api-key`
pub const API_KEY_ENV: &str = "DANBOORU_API_KEY";

/// Loads and parses a configuration file from the given path
///
/// Credentials found in the environment replace those in the file before
/// validation runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use booru_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Page size: {}", config.api.page_size);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Replaces API credentials with values from `lookup` when present
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(username) = lookup(USERNAME_ENV).filter(|v| !v.trim().is_empty()) {
        config.api.username = Some(username.trim().to_string());
    }
    if let Some(api_key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
        config.api.api_key = Some(api_key.trim().to_string());
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with every crawl run so a resumed crawl can tell whether the
/// configuration changed in between.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
