use crate::config::types::{
    ApiConfig, Config, CrawlerConfig, OutputConfig, RateLimitConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest page the listing API will serve in one call
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the remote API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.page_size < 1 || config.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, config.page_size
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.api_key.is_some() && config.username.is_none() {
        return Err(ConfigError::Validation(
            "api-key is set but username is missing".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates pacing and backoff tuning
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.base_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "base-interval-ms must be >= 1".to_string(),
        ));
    }

    if config.max_interval_ms < config.base_interval_ms {
        return Err(ConfigError::Validation(format!(
            "max-interval-ms ({}) must be >= base-interval-ms ({})",
            config.max_interval_ms, config.base_interval_ms
        )));
    }

    if config.escalation_threshold == 0 || config.recovery_threshold == 0 {
        return Err(ConfigError::Validation(
            "escalation-threshold and recovery-threshold must be >= 1".to_string(),
        ));
    }

    if !(config.initial_backoff_secs > 0.0)
        || !(config.min_backoff_seed_secs > 0.0)
        || config.max_backoff_seed_secs < config.min_backoff_seed_secs
    {
        return Err(ConfigError::Validation(format!(
            "backoff seed bounds are inconsistent: initial {}s, min {}s, max {}s",
            config.initial_backoff_secs,
            config.min_backoff_seed_secs,
            config.max_backoff_seed_secs
        )));
    }

    if !(config.max_wait_secs > 0.0) || !config.max_wait_secs.is_finite() {
        return Err(ConfigError::Validation(format!(
            "max-wait-secs must be a positive number, got {}",
            config.max_wait_secs
        )));
    }

    if config.cooldown_max_secs < config.cooldown_base_secs {
        return Err(ConfigError::Validation(format!(
            "cooldown-max-secs ({}) must be >= cooldown-base-secs ({})",
            config.cooldown_max_secs, config.cooldown_base_secs
        )));
    }

    if config.wait_slice_ms == 0 {
        return Err(ConfigError::Validation(
            "wait-slice-ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl loop configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_consecutive_empty < 1 {
        return Err(ConfigError::Validation(format!(
            "max-consecutive-empty must be >= 1, got {}",
            config.max_consecutive_empty
        )));
    }

    if config.progress_every < 1 {
        return Err(ConfigError::Validation(
            "progress-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
