use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "MAILMINDER_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Resolves the config path: explicit argument, then `MAILMINDER_CONFIG`,
/// then `~/.mailminder/config.yaml`.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(crate::secrets::expand_home(path)));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(crate::secrets::expand_home(&path)));
        }
    }
    default_config_path()
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailminder").join("config.yaml"))
}

static RE_COLOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::validation(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.mail.batch_size == 0 {
        return Err(ConfigError::validation("mail.batch_size must be at least 1"));
    }
    if config.mail.timeout_secs == 0 {
        return Err(ConfigError::validation("mail.timeout_secs must be at least 1"));
    }

    if config.model.timeout_secs == 0 {
        return Err(ConfigError::validation("model.timeout_secs must be at least 1"));
    }
    if config.model.max_body_chars == 0 {
        return Err(ConfigError::validation(
            "model.max_body_chars must be at least 1",
        ));
    }

    if config.archive.max_attempts == 0 {
        return Err(ConfigError::validation(
            "archive.max_attempts must be at least 1",
        ));
    }
    if config.archive.timeout_secs == 0 {
        return Err(ConfigError::validation("archive.timeout_secs must be at least 1"));
    }
    if config.archive.enabled && config.archive.database_id.trim().is_empty() {
        return Err(ConfigError::validation(
            "archive.database_id is required when archive.enabled is true",
        ));
    }

    let colors = &config.reminder.colors;
    for (name, value) in [
        ("important", &colors.important),
        ("normal", &colors.normal),
        ("unimportant", &colors.unimportant),
    ] {
        if !RE_COLOR.is_match(value) {
            return Err(ConfigError::validation(format!(
                "reminder.colors.{} must be #RRGGBB, got '{}'",
                name, value
            )));
        }
    }
    if config.reminder.utc_offset_minutes.abs() >= 24 * 60 {
        return Err(ConfigError::validation(
            "reminder.utc_offset_minutes must be within one day",
        ));
    }
    if config.reminder.channel.trim().is_empty() {
        return Err(ConfigError::validation("reminder.channel must not be empty"));
    }

    for (tier, words) in [
        ("important", &config.keywords.important),
        ("normal", &config.keywords.normal),
        ("unimportant", &config.keywords.unimportant),
    ] {
        if words.iter().any(|w| w.trim().is_empty()) {
            return Err(ConfigError::validation(format!(
                "keywords.{} contains an empty keyword",
                tier
            )));
        }
    }

    if config.pipeline.analyze_concurrency == 0 {
        return Err(ConfigError::validation(
            "pipeline.analyze_concurrency must be at least 1",
        ));
    }
    if config.pipeline.lock_ttl_secs == 0 {
        return Err(ConfigError::validation(
            "pipeline.lock_ttl_secs must be at least 1",
        ));
    }

    Ok(())
}
