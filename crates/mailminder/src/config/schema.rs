use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secrets::SecretSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            mail: MailConfig::default(),
            model: ModelConfig::default(),
            archive: ArchiveConfig::default(),
            reminder: ReminderConfig::default(),
            keywords: KeywordsConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to `~/.mailminder/data/mailminder.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default = "default_mail_password_env")]
    pub password_env_var: Option<String>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_imap_port() -> u16 {
    993
}

fn default_mail_password_env() -> Option<String> {
    Some("MAIL_PASSWORD".to_string())
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_batch_size() -> usize {
    50
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_imap_port(),
            use_tls: true,
            username: String::new(),
            password: None,
            password_file: None,
            password_env_var: default_mail_password_env(),
            folder: default_folder(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MailConfig {
    pub fn password_source(&self) -> SecretSource<'_> {
        SecretSource::new(
            self.password.as_deref(),
            self.password_file.as_deref(),
            self.password_env_var.as_deref(),
        )
    }
}

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat-completions endpoint. Empty means OpenAI.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_model_key_env")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_model_key_env() -> Option<String> {
    Some("MODEL_API_KEY".to_string())
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_body_chars() -> usize {
    4000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: default_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_model_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_body_chars: default_max_body_chars(),
        }
    }
}

impl ModelConfig {
    /// Resolves `base_url` to a full chat-completions URL.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            OPENAI_CHAT_COMPLETIONS_URL.to_string()
        } else if base.contains("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    pub fn api_key_source(&self) -> SecretSource<'_> {
        SecretSource::new(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env_var.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_archive_url")]
    pub base_url: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_archive_token_env")]
    pub token_env_var: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_archive_url() -> String {
    "https://api.notion.com/v1".to_string()
}

fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

fn default_archive_token_env() -> Option<String> {
    Some("ARCHIVE_TOKEN".to_string())
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_archive_url(),
            database_id: String::new(),
            notion_version: default_notion_version(),
            token: None,
            token_file: None,
            token_env_var: default_archive_token_env(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ArchiveConfig {
    pub fn token_source(&self) -> SecretSource<'_> {
        SecretSource::new(
            self.token.as_deref(),
            self.token_file.as_deref(),
            self.token_env_var.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_important_days")]
    pub important_days_before: Vec<u32>,
    #[serde(default = "default_important_hours")]
    pub important_hours_before: Vec<u32>,
    #[serde(default = "default_normal_days")]
    pub normal_days_before: Vec<u32>,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Offset applied to event times that carry no timezone.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub colors: ColorsConfig,
}

fn default_important_days() -> Vec<u32> {
    vec![3, 1]
}

fn default_important_hours() -> Vec<u32> {
    vec![1]
}

fn default_normal_days() -> Vec<u32> {
    vec![1]
}

fn default_channel() -> String {
    "browser".to_string()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            important_days_before: default_important_days(),
            important_hours_before: default_important_hours(),
            normal_days_before: default_normal_days(),
            channel: default_channel(),
            utc_offset_minutes: 0,
            colors: ColorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorsConfig {
    #[serde(default = "default_important_color")]
    pub important: String,
    #[serde(default = "default_normal_color")]
    pub normal: String,
    #[serde(default = "default_unimportant_color")]
    pub unimportant: String,
}

fn default_important_color() -> String {
    "#FF4444".to_string()
}

fn default_normal_color() -> String {
    "#4444FF".to_string()
}

fn default_unimportant_color() -> String {
    "#44FF44".to_string()
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            important: default_important_color(),
            normal: default_normal_color(),
            unimportant: default_unimportant_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default = "default_important_keywords")]
    pub important: Vec<String>,
    #[serde(default = "default_normal_keywords")]
    pub normal: Vec<String>,
    #[serde(default = "default_unimportant_keywords")]
    pub unimportant: Vec<String>,
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_important_keywords() -> Vec<String> {
    to_strings(&["考试", "作业", "截止", "提交", "deadline", "exam", "assignment"])
}

fn default_normal_keywords() -> Vec<String> {
    to_strings(&["会议", "meeting", "讨论"])
}

fn default_unimportant_keywords() -> Vec<String> {
    to_strings(&["讲座", "报名", "lecture", "registration"])
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            important: default_important_keywords(),
            normal: default_normal_keywords(),
            unimportant: default_unimportant_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_analyze_concurrency")]
    pub analyze_concurrency: usize,
    /// A run lock whose heartbeat is older than this is considered abandoned.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_progress_retention_secs")]
    pub progress_retention_secs: u64,
}

fn default_analyze_concurrency() -> usize {
    3
}

fn default_lock_ttl_secs() -> u64 {
    300
}

fn default_progress_retention_secs() -> u64 {
    600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyze_concurrency: default_analyze_concurrency(),
            lock_ttl_secs: default_lock_ttl_secs(),
            progress_retention_secs: default_progress_retention_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_allow_any: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

impl DatabaseConfig {
    /// The configured path with `~` expanded, or the default location.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        match self.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }
}

impl MailConfig {
    /// Checks the fields needed to actually connect to a mailbox.
    pub fn require_connection_fields(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("mail.host is required"));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::validation("mail.username is required"));
        }
        Ok(())
    }
}
