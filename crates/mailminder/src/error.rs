use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailminderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] crate::mail::MailError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crate::extraction::ExtractionError),

    #[error("Archive error: {0}")]
    Archive(#[from] crate::archive::ArchiveError),

    #[error("Archive sync error: {0}")]
    Sync(#[from] crate::archive::SyncError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Secret '{name}' could not be resolved: {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: crate::secrets::SecretError,
    },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MailminderError>;
