pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod mail;
pub mod notify;
pub mod pipeline;
pub mod reminder;
pub mod secrets;

pub use archive::{ArchiveSink, LocalArchive, NotionArchive};
pub use config::{load_config, load_config_from_str, resolve_config_path, Config};
pub use db::Database;
pub use error::{ConfigError, MailminderError, Result};
pub use extraction::{LanguageModel, OpenAiCompatibleModel};
pub use mail::{ImapMailSource, MailSource};
pub use notify::NotificationDispatcher;
pub use pipeline::{Collaborators, Orchestrator, ProgressRegistry, ProgressState, RunKind};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
