use std::time::Duration;

use serde::Deserialize;

use crate::application::audit_consumer::{CONSUMER_SOURCE, CommitMode, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(true))
            .add_source(
                config::File::with_name(&format!("config/{env}"))
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub uri: String,
    #[serde(default = "PostgresConfig::default_pool_size")]
    pub max_connections: u32,
    #[serde(default = "PostgresConfig::default_run_migrations")]
    pub run_migrations: bool,
}

impl PostgresConfig {
    fn default_pool_size() -> u32 {
        10
    }

    fn default_run_migrations() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "KafkaConfig::default_topic")]
    pub topic: String,
    #[serde(default = "KafkaConfig::default_group_id")]
    pub group_id: String,
    #[serde(default)]
    pub commit_mode: CommitMode,
    #[serde(default = "KafkaConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Deliveries of one message whose audit write failed before it is dropped.
    #[serde(default = "KafkaConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "KafkaConfig::default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "KafkaConfig::default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

impl KafkaConfig {
    fn default_topic() -> String {
        "user-topic".to_string()
    }

    fn default_group_id() -> String {
        "user-group".to_string()
    }

    fn default_retry_backoff_ms() -> u64 {
        1000
    }

    fn default_max_attempts() -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    fn default_session_timeout_ms() -> u64 {
        6000
    }

    fn default_message_timeout_ms() -> u64 {
        5000
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "AuditConfig::default_consumer_source")]
    pub consumer_source: String,
    #[serde(default = "AuditConfig::default_direct_source")]
    pub direct_source: String,
}

impl AuditConfig {
    fn default_consumer_source() -> String {
        CONSUMER_SOURCE.to_string()
    }

    fn default_direct_source() -> String {
        "DirectCall".to_string()
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            consumer_source: Self::default_consumer_source(),
            direct_source: Self::default_direct_source(),
        }
    }
}
