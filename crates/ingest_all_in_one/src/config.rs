use anyhow::{bail, Context};
use common::domain::SourceKind;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream holding raw records
    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    /// Subject filter for the ingestion consumer
    #[serde(default = "default_nats_subject")]
    pub nats_subject: String,

    #[serde(default = "default_nats_consumer_name")]
    pub nats_consumer_name: String,

    /// Messages per invocation
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Deliveries of one message before the server gives up on it
    #[serde(default = "default_nats_max_deliver")]
    pub nats_max_deliver: i64,

    #[serde(default = "default_nats_ack_wait_secs")]
    pub nats_ack_wait_secs: u64,

    /// Redelivery delay after a failed invocation; 0 redelivers immediately
    #[serde(default = "default_nats_nak_delay_secs")]
    pub nats_nak_delay_secs: u64,

    // Decoding configuration
    /// `stream` or `queue` (also accepts `Kinesis` / `SQS`)
    #[serde(default = "default_source_kind")]
    pub source_kind: String,

    #[serde(default = "default_dedup_key_field")]
    pub dedup_key_field: String,

    #[serde(default = "default_source_timestamp_column")]
    pub source_timestamp_column: String,

    #[serde(default = "default_ingestion_timestamp_column")]
    pub ingestion_timestamp_column: String,

    #[serde(default)]
    pub on_conflict_do_nothing: bool,

    // Secret configuration
    /// `file` or `nats_kv`
    #[serde(default = "default_secret_backend")]
    pub secret_backend: String,

    /// Identifier of the destination store credentials
    #[serde(default = "default_secret_id")]
    pub secret_id: String,

    /// Directory holding `<secret_id>.json` for the file backend
    #[serde(default = "default_secret_dir")]
    pub secret_dir: String,

    /// KV bucket for the nats_kv backend
    #[serde(default = "default_secret_kv_bucket")]
    pub secret_kv_bucket: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_default_port")]
    pub postgres_default_port: u16,

    #[serde(default = "default_postgres_connect_timeout_secs")]
    pub postgres_connect_timeout_secs: u64,

    #[serde(default = "default_postgres_statement_timeout_secs")]
    pub postgres_statement_timeout_secs: u64,

    /// Bound on connect plus transaction for one invocation
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    // Load generator configuration
    #[serde(default)]
    pub load_generator_enabled: bool,

    #[serde(default = "default_load_generator_interval_ms")]
    pub load_generator_interval_ms: u64,

    #[serde(default = "default_load_generator_repeat_count")]
    pub load_generator_repeat_count: u32,

    /// 0 means unlimited
    #[serde(default)]
    pub load_generator_max_records: u64,

    #[serde(default = "default_load_generator_partition_key")]
    pub load_generator_partition_key: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    File,
    NatsKv,
}

impl FromStr for SecretBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SecretBackend::File),
            "nats_kv" | "kv" => Ok(SecretBackend::NatsKv),
            other => bail!(
                "unknown secret backend '{}' (expected 'file' or 'nats_kv')",
                other
            ),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "telemetry-ingest".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_stream() -> String {
    "telemetry_records".to_string()
}

fn default_nats_subject() -> String {
    "telemetry_records.>".to_string()
}

fn default_nats_consumer_name() -> String {
    "telemetry-ingest".to_string()
}

fn default_nats_batch_size() -> usize {
    100
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_nats_max_deliver() -> i64 {
    5
}

fn default_nats_ack_wait_secs() -> u64 {
    60
}

fn default_nats_nak_delay_secs() -> u64 {
    5
}

fn default_source_kind() -> String {
    "stream".to_string()
}

fn default_dedup_key_field() -> String {
    "vehicle_id".to_string()
}

fn default_source_timestamp_column() -> String {
    "source_ts".to_string()
}

fn default_ingestion_timestamp_column() -> String {
    "ingest_ts".to_string()
}

fn default_secret_backend() -> String {
    "file".to_string()
}

fn default_secret_id() -> String {
    "telemetry-db".to_string()
}

fn default_secret_dir() -> String {
    "./secrets".to_string()
}

fn default_secret_kv_bucket() -> String {
    "ingest-secrets".to_string()
}

fn default_postgres_default_port() -> u16 {
    5432
}

fn default_postgres_connect_timeout_secs() -> u64 {
    5
}

fn default_postgres_statement_timeout_secs() -> u64 {
    10
}

fn default_write_timeout_secs() -> u64 {
    30
}

fn default_load_generator_interval_ms() -> u64 {
    100
}

fn default_load_generator_repeat_count() -> u32 {
    1
}

fn default_load_generator_partition_key() -> String {
    "vehicle_id".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("INGEST"))
            .build()?
            .try_deserialize()
    }

    pub fn source_kind(&self) -> anyhow::Result<SourceKind> {
        SourceKind::from_str(&self.source_kind).map_err(anyhow::Error::msg)
    }

    pub fn secret_backend(&self) -> anyhow::Result<SecretBackend> {
        SecretBackend::from_str(&self.secret_backend)
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.source_kind().context("invalid INGEST_SOURCE_KIND")?;
        self.secret_backend()
            .context("invalid INGEST_SECRET_BACKEND")?;

        if self.secret_id.trim().is_empty() {
            bail!("INGEST_SECRET_ID must not be empty");
        }
        if self.dedup_key_field.trim().is_empty() {
            bail!("INGEST_DEDUP_KEY_FIELD must not be empty");
        }
        if self.nats_batch_size == 0 {
            bail!("INGEST_NATS_BATCH_SIZE must be at least 1");
        }
        if self.nats_max_deliver == 0 {
            bail!("INGEST_NATS_MAX_DELIVER must be positive, or -1 for unlimited");
        }
        if self.write_timeout_secs == 0 {
            bail!("INGEST_WRITE_TIMEOUT_SECS must be at least 1");
        }
        if self.nats_ack_wait_secs <= self.write_timeout_secs {
            bail!(
                "INGEST_NATS_ACK_WAIT_SECS ({}) must exceed INGEST_WRITE_TIMEOUT_SECS ({})",
                self.nats_ack_wait_secs,
                self.write_timeout_secs
            );
        }
        if self.load_generator_enabled && self.load_generator_repeat_count == 0 {
            bail!("INGEST_LOAD_GENERATOR_REPEAT_COUNT must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        // SAFETY: Callers hold TEST_LOCK to prevent concurrent env access
        unsafe {
            for key in [
                "INGEST_LOG_LEVEL",
                "INGEST_SOURCE_KIND",
                "INGEST_NATS_BATCH_SIZE",
                "INGEST_SECRET_BACKEND",
                "INGEST_WRITE_TIMEOUT_SECS",
                "INGEST_ON_CONFLICT_DO_NOTHING",
            ] {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.source_kind().unwrap(), SourceKind::Stream);
        assert_eq!(config.secret_backend().unwrap(), SecretBackend::File);
        assert_eq!(config.dedup_key_field, "vehicle_id");
        assert_eq!(config.ingestion_timestamp_column, "ingest_ts");
        assert!(!config.on_conflict_do_nothing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("INGEST_SOURCE_KIND", "SQS");
            std::env::set_var("INGEST_NATS_BATCH_SIZE", "25");
            std::env::set_var("INGEST_ON_CONFLICT_DO_NOTHING", "true");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.source_kind().unwrap(), SourceKind::Queue);
        assert_eq!(config.nats_batch_size, 25);
        assert!(config.on_conflict_do_nothing);

        clear_env();
    }

    #[test]
    fn test_validate_rejects_unknown_source_kind() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("INGEST_SOURCE_KIND", "firehose");
        }

        let config = ServiceConfig::from_env().unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INGEST_SOURCE_KIND"));

        clear_env();
    }

    #[test]
    fn test_validate_requires_ack_wait_above_write_timeout() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("INGEST_WRITE_TIMEOUT_SECS", "120");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert!(config.validate().is_err());

        clear_env();
    }

    #[test]
    fn test_secret_backend_from_str() {
        assert_eq!(
            "nats_kv".parse::<SecretBackend>().unwrap(),
            SecretBackend::NatsKv
        );
        assert_eq!(
            "File".parse::<SecretBackend>().unwrap(),
            SecretBackend::File
        );
        assert!("vault".parse::<SecretBackend>().is_err());
    }
}
