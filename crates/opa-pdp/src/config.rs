//! Agent configuration, read once at startup from flags or environment.

use crate::error::ConfigError;
use crate::transport::KafkaSettings;
use clap::Parser;
use opa_pdp_telemetry::{LogFormat, TelemetryConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// How long Kafka connection attempts retry before startup gives up.
const KAFKA_CONNECT_DEADLINE: Duration = Duration::from_secs(10);

/// Per-request timeout for the policy engine.
pub const OPA_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(
    name = "opa-pdp",
    about = "OPA policy decision point agent for the policy PAP",
    version
)]
pub struct AgentConfig {
    /// Kafka bootstrap servers (comma-separated).
    #[arg(long, env = "KAFKA_URL", default_value = "kafka:9092")]
    pub kafka_url: String,

    /// Topic shared with the PAP.
    #[arg(long, env = "PAP_TOPIC", default_value = "policy-pdp-pap")]
    pub topic: String,

    /// Kafka consumer group id.
    #[arg(long, env = "GROUPID", default_value = "opa-pdp")]
    pub group_id: String,

    /// Authenticate to Kafka with SASL SCRAM-SHA-512.
    #[arg(long, env = "UseSASLForKAFKA")]
    pub use_sasl: bool,

    #[arg(long, env = "KAFKA_USERNAME")]
    pub kafka_username: Option<String>,

    #[arg(long, env = "KAFKA_PASSWORD", hide_env_values = true)]
    pub kafka_password: Option<String>,

    /// PDP group this instance belongs to.
    #[arg(long, env = "PDP_GROUP", default_value = "defaultGroup")]
    pub pdp_group: String,

    /// User for the decision/health/statistics endpoints.
    #[arg(long, env = "API_USER", default_value = "policyadmin")]
    pub api_user: String,

    #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
    pub api_password: String,

    /// HTTP listen address.
    #[arg(long = "listen", env = "LISTEN_ADDR", default_value = "0.0.0.0:8282")]
    pub listen_addr: SocketAddr,

    /// Base URL of the OPA server.
    #[arg(long, env = "OPA_URL", default_value = "http://localhost:8181")]
    pub opa_url: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (json or pretty).
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Poll timeout for the PAP topic, in milliseconds.
    #[arg(long = "read-timeout-ms", env = "KAFKA_READ_TIMEOUT_MS", default_value_t = 1000)]
    pub read_timeout_ms: u64,

    /// Grace period after teardown, in seconds.
    #[arg(long = "shutdown-grace-secs", env = "SHUTDOWN_WAIT_TIME", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_sasl {
            if self.kafka_username.as_deref().unwrap_or_default().is_empty() {
                return Err(ConfigError::MissingCredential("KAFKA_USERNAME"));
            }
            if self.kafka_password.as_deref().unwrap_or_default().is_empty() {
                return Err(ConfigError::MissingCredential("KAFKA_PASSWORD"));
            }
        }

        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "read-timeout-ms",
                reason: "must be greater than zero".into(),
            });
        }

        if LogFormat::parse(&self.log_format).is_none() {
            return Err(ConfigError::Invalid {
                field: "log-format",
                reason: format!("unknown format '{}'", self.log_format),
            });
        }

        if self.api_password.is_empty() {
            return Err(ConfigError::Invalid {
                field: "api-password",
                reason: "must not be empty".into(),
            });
        }

        Ok(())
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig::new()
            .with_log_level(&self.log_level)
            .with_log_format(LogFormat::parse(&self.log_format).unwrap_or_default())
    }

    pub fn kafka_settings(&self) -> KafkaSettings {
        let settings = KafkaSettings::new(&self.kafka_url, &self.topic, &self.group_id)
            .with_connect_deadline(KAFKA_CONNECT_DEADLINE);
        match (self.use_sasl, &self.kafka_username, &self.kafka_password) {
            (true, Some(user), Some(pass)) => settings.with_sasl(user, pass),
            _ => settings,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
