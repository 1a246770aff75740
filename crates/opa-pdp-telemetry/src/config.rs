//! Log settings for the agent.

/// Service name attached to startup events.
pub const SERVICE_NAME: &str = "opa-pdp";

/// Crates whose debug output drowns the agent's own at `debug`/`trace`.
const QUIET_TARGETS: &[&str] = &["rskafka=info", "hyper=info", "h2=info", "reqwest=info"];

/// How log lines are rendered on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log collectors.
    #[default]
    Json,
    /// Multi-line human output with source locations.
    Pretty,
}

impl LogFormat {
    /// Case-insensitive; `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else if s.eq_ignore_ascii_case("pretty") {
            Some(Self::Pretty)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Level for the agent's own targets (`info`, `debug`, ...).
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    ///
    /// Client libraries are capped at `info` unless the level is already
    /// stricter than that.
    pub fn filter_directives(&self) -> String {
        let level = self.log_level.trim().to_ascii_lowercase();
        match level.as_str() {
            "debug" | "trace" => {
                let mut directives = vec![level.clone()];
                directives.extend(QUIET_TARGETS.iter().map(|t| t.to_string()));
                directives.join(",")
            }
            _ => level,
        }
    }
}
