//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use courier_core::{PackerConfig, SecretStatus};
use courier_framework::MiddlewareSpec;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Application settings, including the packer secret.
    #[serde(default)]
    pub app: AppConfig,

    /// Kernel settings.
    #[serde(default)]
    pub kernel: KernelConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// App
// =============================================================================

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service name, used in log output.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Whether packed payloads are encrypted. Accepts `"plain"`,
    /// `"encrypted"` or a boolean.
    #[serde(default, deserialize_with = "deserialize_secret_status")]
    pub secret_status: SecretStatus,

    /// Secret the cipher key is derived from.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            secret_status: SecretStatus::Plain,
            secret_key: None,
        }
    }
}

impl AppConfig {
    /// Returns the packer configuration described by these settings.
    pub fn packer_config(&self) -> PackerConfig {
        PackerConfig {
            secret_status: self.secret_status,
            secret_key: self.secret_key.clone(),
        }
    }
}

fn default_app_name() -> String {
    "courier".to_string()
}

fn deserialize_secret_status<'de, D>(deserializer: D) -> Result<SecretStatus, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Named(SecretStatus),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Flag(flag) => flag.into(),
        Repr::Named(status) => status,
    })
}

// =============================================================================
// Kernel
// =============================================================================

/// Kernel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Global middleware, run before every caller's own list.
    /// Entries use the `"name:arg1,arg2"` form.
    #[serde(default)]
    pub middleware: Vec<String>,
}

impl KernelConfig {
    /// Parses the global middleware entries.
    pub fn middleware_specs(&self) -> Vec<MiddlewareSpec> {
        self.middleware.iter().map(MiddlewareSpec::from).collect()
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing::Level`.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module levels, e.g. `courier_framework = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
