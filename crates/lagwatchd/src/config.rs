//! Daemon configuration.
//!
//! Settings come from three layers, highest precedence first: command
//! line (and the environment variables bound to some flags), an optional
//! TOML file, and built-in defaults.
//!
//! ```toml
//! listen_address = ":9308"
//! refresh_interval = "30s"
//! continuous_failures = 10
//! log_level = "info"
//!
//! [kafka]
//! servers = ["kafka-1:9092", "kafka-2:9092"]
//! timeout = "10s"
//!
//! [sasl]
//! enabled = true
//! mechanism = "SCRAM-SHA-512"
//! username = "exporter"
//!
//! [tls]
//! enabled = true
//! ```

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use lagwatch_client::config::DEFAULT_CALL_TIMEOUT;
use lagwatch_client::{Auth, ConfigError, HostPort, KafkaConfig, Transport};
use serde::Deserialize;

pub const DEFAULT_LISTEN_ADDRESS: &str = ":9308";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONTINUOUS_FAILURES: u32 = 10;
pub const DEFAULT_SASL_MECHANISM: &str = "PLAIN";
pub const DEFAULT_FATAL_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    name = "lagwatchd",
    version,
    about = "Kafka cluster state and consumer lag exporter for Prometheus"
)]
pub struct Cli {
    /// TOML configuration file. Flags override its values.
    #[arg(long, env = "LAGWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to serve /metrics on [default: :9308].
    #[arg(long = "listen.address")]
    pub listen_address: Option<String>,

    /// Time between collections, e.g. 30s, 2m, 500ms [default: 30s].
    #[arg(long = "refresh.interval", value_parser = parse_duration_arg)]
    pub refresh_interval: Option<Duration>,

    /// Net collection failures before the exporter gives up [default: 10].
    #[arg(long = "continuous.failures")]
    pub continuous_failures: Option<u32>,

    /// Seed brokers as host:port. Repeatable and comma-separated.
    #[arg(long = "kafka.servers", value_delimiter = ',')]
    pub kafka_servers: Vec<String>,

    /// Bound on each Kafka request; capped at the refresh interval [default: 10s].
    #[arg(long = "kafka.timeout", value_parser = parse_duration_arg)]
    pub kafka_timeout: Option<Duration>,

    /// Authenticate with SASL.
    #[arg(long = "sasl.enabled", num_args = 0..=1, default_missing_value = "true")]
    pub sasl_enabled: Option<bool>,

    #[arg(long = "sasl.username", env = "SASL_USERNAME")]
    pub sasl_username: Option<String>,

    #[arg(long = "sasl.password", env = "SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: Option<String>,

    /// PLAIN, SCRAM-SHA-256 or SCRAM-SHA-512 [default: PLAIN].
    #[arg(long = "sasl.mechanism")]
    pub sasl_mechanism: Option<String>,

    /// Connect to brokers over TLS.
    #[arg(long = "tls.enabled", num_args = 0..=1, default_missing_value = "true")]
    pub tls_enabled: Option<bool>,

    /// Do not verify broker certificates.
    #[arg(
        long = "tls.insecure-skip-tls-verify",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub tls_insecure_skip_verify: Option<bool>,

    /// debug, info, warn or error [default: debug].
    #[arg(long = "log.level")]
    pub log_level: Option<String>,

    #[arg(long = "log.format", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Pause before exiting on a fatal error [default: 10s].
    #[arg(long = "fatal.backoff", value_parser = parse_duration_arg)]
    pub fatal_backoff: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen_address: Option<String>,
    pub refresh_interval: Option<String>,
    pub continuous_failures: Option<u32>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub fatal_backoff: Option<String>,
    pub kafka: KafkaSection,
    pub sasl: SaslSection,
    pub tls: TlsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KafkaSection {
    pub servers: Vec<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaslSection {
    pub enabled: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub mechanism: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSection {
    pub enabled: Option<bool>,
    pub insecure_skip_tls_verify: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        toml::from_str(&content).map_err(|e| file_error(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Unrecognized names fall back to `debug`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Debug,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_address: HostPort,
    pub refresh_interval: Duration,
    pub continuous_failures: NonZeroU32,
    pub kafka: KafkaConfig,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub fatal_backoff: Duration,
}

impl Settings {
    /// Resolve settings from the command line and the file it names, if any.
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::from_sources(cli, file)
    }

    pub fn from_sources(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let listen_address: HostPort = cli
            .listen_address
            .or(file.listen_address)
            .as_deref()
            .unwrap_or(DEFAULT_LISTEN_ADDRESS)
            .parse()?;

        let refresh_interval =
            pick_duration(cli.refresh_interval, file.refresh_interval, DEFAULT_REFRESH_INTERVAL)?;
        if refresh_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "refresh.interval".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let continuous_failures = cli
            .continuous_failures
            .or(file.continuous_failures)
            .unwrap_or(DEFAULT_CONTINUOUS_FAILURES);
        let continuous_failures =
            NonZeroU32::new(continuous_failures).ok_or_else(|| ConfigError::InvalidValue {
                key: "continuous.failures".into(),
                reason: "must be at least 1".into(),
            })?;

        let servers = if cli.kafka_servers.is_empty() {
            file.kafka.servers
        } else {
            cli.kafka_servers
        };
        let seeds = servers
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<HostPort>, _>>()?;

        let timeout = pick_duration(cli.kafka_timeout, file.kafka.timeout, DEFAULT_CALL_TIMEOUT)?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "kafka.timeout".into(),
                reason: "must be greater than zero".into(),
            });
        }
        let timeout = timeout.min(refresh_interval);

        let sasl = file.sasl;
        let auth = Auth::resolve(
            cli.sasl_enabled.or(sasl.enabled).unwrap_or(false),
            cli.sasl_mechanism
                .or(sasl.mechanism)
                .as_deref()
                .unwrap_or(DEFAULT_SASL_MECHANISM),
            cli.sasl_username.or(sasl.username).as_deref().unwrap_or(""),
            cli.sasl_password.or(sasl.password).as_deref().unwrap_or(""),
        );
        let transport = Transport::resolve(
            cli.tls_enabled.or(file.tls.enabled).unwrap_or(false),
            cli.tls_insecure_skip_verify
                .or(file.tls.insecure_skip_tls_verify)
                .unwrap_or(false),
        );

        let kafka = KafkaConfig::new(seeds)?
            .with_auth(auth)
            .with_transport(transport)
            .with_timeout(timeout);

        let log_level = LogLevel::from_name(
            cli.log_level
                .or(file.log_level)
                .as_deref()
                .unwrap_or("debug"),
        );
        let log_format = cli.log_format.or(file.log_format).unwrap_or_default();
        let fatal_backoff =
            pick_duration(cli.fatal_backoff, file.fatal_backoff, DEFAULT_FATAL_BACKOFF)?;

        Ok(Self {
            listen_address,
            refresh_interval,
            continuous_failures,
            kafka,
            log_level,
            log_format,
            fatal_backoff,
        })
    }
}

fn pick_duration(
    flag: Option<Duration>,
    file: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match (flag, file) {
        (Some(d), _) => Ok(d),
        (None, Some(s)) => parse_duration(&s).ok_or(ConfigError::InvalidDuration(s)),
        (None, None) => Ok(default),
    }
}

/// Parse `500ms`, `30s`, `2m`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| ConfigError::InvalidDuration(s.to_string()).to_string())
}
