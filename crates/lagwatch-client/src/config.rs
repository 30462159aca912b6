//! Connection settings: seed brokers, SASL, and TLS.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// Per-call timeout used when none is configured.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A `host:port` pair.
///
/// Exactly two colon-separated fields with a numeric port. The host may be
/// empty (`:9308`), which for a listen address means every interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address suitable for binding a listener.
    pub fn bind_address(&self) -> String {
        if self.host.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else {
            self.to_string()
        }
    }
}

impl FromStr for HostPort {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err(ConfigError::InvalidAddress(s.to_string()));
        }

        let port = parts[1]
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(parts[1].to_string()))?;

        Ok(Self {
            host: parts[0].to_string(),
            port,
        })
    }
}

impl TryFrom<String> for HostPort {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Supported SASL mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    /// Look up a mechanism by its Kafka name. Case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PLAIN" => Some(Self::Plain),
            "SCRAM-SHA-256" => Some(Self::ScramSha256),
            "SCRAM-SHA-512" => Some(Self::ScramSha512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL authentication applied to every broker connection.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    None,
    Plain { username: String, password: String },
    ScramSha256 { username: String, password: String },
    ScramSha512 { username: String, password: String },
}

impl Auth {
    /// Resolve authentication from the flat configuration surface.
    ///
    /// An unrecognized mechanism resolves to [`Auth::None`]: the client
    /// connects without authentication and a warning is logged.
    pub fn resolve(enabled: bool, mechanism: &str, username: &str, password: &str) -> Self {
        if !enabled {
            return Self::None;
        }

        let username = username.to_string();
        let password = password.to_string();
        match SaslMechanism::from_name(mechanism) {
            Some(SaslMechanism::Plain) => Self::Plain { username, password },
            Some(SaslMechanism::ScramSha256) => Self::ScramSha256 { username, password },
            Some(SaslMechanism::ScramSha512) => Self::ScramSha512 { username, password },
            None => {
                warn!(
                    %mechanism,
                    "unrecognized SASL mechanism, connecting without authentication"
                );
                Self::None
            }
        }
    }

    pub fn mechanism(&self) -> Option<SaslMechanism> {
        match self {
            Self::None => None,
            Self::Plain { .. } => Some(SaslMechanism::Plain),
            Self::ScramSha256 { .. } => Some(SaslMechanism::ScramSha256),
            Self::ScramSha512 { .. } => Some(SaslMechanism::ScramSha512),
        }
    }

    /// `(username, password)` when authentication is enabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self {
            Self::None => None,
            Self::Plain { username, password }
            | Self::ScramSha256 { username, password }
            | Self::ScramSha512 { username, password } => Some((username, password)),
        }
    }
}

// Never print the password.
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mechanism(), self.credentials()) {
            (Some(mechanism), Some((username, _))) => f
                .debug_struct("Auth")
                .field("mechanism", &mechanism.as_str())
                .field("username", &username)
                .finish_non_exhaustive(),
            _ => f.write_str("Auth::None"),
        }
    }
}

/// Transport security for broker connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Plaintext,
    Tls { verify_peer: bool },
}

impl Transport {
    pub fn resolve(tls_enabled: bool, insecure_skip_verify: bool) -> Self {
        if tls_enabled {
            Self::Tls {
                verify_peer: !insecure_skip_verify,
            }
        } else {
            Self::Plaintext
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }
}

/// Everything needed to build a cluster client.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaConfig {
    pub seeds: Vec<HostPort>,
    pub auth: Auth,
    pub transport: Transport,
    /// Upper bound on a single client call.
    pub timeout: Duration,
}

impl KafkaConfig {
    pub fn new(seeds: Vec<HostPort>) -> Result<Self, ConfigError> {
        if seeds.is_empty() {
            return Err(ConfigError::NoSeedBrokers);
        }
        Ok(Self {
            seeds,
            auth: Auth::None,
            transport: Transport::Plaintext,
            timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Comma-separated seed list, as Kafka clients expect it.
    pub fn bootstrap_servers(&self) -> String {
        self.seeds
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}
