//! Dependency and endpoint descriptors.
//!
//! Both are immutable once built. Names and label keys are validated
//! against fixed patterns compiled once per process.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::CheckConfig;
use crate::error::ValidationError;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid name pattern"));

static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label pattern"));

/// Label names owned by the metric schema; endpoints may not override them.
pub const RESERVED_LABELS: [&str; 7] =
    ["name", "group", "dependency", "type", "host", "port", "critical"];

pub const MAX_NAME_LEN: usize = 63;

/// The closed set of dependency kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Http,
    Grpc,
    Tcp,
    Postgres,
    Mysql,
    Redis,
    Amqp,
    Kafka,
    Ldap,
    Custom,
}

impl DependencyType {
    pub const ALL: [DependencyType; 10] = [
        Self::Http,
        Self::Grpc,
        Self::Tcp,
        Self::Postgres,
        Self::Mysql,
        Self::Redis,
        Self::Amqp,
        Self::Kafka,
        Self::Ldap,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
            Self::Tcp => "tcp",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Redis => "redis",
            Self::Amqp => "amqp",
            Self::Kafka => "kafka",
            Self::Ldap => "ldap",
            Self::Custom => "custom",
        }
    }

    /// Well-known port for this kind of dependency, if it has one.
    pub fn default_port(&self) -> Option<&'static str> {
        match self {
            Self::Http => Some("80"),
            Self::Grpc => Some("443"),
            Self::Postgres => Some("5432"),
            Self::Mysql => Some("3306"),
            Self::Redis => Some("6379"),
            Self::Amqp => Some("5672"),
            Self::Kafka => Some("9092"),
            Self::Ldap => Some("389"),
            Self::Tcp | Self::Custom => None,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownType(s.to_string()))
    }
}

/// Check a dependency (or instance) name.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || !NAME_PATTERN.is_match(name) {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Check a custom label name against the label pattern and the reserved set.
pub fn validate_label_name(label: &str) -> Result<(), ValidationError> {
    if !LABEL_PATTERN.is_match(label) {
        return Err(ValidationError::InvalidLabel(label.to_string()));
    }
    if RESERVED_LABELS.contains(&label) {
        return Err(ValidationError::ReservedLabel(label.to_string()));
    }
    Ok(())
}

fn validate_port(port: &str) -> Result<(), ValidationError> {
    match port.parse::<u16>() {
        Ok(p) if p >= 1 => Ok(()),
        _ => Err(ValidationError::InvalidPort(port.to_string())),
    }
}

/// Map key for an endpoint: `"<dependency>:<host>:<port>"`.
pub fn endpoint_key(name: &str, host: &str, port: &str) -> String {
    format!("{name}:{host}:{port}")
}

/// One network target. Identity is `(host, port)`; labels are metadata.
///
/// Deserialization goes through [`Endpoint::new`] and [`Endpoint::with_label`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawEndpoint")]
pub struct Endpoint {
    host: String,
    port: String,
    labels: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawEndpoint {
    host: String,
    port: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

impl TryFrom<RawEndpoint> for Endpoint {
    type Error = ValidationError;

    fn try_from(raw: RawEndpoint) -> Result<Self, Self::Error> {
        raw.labels
            .into_iter()
            .try_fold(Endpoint::new(raw.host, raw.port)?, |ep, (key, value)| {
                ep.with_label(key, value)
            })
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Result<Self, ValidationError> {
        let host = host.into();
        let port = port.into();
        if host.is_empty() {
            return Err(ValidationError::MissingHost);
        }
        validate_port(&port)?;
        Ok(Self {
            host,
            port,
            labels: BTreeMap::new(),
        })
    }

    /// Attach a custom label. The key must be a valid, non-reserved label name.
    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let key = key.into();
        validate_label_name(&key)?;
        self.labels.insert(key, value.into());
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// `host:port`, suitable for socket connects. IPv6 hosts are bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A named external system made of one or more endpoints.
#[derive(Debug, Clone)]
pub struct Dependency {
    name: String,
    dep_type: DependencyType,
    critical: bool,
    endpoints: Vec<Endpoint>,
    config: CheckConfig,
}

impl Dependency {
    pub fn builder(name: impl Into<String>, dep_type: DependencyType) -> DependencyBuilder {
        DependencyBuilder {
            name: name.into(),
            dep_type,
            critical: None,
            endpoints: Vec::new(),
            config: CheckConfig::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dep_type(&self) -> DependencyType {
        self.dep_type
    }

    pub fn critical(&self) -> bool {
        self.critical
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }
}

#[derive(Debug, Clone)]
pub struct DependencyBuilder {
    name: String,
    dep_type: DependencyType,
    critical: Option<bool>,
    endpoints: Vec<Endpoint>,
    config: CheckConfig,
}

impl DependencyBuilder {
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    pub fn config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Dependency, ValidationError> {
        validate_name(&self.name)?;
        let critical = self
            .critical
            .ok_or_else(|| ValidationError::MissingCritical(self.name.clone()))?;
        if self.endpoints.is_empty() {
            return Err(ValidationError::NoEndpoints(self.name));
        }

        let mut seen = HashSet::new();
        for ep in &self.endpoints {
            if !seen.insert(ep) {
                return Err(ValidationError::DuplicateEndpoint {
                    name: self.name.clone(),
                    host: ep.host.clone(),
                    port: ep.port.clone(),
                });
            }
        }

        Ok(Dependency {
            name: self.name,
            dep_type: self.dep_type,
            critical,
            endpoints: self.endpoints,
            config: self.config,
        })
    }
}
