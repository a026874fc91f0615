//! depwatchd TOML configuration.
//!
//! ```toml
//! name = "orders-api"
//! listen = "0.0.0.0:9464"
//!
//! [check]
//! interval = "15s"
//! timeout = "5s"
//!
//! [[dependency]]
//! name = "postgres-main"
//! type = "postgres"
//! critical = true
//!
//! [[dependency.endpoint]]
//! host = "db"
//! labels = { zone = "a" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use depwatch_core::dependency::validate_name;
use depwatch_core::{
    CheckConfig, CheckConfigBuilder, Checker, Dependency, DependencyType, Endpoint,
    ValidationError, parse_duration,
};
use depwatch_probes::{HttpChecker, TcpChecker};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:9464";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Instance name, the `name` label on every series.
    pub name: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub check: CheckSection,
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencySection>,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

/// Check timing overrides. Unset fields keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckSection {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub initial_delay: Option<String>,
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySection {
    pub name: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub critical: Option<bool>,
    /// HTTP only.
    pub health_path: Option<String>,
    /// HTTP only.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP only.
    pub bearer_token: Option<String>,
    /// HTTP only.
    pub basic_auth: Option<BasicAuth>,
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointSection>,
    pub check: Option<CheckSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    pub host: String,
    /// Falls back to the type's default port.
    pub port: Option<Port>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A port written either as `5432` or `"5432"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Number(u32),
    Text(String),
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => write!(f, "{n}"),
            Port::Text(s) => f.write_str(s),
        }
    }
}

/// A validated dependency and the checker that probes it.
pub struct PlannedDependency {
    pub dependency: Dependency,
    pub checker: Arc<dyn Checker>,
}

/// Everything the daemon needs to start, fully validated.
pub struct Plan {
    pub instance: String,
    pub config: CheckConfig,
    pub dependencies: Vec<PlannedDependency>,
    /// Every label key used by any endpoint.
    pub custom_labels: BTreeSet<String>,
}

impl Plan {
    pub fn endpoint_count(&self) -> usize {
        self.dependencies
            .iter()
            .map(|d| d.dependency.endpoints().len())
            .sum()
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The global check config from `[check]`.
    pub fn check_config(&self) -> Result<CheckConfig, ValidationError> {
        self.check.apply(CheckConfig::builder())?.build()
    }

    /// Validate the whole file and build every dependency and checker.
    pub fn plan(&self) -> anyhow::Result<Plan> {
        validate_name(&self.name).context("instance name")?;
        let config = self.check_config().context("[check]")?;

        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        let mut custom_labels = BTreeSet::new();
        let mut seen = BTreeSet::new();

        for section in &self.dependencies {
            if !seen.insert(section.name.as_str()) {
                bail!("dependency {:?} is declared more than once", section.name);
            }
            let planned = section
                .plan(&config)
                .with_context(|| format!("dependency {:?}", section.name))?;
            for endpoint in planned.dependency.endpoints() {
                custom_labels.extend(endpoint.labels().keys().cloned());
            }
            dependencies.push(planned);
        }

        Ok(Plan {
            instance: self.name.clone(),
            config,
            dependencies,
            custom_labels,
        })
    }
}

impl CheckSection {
    /// Layer the fields that are set onto `builder`.
    pub fn apply(
        &self,
        mut builder: CheckConfigBuilder,
    ) -> Result<CheckConfigBuilder, ValidationError> {
        if let Some(interval) = &self.interval {
            builder = builder.interval(parse_duration(interval)?);
        }
        if let Some(timeout) = &self.timeout {
            builder = builder.timeout(parse_duration(timeout)?);
        }
        if let Some(delay) = &self.initial_delay {
            builder = builder.initial_delay(parse_duration(delay)?);
        }
        if let Some(threshold) = self.failure_threshold {
            builder = builder.failure_threshold(threshold);
        }
        if let Some(threshold) = self.success_threshold {
            builder = builder.success_threshold(threshold);
        }
        Ok(builder)
    }
}

impl DependencySection {
    fn plan(&self, global: &CheckConfig) -> anyhow::Result<PlannedDependency> {
        let checker = self.checker()?;

        let config = match &self.check {
            Some(overrides) => overrides.apply(global.to_builder())?.build()?,
            None => *global,
        };

        let mut builder = Dependency::builder(&self.name, self.dep_type).config(config);
        if let Some(critical) = self.critical {
            builder = builder.critical(critical);
        }
        for section in &self.endpoints {
            builder = builder.endpoint(section.endpoint(self.dep_type)?);
        }

        Ok(PlannedDependency {
            dependency: builder.build()?,
            checker,
        })
    }

    fn checker(&self) -> anyhow::Result<Arc<dyn Checker>> {
        match self.dep_type {
            DependencyType::Http => {
                let mut builder = HttpChecker::builder().headers(self.headers.clone());
                if let Some(path) = &self.health_path {
                    builder = builder.health_path(path.clone());
                }
                if let Some(token) = &self.bearer_token {
                    builder = builder.bearer_token(token.clone());
                }
                if let Some(auth) = &self.basic_auth {
                    builder = builder.basic_auth(auth.username.clone(), auth.password.clone());
                }
                Ok(Arc::new(builder.build()?))
            }
            DependencyType::Custom => {
                bail!(
                    "type \"custom\" needs a programmatic checker and cannot be configured from a file"
                )
            }
            other => {
                let http_only = self.health_path.is_some()
                    || !self.headers.is_empty()
                    || self.bearer_token.is_some()
                    || self.basic_auth.is_some();
                if http_only {
                    bail!(
                        "health_path, headers and auth options only apply to http dependencies, not {other}"
                    );
                }
                Ok(Arc::new(TcpChecker::new()))
            }
        }
    }
}

impl EndpointSection {
    fn endpoint(&self, dep_type: DependencyType) -> anyhow::Result<Endpoint> {
        let port = match &self.port {
            Some(port) => port.to_string(),
            None => match dep_type.default_port() {
                Some(port) => port.to_string(),
                None => bail!("endpoint {:?} needs a port: {dep_type} has no default", self.host),
            },
        };

        let mut endpoint = Endpoint::new(&self.host, port)?;
        for (key, value) in &self.labels {
            endpoint = endpoint.with_label(key, value)?;
        }
        Ok(endpoint)
    }
}
