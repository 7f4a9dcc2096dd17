//! dispatchd.toml configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable daemon. CLI flags are applied on top with [`DispatchConfig::apply`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use dispatch_engine::RefreshPolicy;
use dispatch_registry::{DEFAULT_EDGE_LABEL, KubeApiRegistry, RegistryClient, StaticRegistry};
use serde::Deserialize;
use tracing::info;

pub const DEFAULT_PORT: u16 = 6442;
pub const DEFAULT_DATA_DIR: &str = "/var/lib/edge-dispatch";
pub const DEFAULT_DB_FILE: &str = "dispatch.redb";
/// Node API used outside a cluster when no `api_url` is set (`kubectl proxy`).
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8001";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_file: String,
    pub edge_label: String,
    pub request_timeout: String,
    pub refresh: RefreshConfig,
    pub registry: RegistryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            db_file: DEFAULT_DB_FILE.to_string(),
            edge_label: DEFAULT_EDGE_LABEL.to_string(),
            request_timeout: "10s".to_string(),
            refresh: RefreshConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    #[default]
    PerRequest,
    Interval,
    Startup,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    pub mode: RefreshMode,
    /// Only read when `mode = "interval"`.
    pub interval: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            mode: RefreshMode::PerRequest,
            interval: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    #[default]
    Kube,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub kind: RegistryKind,
    /// Base URL of the node API (kube mode). Unset means in-cluster when
    /// running in a pod, otherwise [`DEFAULT_PROXY_URL`].
    pub api_url: Option<String>,
    /// PEM CA bundle for an `https` api_url (kube mode).
    pub ca_file: Option<PathBuf>,
    /// Bearer token file (kube mode).
    pub token_file: Option<PathBuf>,
    /// Per-call timeout (kube mode).
    pub timeout: String,
    /// TOML nodes file (static mode).
    pub nodes_file: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kind: RegistryKind::Kube,
            api_url: None,
            ca_file: None,
            token_file: None,
            timeout: "5s".to_string(),
            nodes_file: None,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub edge_label: Option<String>,
    pub registry: Option<RegistryKind>,
    pub api_url: Option<String>,
    pub nodes_file: Option<PathBuf>,
    pub refresh: Option<RefreshMode>,
    pub refresh_interval: Option<String>,
}

impl DispatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(dir) = overrides.data_dir {
            self.data_dir = dir;
        }
        if let Some(label) = overrides.edge_label {
            self.edge_label = label;
        }
        if let Some(kind) = overrides.registry {
            self.registry.kind = kind;
        }
        if let Some(url) = overrides.api_url {
            self.registry.api_url = Some(url);
        }
        if let Some(file) = overrides.nodes_file {
            self.registry.nodes_file = Some(file);
        }
        if let Some(mode) = overrides.refresh {
            self.refresh.mode = mode;
        }
        if let Some(interval) = overrides.refresh_interval {
            self.refresh.interval = interval;
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn request_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("request_timeout", &self.request_timeout)
    }

    pub fn refresh_policy(&self) -> anyhow::Result<RefreshPolicy> {
        Ok(match self.refresh.mode {
            RefreshMode::PerRequest => RefreshPolicy::PerRequest,
            RefreshMode::Startup => RefreshPolicy::Startup,
            RefreshMode::Interval => {
                let interval = duration_field("refresh.interval", &self.refresh.interval)?;
                if interval.is_zero() {
                    bail!("refresh.interval must be greater than zero");
                }
                RefreshPolicy::Interval(interval)
            }
        })
    }

    /// Build the registry client selected by `registry.kind`.
    pub fn build_registry(&self) -> anyhow::Result<RegistryClient> {
        match self.registry.kind {
            RegistryKind::Static => {
                let path = self
                    .registry
                    .nodes_file
                    .as_deref()
                    .context("registry.nodes_file is required for the static registry")?;
                Ok(RegistryClient::Static(StaticRegistry::from_file(path)?))
            }
            RegistryKind::Kube => {
                let timeout = duration_field("registry.timeout", &self.registry.timeout)?;
                let mut client = match &self.registry.api_url {
                    Some(url) => {
                        let client = KubeApiRegistry::new(url)?;
                        match &self.registry.ca_file {
                            Some(path) => client.with_ca_file(path)?,
                            None => client,
                        }
                    }
                    None if KubeApiRegistry::in_cluster_available() => {
                        info!("using in-cluster node API");
                        KubeApiRegistry::in_cluster()?
                    }
                    None => KubeApiRegistry::new(DEFAULT_PROXY_URL)?,
                };
                if let Some(path) = &self.registry.token_file {
                    client = client.with_token_file(path)?;
                }
                Ok(RegistryClient::Kube(client.with_timeout(timeout)))
            }
        }
    }
}

fn duration_field(field: &str, value: &str) -> anyhow::Result<Duration> {
    parse_duration(value).with_context(|| format!("invalid duration for {field}: {value:?}"))
}

/// Parse "5s", "500ms", "2m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
