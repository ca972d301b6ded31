//! Declarative, user-authored stack specification.
//!
//! Field shapes follow the compose v3 deploy model closely enough that a
//! compose loader can fill them, but no compose parsing lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Orchestrator {
    Swarm,
    Kubernetes,
}

impl std::fmt::Display for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orchestrator::Swarm => f.write_str("swarm"),
            Orchestrator::Kubernetes => f.write_str("kubernetes"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackMetadata {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackSpec {
    pub metadata: StackMetadata,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretConfig>,
    #[serde(default)]
    pub configs: BTreeMap<String, ConfigObjConfig>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// `KEY=VALUE` entries used to resolve `${KEY}` references elsewhere in the stack.
    #[serde(default)]
    pub property_values: Vec<String>,
}

/// Request body for creating a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackCreate {
    pub spec: StackSpec,
    pub orchestrator: Orchestrator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// A `None` value passes the variable through by name only.
    #[serde(default)]
    pub environment: BTreeMap<String, Option<String>>,
    /// Container labels (deploy labels go on the service itself).
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub ports: Vec<ServicePortConfig>,
    /// Network name to per-service attachment options. Empty means the
    /// service joins the stack's implicit `default` network.
    #[serde(default)]
    pub networks: BTreeMap<String, Option<ServiceNetworkConfig>>,
    #[serde(default)]
    pub secrets: Vec<ServiceFileRef>,
    #[serde(default)]
    pub configs: Vec<ServiceFileRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// `replicated` (default) or `global`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub replicas: Option<u64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// `vip` (default) or `dnsrr`.
    #[serde(default)]
    pub endpoint_mode: Option<String>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub placement: Placement,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartPolicy {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
    #[serde(default)]
    pub reservations: Option<ResourceLimits>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Fractional CPUs, e.g. "0.5".
    #[serde(default)]
    pub cpus: Option<String>,
    #[serde(default)]
    pub memory_bytes: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Placement {
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePortConfig {
    pub target: u32,
    #[serde(default)]
    pub published: Option<u32>,
    /// `tcp` (default), `udp` or `sctp`.
    #[serde(default)]
    pub protocol: Option<String>,
    /// `ingress` (default) or `host`.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceNetworkConfig {
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Service-side reference to a stack secret or config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceFileRef {
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(default)]
    pub mode: Option<u32>,
}

/// Top-level secret or config declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileObjectConfig {
    /// Overrides the namespaced name (or names the external object).
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    /// Property name whose value becomes the object's data.
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

pub type SecretConfig = FileObjectConfig;
pub type ConfigObjConfig = FileObjectConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub attachable: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub ipam: Option<IpamConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpamConfig {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub config: Vec<IpamPool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpamPool {
    pub subnet: String,
}
