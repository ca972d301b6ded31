//! Stored stacks and the status view derived from live cluster state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::{Orchestrator, StackSpec};
use crate::swarm::{SwarmStackSpec, TaskState, Version};

pub type StackId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackMeta {
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    pub id: StackId,
    pub meta: StackMeta,
    pub spec: StackSpec,
    pub orchestrator: Orchestrator,
    #[serde(default)]
    pub status: StackStatus,
}

/// Orchestrator-native twin of a [`Stack`], consumed by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwarmStack {
    pub id: StackId,
    pub meta: StackMeta,
    pub spec: SwarmStackSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackCreateResponse {
    pub id: StackId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Service,
    Secret,
    Config,
    Task,
    Node,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Service => f.write_str("service"),
            ResourceKind::Secret => f.write_str("secret"),
            ResourceKind::Config => f.write_str("config"),
            ResourceKind::Task => f.write_str("task"),
            ResourceKind::Node => f.write_str("node"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub current_tasks: u64,
    pub desired_tasks: u64,
}

/// One orchestrator object owned by a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct StackResource {
    pub kind: ResourceKind,
    pub name: String,
    pub id: String,
}

/// Rollup over the per-service counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StackHealth {
    /// No services observed yet.
    #[default]
    Pending,
    Healthy,
    Partial,
    Failing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackStatus {
    /// Keyed by orchestrator service name.
    #[serde(default)]
    pub services_status: BTreeMap<String, ServiceStatus>,
    /// Sorted by kind, then name.
    #[serde(default)]
    pub resources: Vec<StackResource>,
    #[serde(default)]
    pub health: StackHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackTask {
    pub id: String,
    pub service_id: String,
    /// Empty when the service has already been removed.
    pub service_name: String,
    pub node_id: Option<String>,
    pub slot: Option<u64>,
    pub current_state: TaskState,
    pub desired_state: TaskState,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackTaskList {
    pub tasks: Vec<StackTask>,
}
