//! Stacks swarmhub – the orchestrator resource backend consumed by conversion
//! and status, plus an in-memory snapshot backend.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use arc_swap::ArcSwap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use stacks_core::prelude::*;
use tracing::debug;

/// Query interface onto the orchestrator. Each list call accepts one label
/// predicate; name lookups resolve secrets/configs referenced by services.
#[async_trait::async_trait]
pub trait SwarmResourceBackend: Send + Sync {
    async fn list_tasks(&self, filter: &LabelFilter) -> Result<Vec<Task>>;
    async fn list_services(&self, filter: &LabelFilter) -> Result<Vec<Service>>;
    async fn list_secrets(&self, filter: &LabelFilter) -> Result<Vec<Secret>>;
    async fn list_configs(&self, filter: &LabelFilter) -> Result<Vec<Config>>;
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Find a secret by its orchestrator-side name.
    async fn lookup_secret(&self, name: &str) -> Result<Option<Secret>>;
    /// Find a config by its orchestrator-side name.
    async fn lookup_config(&self, name: &str) -> Result<Option<Config>>;
}

/// Point-in-time view of the cluster objects the engine reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub configs: Vec<Config>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl ClusterSnapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parsing cluster snapshot JSON")
    }
}

/// Backend answering from a swappable [`ClusterSnapshot`], applying label
/// filters the way the orchestrator does. Records issued queries so callers
/// can check which predicate reached the orchestrator.
pub struct InMemorySwarm {
    snap: ArcSwap<ClusterSnapshot>,
    queries: Mutex<Vec<(ResourceKind, LabelFilter)>>,
    failing: Mutex<Option<ResourceKind>>,
}

impl Default for InMemorySwarm {
    fn default() -> Self { Self::new(ClusterSnapshot::default()) }
}

impl InMemorySwarm {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            snap: ArcSwap::from_pointee(snapshot),
            queries: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Arc<ClusterSnapshot> { self.snap.load_full() }

    pub fn replace(&self, snapshot: ClusterSnapshot) { self.snap.store(Arc::new(snapshot)); }

    /// Make every list call for `kind` fail until cleared with `None`.
    pub fn fail_on(&self, kind: Option<ResourceKind>) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = kind;
    }

    /// Queries issued so far, in order.
    pub fn queries(&self) -> Vec<(ResourceKind, LabelFilter)> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, kind: ResourceKind, filter: &LabelFilter) -> Result<()> {
        counter!("swarm_query_total", 1u64);
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).push((kind, filter.clone()));
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) == Some(kind) {
            return Err(anyhow!("orchestrator unavailable while listing {}s", kind));
        }
        debug!(kind = %kind, filter = ?filter.to_query_arg(), "swarm: list");
        Ok(())
    }

    fn select<T: Labeled + Clone>(items: &[T], filter: &LabelFilter) -> Vec<T> {
        items.iter().filter(|o| filter.matches(o.labels())).cloned().collect()
    }
}

#[async_trait::async_trait]
impl SwarmResourceBackend for InMemorySwarm {
    async fn list_tasks(&self, filter: &LabelFilter) -> Result<Vec<Task>> {
        self.record(ResourceKind::Task, filter)?;
        Ok(Self::select(&self.snap.load().tasks, filter))
    }

    async fn list_services(&self, filter: &LabelFilter) -> Result<Vec<Service>> {
        self.record(ResourceKind::Service, filter)?;
        Ok(Self::select(&self.snap.load().services, filter))
    }

    async fn list_secrets(&self, filter: &LabelFilter) -> Result<Vec<Secret>> {
        self.record(ResourceKind::Secret, filter)?;
        Ok(Self::select(&self.snap.load().secrets, filter))
    }

    async fn list_configs(&self, filter: &LabelFilter) -> Result<Vec<Config>> {
        self.record(ResourceKind::Config, filter)?;
        Ok(Self::select(&self.snap.load().configs, filter))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.snap.load().nodes.clone())
    }

    async fn lookup_secret(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.snap.load().secrets.iter().find(|s| s.spec.annotations.name == name).cloned())
    }

    async fn lookup_config(&self, name: &str) -> Result<Option<Config>> {
        Ok(self.snap.load().configs.iter().find(|c| c.spec.annotations.name == name).cloned())
    }
}
