//! Concurrent fetch of everything status aggregation needs.

use std::time::Instant;

use rustc_hash::FxHashMap;
use stacks_core::prelude::*;
use stacks_swarmhub::SwarmResourceBackend;
use tracing::debug;

use crate::correlate::filter_for;
use crate::join::join_by_stack;

/// Live resources grouped by owning stack, plus the cluster node count used
/// as the desired task count of global services.
#[derive(Debug, Default)]
pub struct StackResources {
    pub tasks: FxHashMap<String, Vec<Task>>,
    pub services: FxHashMap<String, Vec<Service>>,
    pub secrets: FxHashMap<String, Vec<Secret>>,
    pub configs: FxHashMap<String, Vec<Config>>,
    pub node_count: u64,
}

fn query_err(kind: ResourceKind, stack_ids: &[String], e: anyhow::Error) -> StackError {
    StackError::OrchestratorQuery { kind, stacks: stack_ids.to_vec(), reason: format!("{:#}", e) }
}

/// Fetch tasks, services, secrets, configs and nodes concurrently and group
/// them by stack. No IDs means no orchestrator round-trip at all.
pub async fn fetch_stack_resources(
    backend: &dyn SwarmResourceBackend,
    stack_label: &str,
    stack_ids: &[String],
) -> StackResult<StackResources> {
    if stack_ids.is_empty() {
        return Ok(StackResources::default());
    }
    let t0 = Instant::now();
    let filter = filter_for(stack_label, stack_ids);
    let (tasks, services, secrets, configs, nodes) = tokio::try_join!(
        async { backend.list_tasks(&filter).await.map_err(|e| query_err(ResourceKind::Task, stack_ids, e)) },
        async { backend.list_services(&filter).await.map_err(|e| query_err(ResourceKind::Service, stack_ids, e)) },
        async { backend.list_secrets(&filter).await.map_err(|e| query_err(ResourceKind::Secret, stack_ids, e)) },
        async { backend.list_configs(&filter).await.map_err(|e| query_err(ResourceKind::Config, stack_ids, e)) },
        async { backend.list_nodes().await.map_err(|e| query_err(ResourceKind::Node, stack_ids, e)) },
    )?;
    debug!(
        stacks = stack_ids.len(),
        tasks = tasks.len(),
        services = services.len(),
        nodes = nodes.len(),
        took_ms = %t0.elapsed().as_millis(),
        "status: fetched"
    );
    Ok(StackResources {
        tasks: join_by_stack(stack_label, stack_ids, tasks)?,
        services: join_by_stack(stack_label, stack_ids, services)?,
        secrets: join_by_stack(stack_label, stack_ids, secrets)?,
        configs: join_by_stack(stack_label, stack_ids, configs)?,
        node_count: nodes.len() as u64,
    })
}
