//! Stacks status: correlate live orchestrator resources back to their
//! stacks and compute per-service replica health.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::histogram;
use stacks_core::{Stack, StackResult, StackTaskList};
use stacks_swarmhub::SwarmResourceBackend;
use tracing::info;

pub mod aggregate;
pub mod correlate;
pub mod fetch;
pub mod join;

pub use aggregate::{aggregate, rollup, stack_status, stack_tasks};
pub use correlate::filter_for;
pub use fetch::{fetch_stack_resources, StackResources};
pub use join::join_by_stack;

/// Fill in `status` for each stack from the live cluster state.
pub async fn with_status(
    backend: &dyn SwarmResourceBackend,
    stack_label: &str,
    stacks: Vec<Stack>,
) -> StackResult<Vec<Stack>> {
    let t0 = Instant::now();
    let ids: Vec<String> = stacks.iter().map(|s| s.id.clone()).collect();
    let res = fetch_stack_resources(backend, stack_label, &ids).await?;
    let out = aggregate(stacks, &res)?;
    histogram!("stack_status_ms", t0.elapsed().as_secs_f64() * 1000.0);
    info!(stacks = out.len(), took_ms = %t0.elapsed().as_millis(), "status: aggregated");
    Ok(out)
}

/// Tasks currently belonging to one stack.
pub async fn task_list(
    backend: &dyn SwarmResourceBackend,
    stack_label: &str,
    stack_id: &str,
) -> StackResult<StackTaskList> {
    let ids = vec![stack_id.to_string()];
    let res = fetch_stack_resources(backend, stack_label, &ids).await?;
    stack_tasks(stack_id, &res)
}
