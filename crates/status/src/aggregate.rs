//! Per-stack replica counts, resource inventory and health.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use stacks_core::prelude::*;
use stacks_core::swarm::ServiceMode;
use stacks_core::{ServiceStatus, StackHealth, StackResource, StackStatus, StackTask, StackTaskList};

use crate::fetch::StackResources;

fn grouped<'a, T: Labeled>(by_stack: &'a FxHashMap<String, Vec<T>>, stack_id: &str) -> StackResult<&'a [T]> {
    by_stack
        .get(stack_id)
        .map(Vec::as_slice)
        .ok_or_else(|| StackError::ContractViolation { stack_id: stack_id.to_string(), kind: T::KIND })
}

fn inventory_entry<T: Labeled>(o: &T) -> StackResource {
    StackResource { kind: T::KIND, name: o.name().to_string(), id: o.id().to_string() }
}

/// Replicated services want their replica count; global services want one
/// task per node.
pub fn desired_tasks(mode: &ServiceMode, node_count: u64) -> u64 {
    match mode {
        ServiceMode::Replicated { replicas } => *replicas,
        ServiceMode::Global => node_count,
    }
}

/// Running tasks of `service_id`.
pub fn current_tasks(tasks: &[Task], service_id: &str) -> u64 {
    tasks.iter().filter(|t| t.service_id == service_id && t.status.state == TaskState::Running).count() as u64
}

pub fn rollup(services: &BTreeMap<String, ServiceStatus>) -> StackHealth {
    if services.is_empty() {
        return StackHealth::Pending;
    }
    if services.values().all(|s| s.current_tasks >= s.desired_tasks) {
        return StackHealth::Healthy;
    }
    if services.values().any(|s| s.desired_tasks > 0 && s.current_tasks == 0) {
        return StackHealth::Failing;
    }
    StackHealth::Partial
}

/// Status of one stack from already-grouped resources.
pub fn stack_status(stack_id: &str, res: &StackResources) -> StackResult<StackStatus> {
    let services = grouped(&res.services, stack_id)?;
    let tasks = grouped(&res.tasks, stack_id)?;
    let secrets = grouped(&res.secrets, stack_id)?;
    let configs = grouped(&res.configs, stack_id)?;

    let mut resources: Vec<StackResource> = services.iter().map(inventory_entry).collect();
    resources.extend(secrets.iter().map(inventory_entry));
    resources.extend(configs.iter().map(inventory_entry));
    resources.sort();

    let mut services_status = BTreeMap::new();
    for svc in services {
        services_status.insert(
            svc.spec.annotations.name.clone(),
            ServiceStatus {
                current_tasks: current_tasks(tasks, &svc.id),
                desired_tasks: desired_tasks(&svc.spec.mode, res.node_count),
            },
        );
    }
    let health = rollup(&services_status);
    Ok(StackStatus { services_status, resources, health })
}

/// Attach a freshly computed status to every stack, keeping input order.
pub fn aggregate(stacks: Vec<Stack>, res: &StackResources) -> StackResult<Vec<Stack>> {
    stacks
        .into_iter()
        .map(|mut stack| {
            stack.status = stack_status(&stack.id, res)?;
            Ok(stack)
        })
        .collect()
}

/// Tasks of one stack with their service names, ordered by service, slot
/// and task ID.
pub fn stack_tasks(stack_id: &str, res: &StackResources) -> StackResult<StackTaskList> {
    let services = grouped(&res.services, stack_id)?;
    let tasks = grouped(&res.tasks, stack_id)?;
    let names: FxHashMap<&str, &str> =
        services.iter().map(|s| (s.id.as_str(), s.spec.annotations.name.as_str())).collect();
    let mut out: Vec<StackTask> = tasks
        .iter()
        .map(|t| StackTask {
            id: t.id.clone(),
            service_id: t.service_id.clone(),
            service_name: names.get(t.service_id.as_str()).map(|n| n.to_string()).unwrap_or_default(),
            node_id: t.node_id.clone(),
            slot: t.slot,
            current_state: t.status.state,
            desired_state: t.desired_state,
            message: t.status.message.clone(),
        })
        .collect();
    out.sort_by(|a, b| (&a.service_name, a.slot, &a.id).cmp(&(&b.service_name, b.slot, &b.id)));
    Ok(StackTaskList { tasks: out })
}
