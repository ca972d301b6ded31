#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use stacks_api::{init_tracing, DefaultStacksBackend, StacksBackend};
use stacks_core::prelude::*;
use stacks_core::spec::{DeployConfig, ServiceConfig, StackMetadata};
use stacks_core::swarm::{TaskStatus, Version};
use stacks_core::{Orchestrator, StackCreate, StackHealth, DEFAULT_STACK_LABEL};
use stacks_swarmhub::{ClusterSnapshot, InMemorySwarm};

fn demo(replicas: u64) -> StackSpec {
    StackSpec {
        metadata: StackMetadata { name: "demo".into(), labels: BTreeMap::new() },
        services: vec![ServiceConfig {
            name: "web".into(),
            image: "nginx".into(),
            deploy: DeployConfig { replicas: Some(replicas), ..Default::default() },
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn setup() -> (Arc<InMemorySwarm>, DefaultStacksBackend) {
    init_tracing();
    let swarm = Arc::new(InMemorySwarm::default());
    let backend = DefaultStacksBackend::in_memory(StacksConfig::default(), swarm.clone());
    (swarm, backend)
}

/// Stand in for the reconciler: materialize the stored swarm spec with
/// `running` tasks per service.
fn reconcile(swarm_stack: &stacks_core::SwarmStack, running: u64) -> ClusterSnapshot {
    let mut snap = ClusterSnapshot::default();
    for (i, spec) in swarm_stack.spec.services.iter().enumerate() {
        let svc_id = format!("svc-{}", i);
        for t in 0..running {
            snap.tasks.push(Task {
                id: format!("{}-t{}", svc_id, t),
                service_id: svc_id.clone(),
                slot: Some(t + 1),
                labels: spec.annotations.labels.clone(),
                status: TaskStatus { state: TaskState::Running, message: String::new() },
                desired_state: TaskState::Running,
                ..Default::default()
            });
        }
        snap.services.push(Service { id: svc_id, version: Version::default(), spec: spec.clone() });
    }
    snap.nodes = vec![Node { id: "n1".into(), hostname: "n1".into() }];
    snap
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_then_status_follows_cluster() {
    let (swarm, backend) = setup();
    let id = backend.create_stack(StackCreate { spec: demo(2), orchestrator: Orchestrator::Swarm }).await.unwrap().id;

    let swarm_stack = backend.get_swarm_stack(&id).await.unwrap();
    assert_eq!(swarm_stack.spec.services.len(), 1);
    assert_eq!(swarm_stack.spec.services[0].annotations.name, "demo_web");
    assert_eq!(
        swarm_stack.spec.services[0].annotations.labels.get(DEFAULT_STACK_LABEL),
        Some(&id)
    );

    // Nothing deployed yet.
    let st = backend.get_stack(&id).await.unwrap().status;
    assert_eq!(st.health, StackHealth::Pending);

    swarm.replace(reconcile(&swarm_stack, 1));
    let st = backend.get_stack(&id).await.unwrap().status;
    let web = st.services_status["demo_web"];
    assert_eq!((web.current_tasks, web.desired_tasks), (1, 2));
    assert_eq!(st.health, StackHealth::Partial);

    swarm.replace(reconcile(&swarm_stack, 2));
    assert_eq!(backend.get_stack(&id).await.unwrap().status.health, StackHealth::Healthy);

    let tasks = backend.get_stack_tasks(&id).await.unwrap().tasks;
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.service_name == "demo_web"));
}

#[tokio::test]
async fn kubernetes_is_rejected_before_anything_is_stored() {
    let (_swarm, backend) = setup();
    let e = backend
        .create_stack(StackCreate { spec: demo(1), orchestrator: Orchestrator::Kubernetes })
        .await
        .unwrap_err();
    assert!(matches!(e, StackError::UnsupportedOrchestrator { .. }), "e={:?}", e);
    assert!(backend.list_stacks().await.unwrap().is_empty());
}

#[tokio::test]
async fn conversion_failure_is_not_stored() {
    let (_swarm, backend) = setup();
    let mut spec = demo(1);
    spec.services[0].image = "${IMAGE?no image}".into();
    let e = backend.create_stack(StackCreate { spec, orchestrator: Orchestrator::Swarm }).await.unwrap_err();
    assert!(matches!(e, StackError::Substitution { .. }), "e={:?}", e);
    assert!(backend.list_swarm_stacks().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_is_version_checked_and_keeps_the_id_label() {
    let (_swarm, backend) = setup();
    let id = backend.create_stack(StackCreate { spec: demo(1), orchestrator: Orchestrator::Swarm }).await.unwrap().id;
    let v = backend.get_stack(&id).await.unwrap().meta.version.index;

    let meta = backend.update_stack(&id, demo(4), v).await.unwrap();
    assert!(meta.version.index > v);
    let stored = backend.get_swarm_stack(&id).await.unwrap();
    assert_eq!(stored.spec.services[0].mode, stacks_core::swarm::ServiceMode::Replicated { replicas: 4 });
    assert_eq!(stored.spec.services[0].annotations.labels.get(DEFAULT_STACK_LABEL), Some(&id));

    let e = backend.update_stack(&id, demo(5), v).await.unwrap_err();
    assert!(matches!(e, StackError::VersionConflict { .. }), "e={:?}", e);
}

#[tokio::test]
async fn list_and_delete() {
    let (_swarm, backend) = setup();
    let a = backend.create_stack(StackCreate { spec: demo(1), orchestrator: Orchestrator::Swarm }).await.unwrap().id;
    let b = backend.create_stack(StackCreate { spec: demo(1), orchestrator: Orchestrator::Swarm }).await.unwrap().id;
    assert_ne!(a, b);

    let listed = backend.list_stacks().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|s| s.status.health == StackHealth::Pending));

    backend.delete_stack(&a).await.unwrap();
    assert!(matches!(backend.get_stack(&a).await, Err(StackError::StackNotFound { .. })));
    assert!(matches!(backend.get_stack_tasks(&a).await, Err(StackError::StackNotFound { .. })));
    assert_eq!(backend.list_swarm_stacks().await.unwrap().len(), 1);
}
