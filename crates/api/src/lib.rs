//! Stacks API façade (in-process).
//!
//! Frontends depend on [`StacksBackend`]. The default implementation converts
//! specs before persisting them and enriches stored stacks with status
//! computed from the live orchestrator.

#![forbid(unsafe_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use stacks_convert::{ensure_supported, StackConverter};
use stacks_core::{
    Stack, StackCreate, StackCreateResponse, StackError, StackMeta, StackResult, StackSpec, StackTaskList,
    StacksConfig, SwarmStack,
};
use stacks_store::{InMemoryStackStore, StackStore};
use stacks_swarmhub::SwarmResourceBackend;
use tracing::{info, warn};

/// Install the global subscriber. Filter comes from `STACKS_LOG` (default
/// `info`); calling it again is a no-op.
pub fn init_tracing() {
    let env = std::env::var("STACKS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Stack management surface.
#[async_trait::async_trait]
pub trait StacksBackend: Send + Sync {
    /// Convert and store a new stack; returns its generated ID.
    async fn create_stack(&self, create: StackCreate) -> StackResult<StackCreateResponse>;

    /// Stored stack with freshly computed status.
    async fn get_stack(&self, id: &str) -> StackResult<Stack>;

    async fn get_swarm_stack(&self, id: &str) -> StackResult<SwarmStack>;

    /// Every stored stack with freshly computed status.
    async fn list_stacks(&self) -> StackResult<Vec<Stack>>;

    async fn list_swarm_stacks(&self) -> StackResult<Vec<SwarmStack>>;

    /// Tasks currently running (or failing) for a stack.
    async fn get_stack_tasks(&self, id: &str) -> StackResult<StackTaskList>;

    /// Reconvert `spec` under the same ID and store it if `version` is
    /// still current.
    async fn update_stack(&self, id: &str, spec: StackSpec, version: u64) -> StackResult<StackMeta>;

    async fn delete_stack(&self, id: &str) -> StackResult<()>;
}

// ----------------- Default implementation -----------------

pub struct DefaultStacksBackend {
    store: Arc<dyn StackStore>,
    swarm: Arc<dyn SwarmResourceBackend>,
    converter: StackConverter,
}

impl DefaultStacksBackend {
    pub fn new(config: StacksConfig, store: Arc<dyn StackStore>, swarm: Arc<dyn SwarmResourceBackend>) -> Self {
        let converter = StackConverter::new(config, Arc::clone(&swarm));
        Self { store, swarm, converter }
    }

    /// Backend over a fresh in-memory store.
    pub fn in_memory(config: StacksConfig, swarm: Arc<dyn SwarmResourceBackend>) -> Self {
        Self::new(config, Arc::new(InMemoryStackStore::new()), swarm)
    }

    fn stack_label(&self) -> &str { &self.converter.config().stack_label }
}

#[async_trait::async_trait]
impl StacksBackend for DefaultStacksBackend {
    async fn create_stack(&self, create: StackCreate) -> StackResult<StackCreateResponse> {
        let t0 = Instant::now();
        ensure_supported(create.orchestrator)?;
        let id = uuid::Uuid::new_v4().to_string();
        info!(stack_id = %id, name = %create.spec.metadata.name, "api: create_stack start");
        let swarm_spec = self.converter.convert(&id, &create.spec).await?;
        self.store.add_stack(&id, create.orchestrator, create.spec, swarm_spec).await?;
        counter!("stack_create_total", 1u64);
        info!(stack_id = %id, took_ms = %t0.elapsed().as_millis(), "api: create_stack ok");
        Ok(StackCreateResponse { id })
    }

    async fn get_stack(&self, id: &str) -> StackResult<Stack> {
        let stack = self.store.get_stack(id).await?;
        let mut out = stacks_status::with_status(self.swarm.as_ref(), self.stack_label(), vec![stack]).await?;
        out.pop().ok_or_else(|| StackError::StackNotFound { id: id.to_string() })
    }

    async fn get_swarm_stack(&self, id: &str) -> StackResult<SwarmStack> {
        self.store.get_swarm_stack(id).await
    }

    async fn list_stacks(&self) -> StackResult<Vec<Stack>> {
        let t0 = Instant::now();
        let stacks = self.store.list_stacks().await?;
        let out = stacks_status::with_status(self.swarm.as_ref(), self.stack_label(), stacks).await?;
        info!(count = out.len(), took_ms = %t0.elapsed().as_millis(), "api: list_stacks ok");
        Ok(out)
    }

    async fn list_swarm_stacks(&self) -> StackResult<Vec<SwarmStack>> {
        self.store.list_swarm_stacks().await
    }

    async fn get_stack_tasks(&self, id: &str) -> StackResult<StackTaskList> {
        // Unknown stacks are an error, not an empty list.
        self.store.get_stack(id).await?;
        stacks_status::task_list(self.swarm.as_ref(), self.stack_label(), id).await
    }

    async fn update_stack(&self, id: &str, spec: StackSpec, version: u64) -> StackResult<StackMeta> {
        let t0 = Instant::now();
        let current = self.store.get_stack(id).await?;
        ensure_supported(current.orchestrator)?;
        let swarm_spec = self.converter.convert(id, &spec).await?;
        match self.store.update_stack(id, spec, swarm_spec, version).await {
            Ok(meta) => {
                info!(stack_id = %id, version = meta.version.index, took_ms = %t0.elapsed().as_millis(), "api: update_stack ok");
                Ok(meta)
            }
            Err(e) => {
                warn!(stack_id = %id, error = %e, "api: update_stack failed");
                Err(e)
            }
        }
    }

    async fn delete_stack(&self, id: &str) -> StackResult<()> {
        self.store.delete_stack(id).await?;
        info!(stack_id = %id, "api: delete_stack ok");
        Ok(())
    }
}
