//! Stacks store: stacks and their orchestrator-native twins, kept in RAM
//! behind copy-on-write snapshots.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::Utc;
use metrics::counter;
use rustc_hash::FxHashMap;
use stacks_core::swarm::Version;
use stacks_core::{
    Orchestrator, Stack, StackError, StackMeta, StackResult, StackSpec, StackStatus, SwarmStack, SwarmStackSpec,
};
use tokio::sync::watch;
use tracing::{debug, info};

/// Persistence seam for stacks. Every write bumps the stack's version to a
/// store-wide, strictly increasing index.
#[async_trait::async_trait]
pub trait StackStore: Send + Sync {
    async fn add_stack(
        &self,
        id: &str,
        orchestrator: Orchestrator,
        spec: StackSpec,
        swarm_spec: SwarmStackSpec,
    ) -> StackResult<StackMeta>;
    async fn get_stack(&self, id: &str) -> StackResult<Stack>;
    async fn get_swarm_stack(&self, id: &str) -> StackResult<SwarmStack>;
    async fn list_stacks(&self) -> StackResult<Vec<Stack>>;
    async fn list_swarm_stacks(&self) -> StackResult<Vec<SwarmStack>>;
    /// Fails with `VersionConflict` unless `version` is the current index.
    async fn update_stack(
        &self,
        id: &str,
        spec: StackSpec,
        swarm_spec: SwarmStackSpec,
        version: u64,
    ) -> StackResult<StackMeta>;
    async fn delete_stack(&self, id: &str) -> StackResult<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    meta: StackMeta,
    orchestrator: Orchestrator,
    spec: StackSpec,
    swarm_spec: SwarmStackSpec,
}

impl Entry {
    fn stack(&self, id: &str) -> Stack {
        Stack {
            id: id.to_string(),
            meta: self.meta.clone(),
            spec: self.spec.clone(),
            orchestrator: self.orchestrator,
            status: StackStatus::default(),
        }
    }

    fn swarm_stack(&self, id: &str) -> SwarmStack {
        SwarmStack { id: id.to_string(), meta: self.meta.clone(), spec: self.swarm_spec.clone() }
    }
}

/// Immutable view of the whole store at one index.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    index: u64,
    entries: FxHashMap<String, Entry>,
}

impl StoreSnapshot {
    pub fn index(&self) -> u64 { self.index }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Entries ordered by creation time, then ID.
    fn sorted(&self) -> Vec<(&String, &Entry)> {
        let mut v: Vec<_> = self.entries.iter().collect();
        v.sort_by(|a, b| (a.1.meta.created_at, a.0).cmp(&(b.1.meta.created_at, b.0)));
        v
    }
}

/// In-memory [`StackStore`]. Readers load the current snapshot without
/// locking; writers serialize on `write`, clone, modify and swap.
pub struct InMemoryStackStore {
    snap: ArcSwap<StoreSnapshot>,
    write: Mutex<()>,
    index_tx: watch::Sender<u64>,
}

impl Default for InMemoryStackStore {
    fn default() -> Self { Self::new() }
}

impl InMemoryStackStore {
    pub fn new() -> Self {
        let (index_tx, _) = watch::channel(0u64);
        Self { snap: ArcSwap::from_pointee(StoreSnapshot::default()), write: Mutex::new(()), index_tx }
    }

    pub fn current(&self) -> Arc<StoreSnapshot> { self.snap.load_full() }

    /// Receives the store index after every committed write.
    pub fn subscribe_index(&self) -> watch::Receiver<u64> { self.index_tx.subscribe() }

    fn commit<T>(&self, op: &'static str, f: impl FnOnce(&mut StoreSnapshot, u64) -> StackResult<T>) -> StackResult<T> {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = StoreSnapshot::clone(&self.snap.load());
        let index = next.index.saturating_add(1);
        let out = f(&mut next, index);
        match &out {
            Ok(_) => {
                next.index = index;
                self.snap.store(Arc::new(next));
                self.index_tx.send_replace(index);
                counter!("stack_store_ops_total", 1u64, "op" => op);
                debug!(op, index, "store: committed");
            }
            Err(e) => {
                counter!("stack_store_err_total", 1u64, "op" => op);
                debug!(op, error = %e, "store: rejected");
            }
        }
        out
    }

    fn not_found(id: &str) -> StackError { StackError::StackNotFound { id: id.to_string() } }
}

#[async_trait::async_trait]
impl StackStore for InMemoryStackStore {
    async fn add_stack(
        &self,
        id: &str,
        orchestrator: Orchestrator,
        spec: StackSpec,
        swarm_spec: SwarmStackSpec,
    ) -> StackResult<StackMeta> {
        let meta = self.commit("add", |snap, index| {
            if snap.entries.contains_key(id) {
                return Err(StackError::Store(format!("stack {} already exists", id)));
            }
            let now = Utc::now();
            let meta = StackMeta { version: Version { index }, created_at: now, updated_at: now };
            snap.entries.insert(id.to_string(), Entry { meta: meta.clone(), orchestrator, spec, swarm_spec });
            Ok(meta)
        })?;
        info!(stack_id = %id, version = meta.version.index, "store: stack added");
        Ok(meta)
    }

    async fn get_stack(&self, id: &str) -> StackResult<Stack> {
        let snap = self.snap.load();
        snap.entries.get(id).map(|e| e.stack(id)).ok_or_else(|| Self::not_found(id))
    }

    async fn get_swarm_stack(&self, id: &str) -> StackResult<SwarmStack> {
        let snap = self.snap.load();
        snap.entries.get(id).map(|e| e.swarm_stack(id)).ok_or_else(|| Self::not_found(id))
    }

    async fn list_stacks(&self) -> StackResult<Vec<Stack>> {
        let snap = self.snap.load();
        Ok(snap.sorted().into_iter().map(|(id, e)| e.stack(id)).collect())
    }

    async fn list_swarm_stacks(&self) -> StackResult<Vec<SwarmStack>> {
        let snap = self.snap.load();
        Ok(snap.sorted().into_iter().map(|(id, e)| e.swarm_stack(id)).collect())
    }

    async fn update_stack(
        &self,
        id: &str,
        spec: StackSpec,
        swarm_spec: SwarmStackSpec,
        version: u64,
    ) -> StackResult<StackMeta> {
        let meta = self.commit("update", |snap, index| {
            let entry = snap.entries.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            if entry.meta.version.index != version {
                return Err(StackError::VersionConflict {
                    id: id.to_string(),
                    expected: version,
                    current: entry.meta.version.index,
                });
            }
            entry.meta.version = Version { index };
            entry.meta.updated_at = Utc::now();
            entry.spec = spec;
            entry.swarm_spec = swarm_spec;
            Ok(entry.meta.clone())
        })?;
        info!(stack_id = %id, version = meta.version.index, "store: stack updated");
        Ok(meta)
    }

    async fn delete_stack(&self, id: &str) -> StackResult<()> {
        self.commit("delete", |snap, _| snap.entries.remove(id).map(|_| ()).ok_or_else(|| Self::not_found(id)))?;
        info!(stack_id = %id, "store: stack deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_write_leaves_index_alone() {
        let store = InMemoryStackStore::new();
        assert!(store.delete_stack("nope").await.is_err());
        assert_eq!(store.current().index(), 0);
        store.add_stack("a", Orchestrator::Swarm, StackSpec::default(), SwarmStackSpec::default()).await.unwrap();
        assert_eq!(store.current().index(), 1);
        assert_eq!(*store.subscribe_index().borrow(), 1);
    }
}
