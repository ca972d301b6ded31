//! Stacks core types: declarative stack specs, orchestrator-native specs,
//! stack status, label correlation primitives and errors.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod labels;
pub mod spec;
pub mod stack;
pub mod swarm;

pub use config::StacksConfig;
pub use error::{ConversionStage, StackError, StackResult};
pub use labels::{stack_label_filter, LabelFilter, Labeled, DEFAULT_STACK_LABEL, NAMESPACE_LABEL};
pub use spec::{Orchestrator, StackCreate, StackSpec};
pub use stack::{
    ResourceKind, ServiceStatus, Stack, StackCreateResponse, StackHealth, StackId, StackMeta,
    StackResource, StackStatus, StackTask, StackTaskList, SwarmStack,
};
pub use swarm::SwarmStackSpec;

pub mod prelude {
    pub use super::{
        LabelFilter, Labeled, ResourceKind, Stack, StackError, StackResult, StackSpec, StacksConfig,
        SwarmStackSpec,
    };
    pub use super::swarm::{Config, Node, Secret, Service, Task, TaskState};
}
