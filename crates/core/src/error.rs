//! Error taxonomy shared by conversion, status and the backend.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stack::ResourceKind;

pub type StackResult<T> = Result<T, StackError>;

/// Conversion pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStage {
    Services,
    Secrets,
    Configs,
    Networks,
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionStage::Services => f.write_str("services"),
            ConversionStage::Secrets => f.write_str("secrets"),
            ConversionStage::Configs => f.write_str("configs"),
            ConversionStage::Networks => f.write_str("networks"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("invalid orchestrator type {orchestrator}; this backend only supports orchestrator type swarm")]
    UnsupportedOrchestrator { orchestrator: String },

    #[error("substitution failed for stack {stack:?}: {reason}")]
    Substitution { stack: String, reason: String },

    #[error("failed to convert {stage} for stack {stack:?}: {reason}")]
    Conversion { stack: String, stage: ConversionStage, reason: String },

    /// A resource selected by the stack label key does not carry it.
    #[error("internal error: found {kind} {id} with no {label} label despite label filter")]
    LabelMissing { kind: ResourceKind, id: String, label: String },

    /// Per-stack grouping is missing a requested stack ID.
    #[error("internal error: {kind} grouping has no entry for requested stack {stack_id}")]
    ContractViolation { stack_id: String, kind: ResourceKind },

    #[error("unable to get {kind}s for stacks {stacks:?}: {reason}")]
    OrchestratorQuery { kind: ResourceKind, stacks: Vec<String>, reason: String },

    #[error("stack not found: {id}")]
    StackNotFound { id: String },

    #[error("stack {id} version conflict: expected {expected}, current {current}")]
    VersionConflict { id: String, expected: u64, current: u64 },

    #[error("stack store error: {0}")]
    Store(String),
}

impl StackError {
    /// Only orchestrator round-trips are worth retrying; everything else needs
    /// corrected input or signals a broken invariant.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StackError::OrchestratorQuery { .. })
    }

    pub fn conversion(stack: &str, stage: ConversionStage, err: anyhow::Error) -> Self {
        StackError::Conversion { stack: stack.to_string(), stage, reason: format!("{:#}", err) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_names_stage_and_chain() {
        let inner = anyhow::anyhow!("undefined network \"back\"").context("service web");
        let e = StackError::conversion("demo", ConversionStage::Networks, inner);
        let msg = e.to_string();
        assert!(msg.contains("networks"), "msg={}", msg);
        assert!(msg.contains("service web: undefined network"), "msg={}", msg);
        assert!(!e.is_retryable());
    }

    #[test]
    fn only_query_failures_are_retryable() {
        let e = StackError::OrchestratorQuery { kind: ResourceKind::Task, stacks: vec!["a".into()], reason: "timeout".into() };
        assert!(e.is_retryable());
        let e = StackError::LabelMissing { kind: ResourceKind::Task, id: "t1".into(), label: "l".into() };
        assert!(!e.is_retryable());
    }
}
