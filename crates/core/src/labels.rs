//! Stack label keys and the label predicate handed to the orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stack::ResourceKind;
use crate::swarm::{Config, Secret, Service, Task};

/// Default label key whose value is the owning stack's ID.
pub const DEFAULT_STACK_LABEL: &str = "com.docker.stacks.stack_id";

/// Label carrying the stack name (namespace) on every converted resource.
pub const NAMESPACE_LABEL: &str = "com.docker.stack.namespace";

/// Label predicate understood by the orchestrator query interface. The
/// query layer supports equality or key presence on one label, never set
/// membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelFilter {
    /// No label constraint. Only built for an empty stack ID set, which the
    /// fetch layer answers locally without querying.
    #[default]
    None,
    Equals { key: String, value: String },
    HasKey { key: String },
}

impl LabelFilter {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            LabelFilter::None => true,
            LabelFilter::Equals { key, value } => labels.get(key).is_some_and(|v| v == value),
            LabelFilter::HasKey { key } => labels.contains_key(key),
        }
    }

    /// Rendered in the orchestrator's `label=` filter syntax.
    pub fn to_query_arg(&self) -> Option<String> {
        match self {
            LabelFilter::None => None,
            LabelFilter::Equals { key, value } => Some(format!("{}={}", key, value)),
            LabelFilter::HasKey { key } => Some(key.clone()),
        }
    }
}

/// Equality filter on a single stack; an empty ID yields no constraint.
pub fn stack_label_filter(stack_label: &str, stack_id: &str) -> LabelFilter {
    if stack_id.is_empty() {
        return LabelFilter::None;
    }
    LabelFilter::Equals { key: stack_label.to_string(), value: stack_id.to_string() }
}

/// Live orchestrator objects that can be correlated back to a stack.
pub trait Labeled {
    const KIND: ResourceKind;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn labels(&self) -> &BTreeMap<String, String>;
}

impl Labeled for Task {
    const KIND: ResourceKind = ResourceKind::Task;
    fn id(&self) -> &str { &self.id }
    // Tasks have no name of their own.
    fn name(&self) -> &str { &self.id }
    fn labels(&self) -> &BTreeMap<String, String> { &self.labels }
}

impl Labeled for Service {
    const KIND: ResourceKind = ResourceKind::Service;
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.spec.annotations.name }
    fn labels(&self) -> &BTreeMap<String, String> { &self.spec.annotations.labels }
}

impl Labeled for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.spec.annotations.name }
    fn labels(&self) -> &BTreeMap<String, String> { &self.spec.annotations.labels }
}

impl Labeled for Config {
    const KIND: ResourceKind = ResourceKind::Config;
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.spec.annotations.name }
    fn labels(&self) -> &BTreeMap<String, String> { &self.spec.annotations.labels }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_stack_id_yields_no_constraint() {
        let f = stack_label_filter(DEFAULT_STACK_LABEL, "");
        assert_eq!(f, LabelFilter::None);
        assert_eq!(f.to_query_arg(), None);
    }

    #[test]
    fn single_stack_id_renders_equality_arg() {
        let f = stack_label_filter(DEFAULT_STACK_LABEL, "stackid");
        assert_eq!(f.to_query_arg().as_deref(), Some("com.docker.stacks.stack_id=stackid"));
    }

    #[test]
    fn matches_follows_orchestrator_semantics() {
        let l = labels(&[("k", "a"), ("other", "x")]);
        assert!(LabelFilter::Equals { key: "k".into(), value: "a".into() }.matches(&l));
        assert!(!LabelFilter::Equals { key: "k".into(), value: "b".into() }.matches(&l));
        assert!(LabelFilter::HasKey { key: "k".into() }.matches(&l));
        assert!(!LabelFilter::HasKey { key: "missing".into() }.matches(&l));
        assert!(LabelFilter::None.matches(&BTreeMap::new()));
    }
}
