//! Group fetched resources by the stack ID found in their labels.

use metrics::counter;
use rustc_hash::FxHashMap;
use stacks_core::{Labeled, StackError, StackResult};
use tracing::error;

/// Every requested ID is a key of the result, possibly with an empty list.
/// Resources of other stacks are dropped. A resource without the label key
/// fails the whole batch.
pub fn join_by_stack<T: Labeled>(
    stack_label: &str,
    stack_ids: &[String],
    resources: Vec<T>,
) -> StackResult<FxHashMap<String, Vec<T>>> {
    let mut out: FxHashMap<String, Vec<T>> =
        stack_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
    for r in resources {
        let Some(stack_id) = r.labels().get(stack_label) else {
            let kind = T::KIND;
            counter!("stack_label_missing_total", 1u64);
            error!(kind = %kind, id = %r.id(), label = %stack_label, "join: resource without stack label");
            return Err(StackError::LabelMissing {
                kind,
                id: r.id().to_string(),
                label: stack_label.to_string(),
            });
        };
        if let Some(bucket) = out.get_mut(stack_id.as_str()) {
            bucket.push(r);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacks_core::swarm::Task;
    use std::collections::BTreeMap;

    fn task(id: &str, stack: Option<&str>) -> Task {
        let mut labels = BTreeMap::new();
        if let Some(s) = stack { labels.insert("sid".to_string(), s.to_string()); }
        Task { id: id.into(), labels, ..Default::default() }
    }

    fn ids(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn keys_match_requested_ids() {
        let got = join_by_stack("sid", &ids(&["a", "b"]), vec![task("t1", Some("a"))]).unwrap();
        let mut keys: Vec<_> = got.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ids(&["a", "b"]));
        assert_eq!(got["a"].len(), 1);
        assert!(got["b"].is_empty());
    }

    #[test]
    fn foreign_stacks_are_dropped() {
        let got = join_by_stack("sid", &ids(&["a"]), vec![task("t1", Some("a")), task("t2", Some("zz"))]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"].iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t1"]);
    }

    #[test]
    fn missing_label_fails_batch() {
        let e = join_by_stack("sid", &ids(&["a"]), vec![task("t1", Some("a")), task("t2", None)]).unwrap_err();
        match e {
            StackError::LabelMissing { id, label, .. } => {
                assert_eq!(id, "t2");
                assert_eq!(label, "sid");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
