//! Label predicates selecting the resources of zero, one or many stacks.

use stacks_core::{stack_label_filter, LabelFilter};

/// The orchestrator filters on a single label, so several stacks are
/// fetched by key presence and separated afterwards by [`crate::join`].
pub fn filter_for(stack_label: &str, stack_ids: &[String]) -> LabelFilter {
    match stack_ids {
        [] => LabelFilter::None,
        [only] => stack_label_filter(stack_label, only),
        _ => LabelFilter::HasKey { key: stack_label.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn zero_one_many() {
        assert_eq!(filter_for("k", &[]), LabelFilter::None);
        assert_eq!(
            filter_for("k", &ids(&["a"])),
            LabelFilter::Equals { key: "k".into(), value: "a".into() }
        );
        assert_eq!(filter_for("k", &ids(&["a", "b", "c"])), LabelFilter::HasKey { key: "k".into() });
    }
}
