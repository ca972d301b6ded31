//! Per-stack naming and labeling context.

use std::collections::BTreeMap;

use stacks_core::NAMESPACE_LABEL;

/// Qualifies short resource names with the stack name and stamps the stack
/// labels on everything produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    name: String,
    stack_label: String,
    stack_id: String,
}

impl Namespace {
    pub fn new(name: &str, stack_label: &str, stack_id: &str) -> Self {
        Self { name: name.to_string(), stack_label: stack_label.to_string(), stack_id: stack_id.to_string() }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn stack_id(&self) -> &str { &self.stack_id }

    /// `web` -> `<stack>_web`
    pub fn scope(&self, short: &str) -> String {
        format!("{}_{}", self.name, short)
    }

    /// User labels plus the namespace and stack-ID labels. The stack labels
    /// win over user-supplied values for the same keys.
    pub fn labels(&self, user: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut out = user.clone();
        out.insert(NAMESPACE_LABEL.to_string(), self.name.clone());
        out.insert(self.stack_label.clone(), self.stack_id.clone());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_and_labels() {
        let ns = Namespace::new("mystack", "stack.id", "abc");
        assert_eq!(ns.scope("web"), "mystack_web");

        let mut user = BTreeMap::new();
        user.insert("team".to_string(), "blue".to_string());
        user.insert("stack.id".to_string(), "spoofed".to_string());
        let l = ns.labels(&user);
        assert_eq!(l.get("team").map(String::as_str), Some("blue"));
        assert_eq!(l.get("stack.id").map(String::as_str), Some("abc"));
        assert_eq!(l.get(NAMESPACE_LABEL).map(String::as_str), Some("mystack"));
    }
}
