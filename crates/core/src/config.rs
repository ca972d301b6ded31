//! Process-wide settings, fixed at startup and passed to each component.

use serde::{Deserialize, Serialize};

use crate::labels::DEFAULT_STACK_LABEL;

pub const DEFAULT_NETWORK_DRIVER: &str = "overlay";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StacksConfig {
    /// Label key whose value is the owning stack ID.
    pub stack_label: String,
    /// Driver for stack networks that do not name one.
    pub network_driver: String,
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self {
            stack_label: DEFAULT_STACK_LABEL.to_string(),
            network_driver: DEFAULT_NETWORK_DRIVER.to_string(),
        }
    }
}

impl StacksConfig {
    /// Read overrides from `STACKS_LABEL_KEY` and `STACKS_NETWORK_DRIVER`.
    pub fn from_env() -> Self {
        let stack_label = std::env::var("STACKS_LABEL_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STACK_LABEL.to_string());
        let network_driver = std::env::var("STACKS_NETWORK_DRIVER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NETWORK_DRIVER.to_string());
        Self { stack_label, network_driver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_well_known_label() {
        let c = StacksConfig::default();
        assert_eq!(c.stack_label, "com.docker.stacks.stack_id");
        assert_eq!(c.network_driver, "overlay");
    }
}
