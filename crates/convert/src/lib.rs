//! Stacks convert: turns a declarative `StackSpec` into the orchestrator-native
//! `SwarmStackSpec`.
//!
//! The pipeline is strictly sequential: substitution, namespace derivation,
//! services, secrets, configs, networks, assembly. Any stage error aborts the
//! conversion and is reported with the stage name.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use stacks_core::swarm::Annotations;
use stacks_core::{ConversionStage, Orchestrator, StackError, StackResult, StackSpec, StacksConfig, SwarmStackSpec};
use stacks_swarmhub::SwarmResourceBackend;
use tracing::{info, warn};

pub mod namespace;
pub mod network;
pub mod objects;
pub mod service;
pub mod substitution;

pub use namespace::Namespace;
pub use substitution::{do_substitution, substitute, Variables};

/// This engine only accepts swarm stacks.
pub fn ensure_supported(orchestrator: Orchestrator) -> StackResult<()> {
    match orchestrator {
        Orchestrator::Swarm => Ok(()),
        other => Err(StackError::UnsupportedOrchestrator { orchestrator: other.to_string() }),
    }
}

pub struct StackConverter {
    config: StacksConfig,
    backend: Arc<dyn SwarmResourceBackend>,
}

impl StackConverter {
    pub fn new(config: StacksConfig, backend: Arc<dyn SwarmResourceBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &StacksConfig { &self.config }

    /// Convert `spec` for the stack identified by `stack_id`. Converting the
    /// same spec under the same ID always yields the same output.
    pub async fn convert(&self, stack_id: &str, spec: &StackSpec) -> StackResult<SwarmStackSpec> {
        let t0 = Instant::now();
        counter!("stack_convert_total", 1u64);
        let res = self.run_pipeline(stack_id, spec).await;
        match &res {
            Ok(out) => {
                histogram!("stack_convert_ms", t0.elapsed().as_secs_f64() * 1000.0);
                info!(
                    stack_id = %stack_id,
                    stack = %out.annotations.name,
                    services = out.services.len(),
                    secrets = out.secrets.len(),
                    configs = out.configs.len(),
                    networks = out.networks.len(),
                    took_ms = %t0.elapsed().as_millis(),
                    "convert: ok"
                );
            }
            Err(e) => {
                counter!("stack_convert_err", 1u64);
                warn!(stack_id = %stack_id, error = %e, "convert: failed");
            }
        }
        res
    }

    async fn run_pipeline(&self, stack_id: &str, spec: &StackSpec) -> StackResult<SwarmStackSpec> {
        let raw_name = spec.metadata.name.as_str();
        let (spec, vars) = do_substitution(spec).map_err(|e| StackError::Substitution {
            stack: raw_name.to_string(),
            reason: format!("{:#}", e),
        })?;
        let name = spec.metadata.name.as_str();
        if name.trim().is_empty() {
            return Err(StackError::Substitution { stack: raw_name.to_string(), reason: "stack name is empty".into() });
        }

        let ns = Namespace::new(name, &self.config.stack_label, stack_id);

        let services = service::convert_services(&ns, &spec, self.backend.as_ref())
            .await
            .map_err(|e| StackError::conversion(name, ConversionStage::Services, e))?;
        let secrets = objects::convert_secrets(&ns, &spec.secrets, &vars)
            .map_err(|e| StackError::conversion(name, ConversionStage::Secrets, e))?;
        let configs = objects::convert_configs(&ns, &spec.configs, &vars)
            .map_err(|e| StackError::conversion(name, ConversionStage::Configs, e))?;

        let referenced = network::services_declared_networks(&spec.services);
        let (networks, externals) =
            network::convert_networks(&ns, &spec.networks, &referenced, &self.config.network_driver)
                .map_err(|e| StackError::conversion(name, ConversionStage::Networks, e))?;
        if !externals.is_empty() {
            // TODO: check external networks exist and are swarm-scoped once the backend can list networks.
            info!(stack = %name, externals = ?externals, "convert: stack uses external networks");
        }

        Ok(SwarmStackSpec {
            annotations: Annotations { name: name.to_string(), labels: spec.metadata.labels.clone() },
            services,
            secrets,
            configs,
            networks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_swarm_is_supported() {
        assert!(ensure_supported(Orchestrator::Swarm).is_ok());
        let e = ensure_supported(Orchestrator::Kubernetes).unwrap_err();
        assert!(matches!(e, StackError::UnsupportedOrchestrator { .. }));
        assert!(e.to_string().contains("kubernetes"));
    }
}
