//! Network derivation: which networks a stack needs, and their create specs.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use stacks_core::spec::{NetworkConfig, ServiceConfig};
use stacks_core::swarm::{Ipam, IpamPoolConfig, NetworkCreate};

use crate::namespace::Namespace;

/// Implicit network joined by services that declare none.
pub const DEFAULT_NETWORK: &str = "default";

/// Networks actually referenced by services. A service with no network
/// reference counts as a reference to [`DEFAULT_NETWORK`].
pub fn services_declared_networks(services: &[ServiceConfig]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for svc in services {
        if svc.networks.is_empty() {
            out.insert(DEFAULT_NETWORK.to_string());
            continue;
        }
        out.extend(svc.networks.keys().cloned());
    }
    out
}

/// Build create specs for every referenced, non-external network, keyed by
/// orchestrator-side name. Also returns the external network names.
pub fn convert_networks(
    ns: &Namespace,
    networks: &BTreeMap<String, NetworkConfig>,
    referenced: &BTreeSet<String>,
    default_driver: &str,
) -> Result<(BTreeMap<String, NetworkCreate>, Vec<String>)> {
    let implicit = NetworkConfig::default();
    let mut creates = BTreeMap::new();
    let mut externals = Vec::new();
    for internal_name in referenced {
        let cfg = match networks.get(internal_name) {
            Some(c) => c,
            None if internal_name == DEFAULT_NETWORK => &implicit,
            None => bail!("undefined network {:?}", internal_name),
        };
        if cfg.external {
            externals.push(cfg.name.clone().unwrap_or_else(|| internal_name.clone()));
            continue;
        }
        let ipam = cfg.ipam.as_ref().and_then(|i| {
            if i.driver.is_none() && i.config.is_empty() {
                return None;
            }
            Some(Ipam {
                driver: i.driver.clone().unwrap_or_else(|| "default".to_string()),
                config: i.config.iter().map(|p| IpamPoolConfig { subnet: p.subnet.clone() }).collect(),
            })
        });
        let create = NetworkCreate {
            driver: cfg.driver.clone().filter(|d| !d.is_empty()).unwrap_or_else(|| default_driver.to_string()),
            options: cfg.driver_opts.clone(),
            labels: ns.labels(&cfg.labels),
            internal: cfg.internal,
            attachable: cfg.attachable,
            ipam,
        };
        let name = cfg.name.clone().unwrap_or_else(|| ns.scope(internal_name));
        creates.insert(name, create);
    }
    Ok((creates, externals))
}
