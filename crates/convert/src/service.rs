//! Service conversion: declarative service configs to orchestrator-native
//! service specs.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Context, Result};
use smallvec::SmallVec;
use stacks_core::spec::{self, FileObjectConfig, NetworkConfig, ServiceConfig, ServiceFileRef, StackSpec};
use stacks_core::swarm::{
    Annotations, ConfigReference, ContainerSpec, EndpointSpec, FileTarget, Limit, NetworkAttachmentConfig,
    Placement, PortConfig, PortProtocol, PublishMode, ResolutionMode, ResourceRequirements, RestartCondition,
    RestartPolicy, SecretReference, ServiceMode, ServiceSpec, TaskSpec,
};
use stacks_swarmhub::SwarmResourceBackend;

use crate::namespace::Namespace;
use crate::network::DEFAULT_NETWORK;

const DEFAULT_FILE_MODE: u32 = 0o444;

/// Convert every service of `spec`. References to external secrets and
/// configs are resolved to orchestrator IDs through `backend`.
pub async fn convert_services(
    ns: &Namespace,
    spec: &StackSpec,
    backend: &dyn SwarmResourceBackend,
) -> Result<Vec<ServiceSpec>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(spec.services.len());
    for svc in &spec.services {
        if svc.name.is_empty() {
            bail!("service with empty name");
        }
        if !seen.insert(svc.name.as_str()) {
            bail!("duplicate service {:?}", svc.name);
        }
        let converted = convert_service(ns, svc, spec, backend)
            .await
            .with_context(|| format!("service {:?}", svc.name))?;
        out.push(converted);
    }
    Ok(out)
}

async fn convert_service(
    ns: &Namespace,
    svc: &ServiceConfig,
    spec: &StackSpec,
    backend: &dyn SwarmResourceBackend,
) -> Result<ServiceSpec> {
    if svc.image.is_empty() {
        bail!("image is required");
    }
    let secrets = convert_secret_refs(ns, &svc.secrets, &spec.secrets, backend).await?;
    let configs = convert_config_refs(ns, &svc.configs, &spec.configs, backend).await?;
    let networks = convert_service_networks(ns, &svc.networks, &spec.networks)?;

    let container_spec = ContainerSpec {
        image: svc.image.clone(),
        labels: ns.labels(&svc.labels),
        command: svc.entrypoint.clone(),
        args: svc.command.clone(),
        hostname: svc.hostname.clone(),
        env: convert_environment(&svc.environment),
        dir: svc.working_dir.clone(),
        user: svc.user.clone(),
        secrets,
        configs,
    };

    Ok(ServiceSpec {
        annotations: Annotations { name: ns.scope(&svc.name), labels: ns.labels(&svc.deploy.labels) },
        task_template: TaskSpec {
            container_spec,
            resources: convert_resources(&svc.deploy.resources)?,
            restart_policy: convert_restart_policy(svc.deploy.restart_policy.as_ref())?,
            placement: convert_placement(&svc.deploy.placement),
            networks,
        },
        mode: convert_deploy_mode(svc.deploy.mode.as_deref(), svc.deploy.replicas)?,
        endpoint_spec: Some(convert_endpoint_spec(svc.deploy.endpoint_mode.as_deref(), &svc.ports)?),
    })
}

/// Replicated services default to one replica; replicas with global mode
/// are rejected.
pub fn convert_deploy_mode(mode: Option<&str>, replicas: Option<u64>) -> Result<ServiceMode> {
    match mode.unwrap_or("replicated") {
        "global" => {
            if replicas.is_some() {
                bail!("replicas can only be used with replicated mode");
            }
            Ok(ServiceMode::Global)
        }
        "replicated" | "" => Ok(ServiceMode::Replicated { replicas: replicas.unwrap_or(1) }),
        other => bail!("unknown mode: {}", other),
    }
}

fn convert_environment(env: &BTreeMap<String, Option<String>>) -> Vec<String> {
    // BTreeMap iteration keeps the output sorted.
    env.iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}={}", k, v),
            None => k.clone(),
        })
        .collect()
}

fn convert_endpoint_spec(mode: Option<&str>, ports: &[spec::ServicePortConfig]) -> Result<EndpointSpec> {
    let mode = match mode.unwrap_or("vip") {
        "vip" | "" => ResolutionMode::Vip,
        "dnsrr" => ResolutionMode::Dnsrr,
        other => bail!("unknown endpoint mode: {}", other),
    };
    let mut out = Vec::with_capacity(ports.len());
    for p in ports {
        let protocol = match p.protocol.as_deref().unwrap_or("tcp") {
            "tcp" | "" => PortProtocol::Tcp,
            "udp" => PortProtocol::Udp,
            "sctp" => PortProtocol::Sctp,
            other => bail!("unknown port protocol: {}", other),
        };
        let publish_mode = match p.mode.as_deref().unwrap_or("ingress") {
            "ingress" | "" => PublishMode::Ingress,
            "host" => PublishMode::Host,
            other => bail!("unknown port publish mode: {}", other),
        };
        out.push(PortConfig { protocol, target_port: p.target, published_port: p.published.unwrap_or(0), publish_mode });
    }
    out.sort();
    if mode == ResolutionMode::Dnsrr && out.iter().any(|p| p.publish_mode == PublishMode::Ingress) {
        bail!("port published with ingress mode can't be used with dnsrr mode");
    }
    Ok(EndpointSpec { mode, ports: out })
}

fn convert_restart_policy(policy: Option<&spec::RestartPolicy>) -> Result<Option<RestartPolicy>> {
    let Some(p) = policy else { return Ok(None) };
    let condition = match p.condition.as_deref().unwrap_or("any") {
        "none" | "no" => RestartCondition::None,
        "on-failure" => RestartCondition::OnFailure,
        "any" | "always" | "" => RestartCondition::Any,
        other => bail!("unknown restart policy condition: {}", other),
    };
    Ok(Some(RestartPolicy { condition, max_attempts: p.max_attempts }))
}

fn convert_resources(res: &spec::Resources) -> Result<Option<ResourceRequirements>> {
    if res.limits.is_none() && res.reservations.is_none() {
        return Ok(None);
    }
    let limits = res.limits.as_ref().map(convert_limit).transpose().context("limits")?;
    let reservations = res.reservations.as_ref().map(convert_limit).transpose().context("reservations")?;
    Ok(Some(ResourceRequirements { limits, reservations }))
}

fn convert_limit(l: &spec::ResourceLimits) -> Result<Limit> {
    let nano_cpus = match l.cpus.as_deref() {
        None | Some("") => 0,
        Some(cpus) => parse_nano_cpus(cpus)?,
    };
    let memory_bytes = l.memory_bytes.unwrap_or(0);
    if memory_bytes < 0 {
        bail!("memory must not be negative: {}", memory_bytes);
    }
    Ok(Limit { nano_cpus, memory_bytes })
}

/// "0.5" -> 500_000_000
pub fn parse_nano_cpus(cpus: &str) -> Result<i64> {
    let v: f64 = cpus.trim().parse().map_err(|_| anyhow!("invalid cpus value {:?}", cpus))?;
    if !v.is_finite() || v < 0.0 {
        bail!("invalid cpus value {:?}", cpus);
    }
    Ok((v * 1e9).round() as i64)
}

fn convert_placement(p: &spec::Placement) -> Option<Placement> {
    if p.constraints.is_empty() {
        return None;
    }
    Some(Placement { constraints: p.constraints.clone() })
}

fn convert_service_networks(
    ns: &Namespace,
    service_networks: &BTreeMap<String, Option<spec::ServiceNetworkConfig>>,
    stack_networks: &BTreeMap<String, NetworkConfig>,
) -> Result<Vec<NetworkAttachmentConfig>> {
    let implicit: BTreeMap<String, Option<spec::ServiceNetworkConfig>> =
        [(DEFAULT_NETWORK.to_string(), None)].into_iter().collect();
    let wanted = if service_networks.is_empty() { &implicit } else { service_networks };

    let mut out = Vec::with_capacity(wanted.len());
    for (name, opts) in wanted {
        let declared = stack_networks.get(name);
        if declared.is_none() && name != DEFAULT_NETWORK {
            bail!("undefined network {:?}", name);
        }
        let target = match declared {
            Some(n) if n.external => n.name.clone().unwrap_or_else(|| name.clone()),
            Some(n) => n.name.clone().unwrap_or_else(|| ns.scope(name)),
            None => ns.scope(name),
        };
        let aliases: SmallVec<[String; 2]> = opts.as_ref().map(|o| o.aliases.iter().cloned().collect()).unwrap_or_default();
        out.push(NetworkAttachmentConfig { target, aliases });
    }
    out.sort_by(|a, b| a.target.cmp(&b.target));
    Ok(out)
}

/// Orchestrator-side name of a referenced object, and whether it must
/// already exist there.
fn ref_target(
    ns: &Namespace,
    source: &str,
    declared: &BTreeMap<String, FileObjectConfig>,
    what: &str,
) -> Result<(String, bool)> {
    let obj = declared.get(source).ok_or_else(|| anyhow!("undefined {} {:?}", what, source))?;
    if obj.external {
        return Ok((obj.name.clone().unwrap_or_else(|| source.to_string()), true));
    }
    Ok((obj.name.clone().unwrap_or_else(|| ns.scope(source)), false))
}

fn file_target(r: &ServiceFileRef, default_name: String) -> FileTarget {
    FileTarget {
        name: r.target.clone().filter(|t| !t.is_empty()).unwrap_or(default_name),
        uid: r.uid.clone().unwrap_or_else(|| "0".to_string()),
        gid: r.gid.clone().unwrap_or_else(|| "0".to_string()),
        mode: r.mode.unwrap_or(DEFAULT_FILE_MODE),
    }
}

async fn convert_secret_refs(
    ns: &Namespace,
    refs: &[ServiceFileRef],
    declared: &BTreeMap<String, FileObjectConfig>,
    backend: &dyn SwarmResourceBackend,
) -> Result<Vec<SecretReference>> {
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        let (secret_name, external) = ref_target(ns, &r.source, declared, "secret")?;
        // Stack-owned secrets do not exist yet; the reconciler binds their IDs.
        let secret_id = if external {
            backend
                .lookup_secret(&secret_name)
                .await
                .with_context(|| format!("looking up secret {:?}", secret_name))?
                .map(|s| s.id)
                .ok_or_else(|| anyhow!("secret not found: {}", secret_name))?
        } else {
            String::new()
        };
        out.push(SecretReference { file: file_target(r, r.source.clone()), secret_id, secret_name });
    }
    out.sort_by(|a, b| a.secret_name.cmp(&b.secret_name));
    Ok(out)
}

async fn convert_config_refs(
    ns: &Namespace,
    refs: &[ServiceFileRef],
    declared: &BTreeMap<String, FileObjectConfig>,
    backend: &dyn SwarmResourceBackend,
) -> Result<Vec<ConfigReference>> {
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        let (config_name, external) = ref_target(ns, &r.source, declared, "config")?;
        let config_id = if external {
            backend
                .lookup_config(&config_name)
                .await
                .with_context(|| format!("looking up config {:?}", config_name))?
                .map(|c| c.id)
                .ok_or_else(|| anyhow!("config not found: {}", config_name))?
        } else {
            String::new()
        };
        out.push(ConfigReference { file: file_target(r, format!("/{}", r.source)), config_id, config_name });
    }
    out.sort_by(|a, b| a.config_name.cmp(&b.config_name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacks_core::spec::{DeployConfig, ServicePortConfig, StackMetadata};
    use stacks_core::swarm::{Annotations as A, Secret, SecretSpec};
    use stacks_swarmhub::{ClusterSnapshot, InMemorySwarm};

    fn ns() -> Namespace { Namespace::new("demo", "stack.id", "id1") }

    fn spec_with(services: Vec<ServiceConfig>) -> StackSpec {
        StackSpec { metadata: StackMetadata { name: "demo".into(), labels: BTreeMap::new() }, services, ..Default::default() }
    }

    fn web() -> ServiceConfig {
        ServiceConfig { name: "web".into(), image: "nginx".into(), ..Default::default() }
    }

    #[test]
    fn deploy_modes() {
        assert_eq!(convert_deploy_mode(None, None).unwrap(), ServiceMode::Replicated { replicas: 1 });
        assert_eq!(convert_deploy_mode(Some("replicated"), Some(3)).unwrap(), ServiceMode::Replicated { replicas: 3 });
        assert_eq!(convert_deploy_mode(Some("global"), None).unwrap(), ServiceMode::Global);
        assert!(convert_deploy_mode(Some("global"), Some(2)).is_err());
        assert!(convert_deploy_mode(Some("sometimes"), None).is_err());
    }

    #[test]
    fn nano_cpus() {
        assert_eq!(parse_nano_cpus("0.5").unwrap(), 500_000_000);
        assert_eq!(parse_nano_cpus("2").unwrap(), 2_000_000_000);
        assert!(parse_nano_cpus("lots").is_err());
        assert!(parse_nano_cpus("-1").is_err());
    }

    #[tokio::test]
    async fn converts_container_and_endpoint() {
        let mut svc = web();
        svc.entrypoint = vec!["/bin/sh".into()];
        svc.command = vec!["-c".into(), "run".into()];
        svc.environment.insert("B".into(), Some("2".into()));
        svc.environment.insert("A".into(), None);
        svc.ports = vec![
            ServicePortConfig { target: 443, published: Some(8443), ..Default::default() },
            ServicePortConfig { target: 80, published: Some(8080), ..Default::default() },
        ];
        svc.deploy = DeployConfig { replicas: Some(2), ..Default::default() };
        let out = convert_services(&ns(), &spec_with(vec![svc]), &InMemorySwarm::default()).await.unwrap();
        let s = &out[0];
        assert_eq!(s.annotations.name, "demo_web");
        assert_eq!(s.task_template.container_spec.command, vec!["/bin/sh"]);
        assert_eq!(s.task_template.container_spec.args, vec!["-c", "run"]);
        assert_eq!(s.task_template.container_spec.env, vec!["A", "B=2"]);
        let ports = &s.endpoint_spec.as_ref().unwrap().ports;
        assert_eq!(ports.iter().map(|p| p.target_port).collect::<Vec<_>>(), vec![80, 443]);
        assert_eq!(s.task_template.networks.len(), 1);
        assert_eq!(s.task_template.networks[0].target, "demo_default");
        assert_eq!(s.mode, ServiceMode::Replicated { replicas: 2 });
    }

    #[tokio::test]
    async fn duplicate_and_unknown_references_fail() {
        let backend = InMemorySwarm::default();
        let e = convert_services(&ns(), &spec_with(vec![web(), web()]), &backend).await.unwrap_err();
        assert!(e.to_string().contains("duplicate service"), "e={}", e);

        let mut svc = web();
        svc.networks.insert("ghost".into(), None);
        let e = format!("{:#}", convert_services(&ns(), &spec_with(vec![svc]), &backend).await.unwrap_err());
        assert!(e.contains("service \"web\": undefined network \"ghost\""), "e={}", e);

        let mut svc = web();
        svc.secrets.push(ServiceFileRef { source: "nope".into(), ..Default::default() });
        let e = format!("{:#}", convert_services(&ns(), &spec_with(vec![svc]), &backend).await.unwrap_err());
        assert!(e.contains("undefined secret"), "e={}", e);
    }

    #[tokio::test]
    async fn secret_refs_resolve_external_ids() {
        let backend = InMemorySwarm::new(ClusterSnapshot {
            secrets: vec![Secret { id: "sec-9".into(), spec: SecretSpec { annotations: A { name: "corp_tls".into(), labels: BTreeMap::new() }, data: vec![] }, ..Default::default() }],
            ..Default::default()
        });
        let mut spec = spec_with(vec![]);
        spec.secrets.insert("tls".into(), FileObjectConfig { external: true, name: Some("corp_tls".into()), ..Default::default() });
        spec.secrets.insert("db".into(), FileObjectConfig { environment: Some("X".into()), ..Default::default() });
        spec.secrets.insert("gone".into(), FileObjectConfig { external: true, ..Default::default() });
        let mut svc = web();
        svc.secrets = vec![
            ServiceFileRef { source: "tls".into(), ..Default::default() },
            ServiceFileRef { source: "db".into(), target: Some("db_password".into()), ..Default::default() },
        ];
        spec.services = vec![svc.clone()];
        let out = convert_services(&ns(), &spec, &backend).await.unwrap();
        let refs = &out[0].task_template.container_spec.secrets;
        assert_eq!(refs[0].secret_name, "corp_tls");
        assert_eq!(refs[0].secret_id, "sec-9");
        assert_eq!(refs[1].secret_name, "demo_db");
        assert_eq!(refs[1].secret_id, "");
        assert_eq!(refs[1].file.name, "db_password");
        assert_eq!(refs[1].file.mode, 0o444);

        svc.secrets = vec![ServiceFileRef { source: "gone".into(), ..Default::default() }];
        spec.services = vec![svc];
        let e = format!("{:#}", convert_services(&ns(), &spec, &backend).await.unwrap_err());
        assert!(e.contains("secret not found: gone"), "e={}", e);
    }
}
