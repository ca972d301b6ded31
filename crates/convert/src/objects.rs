//! Secret and config conversion. Both kinds share one shape: a named blob
//! sourced from a file or from a property value.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use stacks_core::spec::FileObjectConfig;
use stacks_core::swarm::{Annotations, ConfigSpec, SecretSpec};

use crate::namespace::Namespace;
use crate::substitution::Variables;

pub fn convert_secrets(
    ns: &Namespace,
    secrets: &BTreeMap<String, FileObjectConfig>,
    vars: &Variables,
) -> Result<Vec<SecretSpec>> {
    let objs = convert_file_objects(ns, secrets, vars, "secret")?;
    Ok(objs.into_iter().map(|(annotations, data)| SecretSpec { annotations, data }).collect())
}

pub fn convert_configs(
    ns: &Namespace,
    configs: &BTreeMap<String, FileObjectConfig>,
    vars: &Variables,
) -> Result<Vec<ConfigSpec>> {
    let objs = convert_file_objects(ns, configs, vars, "config")?;
    Ok(objs.into_iter().map(|(annotations, data)| ConfigSpec { annotations, data }).collect())
}

/// External objects already exist on the orchestrator and produce nothing.
fn convert_file_objects(
    ns: &Namespace,
    objects: &BTreeMap<String, FileObjectConfig>,
    vars: &Variables,
    what: &str,
) -> Result<Vec<(Annotations, Vec<u8>)>> {
    let mut out = Vec::with_capacity(objects.len());
    for (key, obj) in objects {
        if obj.external {
            continue;
        }
        let data = read_data(obj, vars).with_context(|| format!("{} {:?}", what, key))?;
        let name = obj.name.clone().unwrap_or_else(|| ns.scope(key));
        out.push((Annotations { name, labels: ns.labels(&obj.labels) }, data));
    }
    Ok(out)
}

fn read_data(obj: &FileObjectConfig, vars: &Variables) -> Result<Vec<u8>> {
    match (&obj.file, &obj.environment) {
        (Some(_), Some(_)) => bail!("file and environment are mutually exclusive"),
        (Some(path), None) => std::fs::read(path).with_context(|| format!("reading {}", path)),
        (None, Some(var)) => vars
            .get(var)
            .map(|v| v.as_bytes().to_vec())
            .ok_or_else(|| anyhow!("property {} is not set", var)),
        (None, None) => bail!("neither file nor environment is set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace { Namespace::new("demo", "stack.id", "id1") }

    fn env_obj(var: &str) -> FileObjectConfig {
        FileObjectConfig { environment: Some(var.into()), ..Default::default() }
    }

    #[test]
    fn secret_from_property_is_scoped_and_labeled() {
        let mut vars = Variables::default();
        vars.insert("DB_PASS", "hunter2");
        let mut secrets = BTreeMap::new();
        secrets.insert("db_pass".to_string(), env_obj("DB_PASS"));
        let got = convert_secrets(&ns(), &secrets, &vars).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].annotations.name, "demo_db_pass");
        assert_eq!(got[0].data, b"hunter2".to_vec());
        assert_eq!(got[0].annotations.labels.get("stack.id").map(String::as_str), Some("id1"));
    }

    #[test]
    fn config_from_file() {
        let path = std::env::temp_dir().join(format!(
            "stacks-config-{}.conf",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        std::fs::write(&path, b"listen 80;").unwrap();
        let mut configs = BTreeMap::new();
        configs.insert("nginx".to_string(), FileObjectConfig {
            file: Some(path.to_string_lossy().to_string()),
            name: Some("nginx-v2".into()),
            ..Default::default()
        });
        let got = convert_configs(&ns(), &configs, &Variables::default()).unwrap();
        assert_eq!(got[0].annotations.name, "nginx-v2");
        assert_eq!(got[0].data, b"listen 80;".to_vec());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn external_objects_are_skipped() {
        let mut secrets = BTreeMap::new();
        secrets.insert("shared".to_string(), FileObjectConfig { external: true, ..Default::default() });
        assert!(convert_secrets(&ns(), &secrets, &Variables::default()).unwrap().is_empty());
    }

    #[test]
    fn missing_sources_are_errors() {
        let mut secrets = BTreeMap::new();
        secrets.insert("a".to_string(), FileObjectConfig::default());
        let e = format!("{:#}", convert_secrets(&ns(), &secrets, &Variables::default()).unwrap_err());
        assert!(e.contains("secret \"a\""), "e={}", e);

        let mut secrets = BTreeMap::new();
        secrets.insert("b".to_string(), env_obj("UNSET"));
        let e = format!("{:#}", convert_secrets(&ns(), &secrets, &Variables::default()).unwrap_err());
        assert!(e.contains("property UNSET is not set"), "e={}", e);

        let mut configs = BTreeMap::new();
        configs.insert("c".to_string(), FileObjectConfig { file: Some("/definitely/not/here".into()), ..Default::default() });
        assert!(convert_configs(&ns(), &configs, &Variables::default()).is_err());
    }
}
