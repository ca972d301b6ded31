//! Variable substitution over a whole stack spec.
//!
//! Supported forms: `$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR-default}`,
//! `${VAR:?message}`, `${VAR?message}`, and `$$` for a literal dollar sign.
//! Unset plain variables become empty strings (with a warning); unset
//! required variables fail the conversion.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;
use stacks_core::StackSpec;
use tracing::warn;

static TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:(?P<escaped>\$)|(?P<named>[_a-zA-Z][_a-zA-Z0-9]*)|\{(?P<braced>[^}]*)\}|(?P<invalid>))")
        .expect("template pattern is valid")
});

/// Resolution context built from a spec's `KEY=VALUE` property values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn from_property_values(entries: &[String]) -> Result<Self> {
        let mut values = BTreeMap::new();
        for entry in entries {
            let (k, v) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid property value {:?}: expected KEY=VALUE", entry))?;
            let k = k.trim();
            if k.is_empty() {
                bail!("invalid property value {:?}: empty key", entry);
            }
            // Later entries win.
            values.insert(k.to_string(), v.to_string());
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> { self.values.get(name).map(|s| s.as_str()) }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

/// Substitute every variable reference in a single string.
pub fn substitute(template: &str, vars: &Variables) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0usize;
    for caps in TEMPLATE.captures_iter(template) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&template[last..m.start()]);
        last = m.end();
        if caps.name("escaped").is_some() {
            out.push('$');
        } else if let Some(name) = caps.name("named") {
            out.push_str(&plain(name.as_str(), vars.get(name.as_str())));
        } else if let Some(body) = caps.name("braced") {
            out.push_str(&expand_braced(body.as_str(), vars)?);
        } else {
            bail!("invalid template {:?}: stray '$' at offset {}", template, m.start());
        }
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn plain(name: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => {
            warn!(variable = %name, "variable is not set; substituting a blank string");
            String::new()
        }
    }
}

fn expand_braced(body: &str, vars: &Variables) -> Result<String> {
    let name_end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let (name, rest) = body.split_at(name_end);
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        bail!("invalid variable name in ${{{}}}", body);
    }
    let value = vars.get(name);
    let set_and_non_empty = value.filter(|v| !v.is_empty());

    if rest.is_empty() {
        return Ok(plain(name, value));
    }
    if let Some(default) = rest.strip_prefix(":-") {
        return Ok(set_and_non_empty.unwrap_or(default).to_string());
    }
    if let Some(msg) = rest.strip_prefix(":?") {
        return set_and_non_empty.map(str::to_string).ok_or_else(|| missing(name, msg));
    }
    if let Some(default) = rest.strip_prefix('-') {
        return Ok(value.unwrap_or(default).to_string());
    }
    if let Some(msg) = rest.strip_prefix('?') {
        return value.map(str::to_string).ok_or_else(|| missing(name, msg));
    }
    bail!("invalid variable expression ${{{}}}", body)
}

fn missing(name: &str, msg: &str) -> anyhow::Error {
    if msg.is_empty() {
        anyhow!("required variable {} is missing a value", name)
    } else {
        anyhow!("required variable {} is missing a value: {}", name, msg)
    }
}

/// Resolve all references in `spec` against its own property values. The
/// property values themselves are carried over untouched.
pub fn do_substitution(spec: &StackSpec) -> Result<(StackSpec, Variables)> {
    let vars = Variables::from_property_values(&spec.property_values)?;
    let mut tree = serde_json::to_value(spec).context("serializing stack spec")?;
    if let Some(obj) = tree.as_object_mut() {
        obj.remove("property_values");
    }
    substitute_tree(&mut tree, &vars, "")?;
    let mut out: StackSpec = serde_json::from_value(tree).context("rebuilding substituted stack spec")?;
    out.property_values = spec.property_values.clone();
    Ok((out, vars))
}

fn substitute_tree(v: &mut Json, vars: &Variables, path: &str) -> Result<()> {
    match v {
        Json::String(s) => {
            if s.contains('$') {
                *s = substitute(s, vars).with_context(|| format!("at {}", path))?;
            }
        }
        Json::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                substitute_tree(item, vars, &format!("{}[{}]", path, i))?;
            }
        }
        Json::Object(map) => {
            for (k, item) in map.iter_mut() {
                let p = if path.is_empty() { k.clone() } else { format!("{}.{}", path, k) };
                substitute_tree(item, vars, &p)?;
            }
        }
        _ => {}
    }
    Ok(())
}
