//! Config facade (C7): a read-only view of toolchain/link/make options.
//!
//! A config is a TOML file `<cfg_root>/<name>.cfg`. It may declare
//! `imports = ["common", "gcc_base"]` at the top level, naming sibling
//! `.cfg` files (no extension) to merge in first, lowest priority first, with
//! the file itself layered on top — this is the "base config" relationship
//! expressed as data instead of inheritance. String fields may reference
//! `${env:VAR}` to pull in a process environment variable, and a `cc.os.<os>`
//! / `link.os.<os>` table overlays onto `cc`/`link` only on a matching host
//! (`linux`, `macos`, `windows`), reproducing the original's `os`/`platform`
//! introspection without an embedded interpreter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{IbError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CcConfig {
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub hdrs_flags: Vec<String>,
    #[serde(default)]
    pub incl_dirs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub static_libs: Vec<String>,
    #[serde(default)]
    pub lib_dirs: Vec<String>,
    #[serde(default = "default_out_flag_prefix")]
    pub out_flag_prefix: String,
    #[serde(default = "default_lib_flag_prefix")]
    pub lib_flag_prefix: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            tool: String::new(),
            flags: Vec::new(),
            libs: Vec::new(),
            static_libs: Vec::new(),
            lib_dirs: Vec::new(),
            out_flag_prefix: default_out_flag_prefix(),
            lib_flag_prefix: default_lib_flag_prefix(),
        }
    }
}

fn default_out_flag_prefix() -> String {
    "-o ".to_string()
}
fn default_lib_flag_prefix() -> String {
    "-l".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MakeConfig {
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub force_flag: String,
    #[serde(default)]
    pub all_pseudo_target: String,
}

/// Raw deserialization target for a single merged `.cfg` document.
#[derive(Debug, Deserialize, Clone, Default)]
struct RawCfg {
    #[serde(default)]
    cc: CcConfig,
    #[serde(default)]
    link: LinkConfig,
    #[serde(default)]
    make: MakeConfig,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub name: String,
    pub base: Option<String>,
    pub(crate) imports: HashSet<String>,
    pub cc: CcConfig,
    pub link: LinkConfig,
    pub make: MakeConfig,
}

impl Cfg {
    /// The transitive set of config names folded into this one (not
    /// including its own name).
    pub fn imports(&self) -> &HashSet<String> {
        &self.imports
    }

    /// True if `name` is this config's own name or was folded in via import.
    pub fn uses(&self, name: &str) -> bool {
        self.name == name || self.imports.contains(name)
    }

    pub fn load(cfg_root: &Path, name: &str) -> Result<Cfg> {
        let mut imports = HashSet::new();
        let mut visiting = HashSet::new();
        let own_imports = read_own_imports(cfg_root, name)?;
        let merged = load_merged(cfg_root, name, &mut imports, &mut visiting)?;
        let raw = RawCfg::deserialize(merged).map_err(|e| IbError::Config(e.to_string()))?;
        Ok(Cfg {
            name: name.to_string(),
            base: own_imports.into_iter().next(),
            imports,
            cc: raw.cc,
            link: raw.link,
            make: raw.make,
        })
    }
}

/// The listed order of a single config file's own `imports` array, without
/// following them. Used only to pick a deterministic "base" (the first
/// listed import) for diagnostics; the actual merge walks the full set.
fn read_own_imports(cfg_root: &Path, name: &str) -> Result<Vec<String>> {
    let path = cfg_root.join(format!("{}.cfg", name));
    let content = std::fs::read_to_string(&path)
        .map_err(|e| IbError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let value: toml::Value =
        toml::from_str(&content).map_err(|e| IbError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(match value.get("imports") {
        Some(toml::Value::Array(arr)) => arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    })
}

fn load_merged(
    cfg_root: &Path,
    name: &str,
    imports: &mut HashSet<String>,
    visiting: &mut HashSet<String>,
) -> Result<toml::Value> {
    if !visiting.insert(name.to_string()) {
        return Err(IbError::Config(format!("import cycle involving {:?}", name)));
    }

    let path = cfg_root.join(format!("{}.cfg", name));
    let content = std::fs::read_to_string(&path)
        .map_err(|e| IbError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let mut value: toml::Value =
        toml::from_str(&content).map_err(|e| IbError::Config(format!("{}: {}", path.display(), e)))?;

    let import_names: Vec<String> = match value.get("imports") {
        Some(toml::Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => return Err(IbError::Config(format!("{}: imports must be an array", path.display()))),
        None => Vec::new(),
    };
    if let toml::Value::Table(table) = &mut value {
        table.remove("imports");
    }

    let mut merged: Option<toml::Value> = None;
    for import_name in &import_names {
        imports.insert(import_name.clone());
        let imported = load_merged(cfg_root, import_name, imports, visiting)?;
        merged = Some(match merged {
            Some(base) => merge_toml(base, imported),
            None => imported,
        });
    }
    let merged = match merged {
        Some(base) => merge_toml(base, value),
        None => value,
    };

    visiting.remove(name);
    Ok(apply_os_overlay(interpolate_env(merged)))
}

/// Recursively merge two TOML values. Overlay tables win key-by-key;
/// scalars and arrays are replaced wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    use toml::Value;
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = match base_map.remove(&k) {
                    Some(base_v) => merge_toml(base_v, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn host_os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "windows" => "windows",
        _ => "linux",
    }
}

/// Merge `cc.os.<host>` onto `cc` (and likewise for `link`), then drop the
/// `os` subtables so they never leak into the typed config structs.
fn apply_os_overlay(mut value: toml::Value) -> toml::Value {
    let host = host_os_name();
    if let toml::Value::Table(ref mut root) = value {
        for section in ["cc", "link"] {
            let overlay = root
                .get_mut(section)
                .and_then(|v| v.as_table_mut())
                .and_then(|t| t.remove("os"))
                .and_then(|os| os.as_table().and_then(|t| t.get(host)).cloned());
            if let Some(overlay) = overlay {
                if let Some(base) = root.remove(section) {
                    root.insert(section.to_string(), merge_toml(base, overlay));
                } else {
                    root.insert(section.to_string(), overlay);
                }
            }
        }
    }
    value
}

/// Replace `${env:VAR}` in every string leaf with the process environment
/// variable `VAR` (empty string if unset).
fn interpolate_env(value: toml::Value) -> toml::Value {
    match value {
        toml::Value::String(s) => toml::Value::String(substitute(&s)),
        toml::Value::Array(arr) => toml::Value::Array(arr.into_iter().map(interpolate_env).collect()),
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| (k, interpolate_env(v)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${env:") {
        out.push_str(&rest[..start]);
        let after = &rest[start + "${env:".len()..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                out.push_str(&std::env::var(var).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Search upward from `start` for a directory containing a marker file
/// (`__ib__`), used to locate the source root when `--src_root` is unset.
pub fn find_src_root(start: &Path, marker: &str) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(marker).exists() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(IbError::Config(format!(
                "no {:?} marker found above {}",
                marker,
                start.display()
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_env_var() {
        std::env::set_var("IB_TEST_VAR", "value");
        assert_eq!(substitute("prefix-${env:IB_TEST_VAR}-suffix"), "prefix-value-suffix");
    }

    #[test]
    fn substitute_empty_string_for_unset_var() {
        std::env::remove_var("IB_TEST_VAR_UNSET");
        assert_eq!(substitute("${env:IB_TEST_VAR_UNSET}"), "");
    }

    #[test]
    fn host_os_name_is_one_of_the_three() {
        assert!(["linux", "macos", "windows"].contains(&host_os_name()));
    }
}
