use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::defaults::default_policy;
use crate::errors::PolicyError;
use crate::model::{PolicySource, ReplayPolicy};
use crate::validate::validate_policy;

const ENV_PREFIX: &str = "SOUL_REPLAY__";
const ENV_JSON: &str = "SOUL_REPLAY_OVERRIDE_JSON";
const ENV_CLI_OVERRIDES: &str = "SOUL_REPLAY_CLI_OVERRIDES";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
            include_cli_env: true,
        }
    }
}

pub fn load_policy(path: Option<&Path>) -> Result<ReplayPolicy, PolicyError> {
    let mut options = LoadOptions::default();
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    options.include_env = true;
    options.include_cli_env = true;
    load_policy_with_options(&options)
}

/// Defaults, then each file, then environment, then CLI overrides; validated last.
pub fn load_policy_with_options(options: &LoadOptions) -> Result<ReplayPolicy, PolicyError> {
    let defaults = default_policy();
    let mut tree = serde_json::to_value(&defaults).map_err(invalid)?;
    let mut overlays = flatten_value(tree.clone(), None, PolicySource::Builtin);

    for path in &options.paths {
        if path.exists() {
            debug!(path = %path.display(), "applying policy file");
            overlays.extend(overlays_from_file(path)?);
        }
    }

    if options.include_env {
        overlays.extend(overlays_from_env()?);
    }

    if options.include_cli_env {
        overlays.extend(overlays_from_cli_env()?);
    }

    let mut provenance = Vec::with_capacity(overlays.len());
    for overlay in overlays {
        set_path(&mut tree, &overlay.path, overlay.value)?;
        provenance.push((overlay.path, overlay.source));
    }

    let mut policy: ReplayPolicy = serde_json::from_value(tree).map_err(invalid)?;
    for (path, source) in provenance {
        policy.set_provenance(&path, source);
    }
    validate_policy(&policy)?;
    Ok(policy)
}

struct PolicyOverlay {
    path: String,
    value: Value,
    source: PolicySource,
}

fn invalid(err: impl std::fmt::Display) -> PolicyError {
    PolicyError::Invalid(format!("{}", err))
}

fn overlays_from_file(path: &Path) -> Result<Vec<PolicyOverlay>, PolicyError> {
    let content = fs::read_to_string(path).map_err(|err| PolicyError::Io(format!("{}", err)))?;
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(invalid)?;
    let json_value = serde_json::to_value(yaml_value).map_err(invalid)?;
    Ok(flatten_value(json_value, None, PolicySource::File))
}

fn overlays_from_env() -> Result<Vec<PolicyOverlay>, PolicyError> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push(PolicyOverlay {
                path,
                value: parse_env_value(&raw),
                source: PolicySource::Env,
            });
        }
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json).map_err(invalid)?;
            overlays.extend(flatten_value(json_value, None, PolicySource::Env));
        }
    }

    Ok(overlays)
}

fn overlays_from_cli_env() -> Result<Vec<PolicyOverlay>, PolicyError> {
    let mut overlays = Vec::new();
    if let Ok(raw) = env::var(ENV_CLI_OVERRIDES) {
        for token in raw.split(',') {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (path, value_raw) = trimmed.split_once('=').unwrap_or((trimmed, ""));
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            overlays.push(PolicyOverlay {
                path: path.to_string(),
                value: parse_env_value(value_raw.trim()),
                source: PolicySource::Cli,
            });
        }
    }
    Ok(overlays)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>, source: PolicySource) -> Vec<PolicyOverlay> {
    match value {
        Value::Object(map) if !map.is_empty() => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix), source));
            }
            result
        }
        other => match prefix {
            Some(prefix) => vec![PolicyOverlay {
                path: prefix,
                value: other,
                source,
            }],
            None => Vec::new(),
        },
    }
}

fn set_path(tree: &mut Value, path: &str, value: Value) -> Result<(), PolicyError> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(PolicyError::value(path, "empty policy path"));
    };

    let mut cursor = tree;
    for segment in parents {
        let map = cursor
            .as_object_mut()
            .ok_or_else(|| PolicyError::value(path, "path crosses a non-object value"))?;
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = cursor
        .as_object_mut()
        .ok_or_else(|| PolicyError::value(path, "path crosses a non-object value"))?;
    map.insert(last.to_string(), value);
    Ok(())
}
