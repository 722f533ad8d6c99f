//! Harness configuration
//!
//! Limits for both execution paths, loadable from JSON and overridable
//! from the environment:
//!
//! | variable                       | field              |
//! |--------------------------------|--------------------|
//! | `WASM_RUNNER_STEP_BUDGET`      | `step_budget`      |
//! | `WASM_RUNNER_MAX_CALL_DEPTH`   | `max_call_depth`   |
//! | `WASM_RUNNER_MAX_MEMORY_PAGES` | `max_memory_pages` |
//! | `WASM_RUNNER_COMPILED_FUEL`    | `compiled_fuel`    |
//!
//! `WASM_RUNNER_COMPILED_FUEL=none` removes the compiled-path bound.

use crate::compiler::{ExecutionLimits, DEFAULT_FUEL, DEFAULT_MAX_MEMORY_PAGES};
use crate::runtime::interpreter::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_STEP_BUDGET};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_STEP_BUDGET: &str = "WASM_RUNNER_STEP_BUDGET";
pub const ENV_MAX_CALL_DEPTH: &str = "WASM_RUNNER_MAX_CALL_DEPTH";
pub const ENV_MAX_MEMORY_PAGES: &str = "WASM_RUNNER_MAX_MEMORY_PAGES";
pub const ENV_COMPILED_FUEL: &str = "WASM_RUNNER_COMPILED_FUEL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Interpreter steps per run
    pub step_budget: u64,
    pub max_call_depth: usize,
    /// Largest memory a compiled instance may allocate
    pub max_memory_pages: u32,
    /// Actions per compiled call, unbounded when `null`
    pub compiled_fuel: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            step_budget: DEFAULT_STEP_BUDGET,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            compiled_fuel: Some(DEFAULT_FUEL),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(json: &str) -> Result<HarnessConfig, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        HarnessConfig::from_json_str(&json)
    }

    /// Applies the `WASM_RUNNER_*` variables that are set.
    pub fn with_env_overrides(self) -> Result<HarnessConfig, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<HarnessConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, ENV_STEP_BUDGET)? {
            self.step_budget = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_CALL_DEPTH)? {
            self.max_call_depth = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_MEMORY_PAGES)? {
            self.max_memory_pages = v;
        }
        if let Some(value) = lookup(ENV_COMPILED_FUEL) {
            self.compiled_fuel = if value.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_value(ENV_COMPILED_FUEL, &value)?)
            };
        }
        Ok(self)
    }

    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_call_depth: self.max_call_depth,
            max_memory_pages: self.max_memory_pages,
            fuel: self.compiled_fuel,
        }
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(var).map(|value| parse_value(var, &value)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.step_budget, 1_000_000);
        assert_eq!(config.max_call_depth, 1024);
        assert_eq!(config.compiled_fuel, Some(1_000_000));
        assert_eq!(HarnessConfig::from_json_str("{}").unwrap(), config);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{"step_budget": 10, "compiled_fuel": 500}"#;
        let config = HarnessConfig::from_json_str(json).unwrap();
        assert_eq!(config.step_budget, 10);
        assert_eq!(config.compiled_fuel, Some(500));
        assert_eq!(config.max_call_depth, 1024);
        assert_eq!(config.execution_limits().fuel, Some(500));

        let unbounded = HarnessConfig::from_json_str(r#"{"compiled_fuel": null}"#).unwrap();
        assert_eq!(unbounded.compiled_fuel, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            HarnessConfig::from_json_str(r#"{"stepbudget": 10}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = HarnessConfig::from_file("/nonexistent/harness.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/harness.json"));
    }

    #[test]
    fn test_overrides() {
        let config = HarnessConfig::default()
            .with_overrides(lookup(&[
                (ENV_STEP_BUDGET, " 42 "),
                (ENV_MAX_MEMORY_PAGES, "16"),
                (ENV_COMPILED_FUEL, "7"),
            ]))
            .unwrap();
        assert_eq!(config.step_budget, 42);
        assert_eq!(config.max_memory_pages, 16);
        assert_eq!(config.compiled_fuel, Some(7));

        let config = config.with_overrides(lookup(&[(ENV_COMPILED_FUEL, "none")])).unwrap();
        assert_eq!(config.compiled_fuel, None);
    }

    #[test]
    fn test_bad_override() {
        let err = HarnessConfig::default()
            .with_overrides(lookup(&[(ENV_MAX_CALL_DEPTH, "deep")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"deep\" for WASM_RUNNER_MAX_CALL_DEPTH");
    }
}
