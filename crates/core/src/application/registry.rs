// Target Registry - load-time construction of the monitored target set

use crate::domain::{FetchSpec, Target};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

/// URL template of the META repo for each SoC target platform
const META_URL_TEMPLATE: &str =
    "https://chipmaster2.qti.qualcomm.com/home2/git/google-inc/{target}_test_device.git";

/// Built-in SoC target platforms (used when no registry file is given)
const BUILTIN_TARGETS: &[&str] = &[
    // SDM845
    "sdm845-la-2-0",
    // SDM660
    "snapdragon-high-mid-2017-spf-3-0",
    // MSM8917
    "snapdragon-high-mid-2018-spf-1-0-1",
];

/// Registry load errors (all fatal - fail fast at startup)
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry is empty")]
    Empty,

    #[error("duplicate target id: {0}")]
    DuplicateId(String),

    #[error("invalid registry config: {0}")]
    Invalid(String),
}

/// One registry entry as configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub id: String,
    pub fetch_spec: serde_json::Value,
}

/// Registry configuration (JSON file or built-in defaults)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub targets: Vec<TargetEntry>,
}

impl RegistryConfig {
    /// Default registry: the supported SoC platforms expanded through the
    /// META URL template.
    pub fn builtin() -> Self {
        let targets = BUILTIN_TARGETS
            .iter()
            .map(|id| TargetEntry {
                id: (*id).to_string(),
                fetch_spec: serde_json::json!({
                    "git_url": META_URL_TEMPLATE.replace("{target}", id),
                }),
            })
            .collect();
        Self { targets }
    }

    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(raw).map_err(|e| RegistryError::Invalid(e.to_string()))
    }
}

/// Build the ordered target list from a registry config.
///
/// Duplicate ids are fatal rather than silently shadowing one target's
/// results with another's; an empty registry is fatal because the daemon
/// would have nothing to do forever.
pub fn load_targets(config: &RegistryConfig) -> Result<Vec<Target>, RegistryError> {
    if config.targets.is_empty() {
        return Err(RegistryError::Empty);
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(config.targets.len());
    for entry in &config.targets {
        if !seen.insert(entry.id.clone()) {
            return Err(RegistryError::DuplicateId(entry.id.clone()));
        }
        targets.push(Target::new(
            entry.id.clone(),
            FetchSpec::new(entry.fetch_spec.clone()),
        ));
    }

    info!(targets = targets.len(), "Target registry loaded");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_loads_all_platforms() {
        let targets = load_targets(&RegistryConfig::builtin()).unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].id, "sdm845-la-2-0");
        let url = targets[0].fetch_spec.as_value()["git_url"].as_str().unwrap();
        assert!(url.ends_with("sdm845-la-2-0_test_device.git"));
    }

    #[test]
    fn empty_registry_is_fatal() {
        let config = RegistryConfig { targets: vec![] };
        assert!(matches!(load_targets(&config), Err(RegistryError::Empty)));
    }

    #[test]
    fn duplicate_id_is_fatal() {
        let config = RegistryConfig::from_json(
            r#"{"targets": [
                {"id": "sdm845-la-2-0", "fetch_spec": {"git_url": "https://example.com/a.git"}},
                {"id": "sdm845-la-2-0", "fetch_spec": {"git_url": "https://example.com/b.git"}}
            ]}"#,
        )
        .unwrap();

        match load_targets(&config) {
            Err(RegistryError::DuplicateId(id)) => assert_eq!(id, "sdm845-la-2-0"),
            other => panic!("expected DuplicateId, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn malformed_json_is_invalid() {
        assert!(matches!(
            RegistryConfig::from_json("{\"targets\": 5}"),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn config_order_is_preserved() {
        let config = RegistryConfig::from_json(
            r#"{"targets": [
                {"id": "b", "fetch_spec": {}},
                {"id": "a", "fetch_spec": {}},
                {"id": "c", "fetch_spec": {}}
            ]}"#,
        )
        .unwrap();

        let ids: Vec<_> = load_targets(&config)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
