//! App config hashing.
//!
//! The YAML document is converted to JSON and hashed the same way revision
//! payloads are, so formatting, comments and key order do not change it.

use std::path::Path;

use aca_reconcile::SpecHash;
use anyhow::{Context, Result};

pub fn config_hash_from_yaml_str(contents: &str) -> Result<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents).context("invalid app config YAML")?;
    if !value.is_mapping() {
        anyhow::bail!("app config must be a YAML mapping at the top level");
    }

    let json_value = serde_json::to_value(&value).context("failed to convert app config to JSON")?;
    Ok(SpecHash::from_json(&json_value).to_string())
}

pub fn config_hash_from_path(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read app config: {}", path.display()))?;
    config_hash_from_yaml_str(&contents)
        .with_context(|| format!("failed to compute app config hash: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_hash_is_deterministic_across_formatting() {
        let a = r#"
# web tier
ingress:
  target_port: 8080
containers:
  - name: web
    image_name: web
    cpu: 0.5
    memory: 1.0Gi
"#;

        let b = r#"
containers:
  - {memory: 1.0Gi, cpu: 0.5, image_name: web, name: web}
ingress: {target_port: 8080}
"#;

        let ha = config_hash_from_yaml_str(a).unwrap();
        let hb = config_hash_from_yaml_str(b).unwrap();
        assert_eq!(ha, hb);
        assert!(ha.starts_with("sha256:"));
    }

    #[test]
    fn config_hash_matches_payload_hashing() {
        let yaml = "containers:\n  - {name: web, cpu: 0.5}\n";
        let json = serde_json::json!({"containers": [{"cpu": 0.5, "name": "web"}]});
        assert_eq!(
            config_hash_from_yaml_str(yaml).unwrap(),
            SpecHash::from_json(&json).as_str()
        );
    }

    #[test]
    fn config_hash_rejects_non_mappings() {
        assert!(config_hash_from_yaml_str("- just\n- a list\n").is_err());
    }

    #[test]
    fn config_hash_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        std::fs::write(&path, "containers: []\n").unwrap();
        assert!(config_hash_from_path(&path).unwrap().starts_with("sha256:"));
    }
}
