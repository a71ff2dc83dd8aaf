//! Shared fixtures for rollout tests.

#![allow(dead_code)]

use aca_env::EnvFile;
use aca_image::ImageRef;
use aca_revision::{
    assemble_revision, parse_app_config, plan_images, AppConfig, BuiltRevision, DeploymentTarget,
    RegistryAuth, RevisionInputs, RevisionSuffix, SecretBindings,
};
use aca_rollout::DeployPlan;

pub const APP: &str = "myapp";
pub const REVISION: &str = "myapp--prod-20231215120000";

pub const PUBLISHED_CONFIG: &str = r#"
ingress:
  target_port: 8080
containers:
  - name: web
    image_name: myapp
    cpu: 0.5
    memory: 1.0Gi
    env_vars: [LOG_LEVEL]
"#;

pub const RETAG_CONFIG: &str = r#"
ingress:
  target_port: 8080
containers:
  - name: web
    image_name: myapp
    cpu: 0.5
    memory: 1.0Gi
    existing_image_tag: v1
"#;

pub fn target(tag: &str) -> DeploymentTarget {
    DeploymentTarget {
        app_name: APP.to_string(),
        location: "eastus".to_string(),
        environment_id: "env-id".to_string(),
        identity_id: "identity-id".to_string(),
        registry_server: "registry.azurecr.io".to_string(),
        registry_auth: RegistryAuth::Identity,
        image_tag: tag.to_string(),
        revision_suffix: RevisionSuffix::parse("prod-20231215120000").unwrap(),
    }
}

pub fn env() -> EnvFile {
    EnvFile::try_from_iter([("LOG_LEVEL", "info")]).unwrap()
}

pub fn config(yaml: &str) -> AppConfig {
    parse_app_config(yaml).unwrap()
}

pub fn plan(yaml: &str, tag: &str) -> DeployPlan {
    DeployPlan {
        config: config(yaml),
        target: target(tag),
    }
}

/// A ready-to-submit revision with no image side effects.
pub fn built_revision() -> BuiltRevision {
    let config = config(PUBLISHED_CONFIG);
    let target = target("prod-20231215120000");
    let env = env();
    let actions = plan_images(&config, &target).unwrap();
    assemble_revision(
        RevisionInputs {
            config: &config,
            target: &target,
            secrets: &SecretBindings::default(),
            env: &env,
            prior: None,
        },
        &actions,
    )
    .unwrap()
}

pub fn image(tag: &str) -> ImageRef {
    ImageRef::new("registry.azurecr.io", "myapp", tag).unwrap()
}
