//! Config commands - validate and inspect app config files.

use std::path::PathBuf;

use aca_revision::model::ImageSource;
use aca_revision::{load_app_config, AppConfig, ContainerSpec};
use aca_rollout::RolloutError;
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::hash::config_hash_from_path;
use crate::output::{print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Validate and inspect local app configs.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Load a config, report every container and the config hash.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// App config file (YAML).
    #[arg(long, short = 'c', value_name = "PATH", default_value = "app-config.yaml")]
    config: PathBuf,
}

/// Container summary row.
#[derive(Debug, Serialize, Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "CPU")]
    cpu: f64,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Probes")]
    probes: String,
    #[tabled(rename = "Env")]
    env_vars: usize,
}

impl From<&ContainerSpec> for ContainerRow {
    fn from(container: &ContainerSpec) -> Self {
        let source = match container.image_source() {
            ImageSource::Retag(tag) => format!("retag {tag}"),
            ImageSource::Build(dockerfile) => format!("build {}", dockerfile.display()),
            ImageSource::Published => "published".to_string(),
        };
        let probes = match &container.probes {
            Some(probes) => probes
                .iter()
                .map(|p| p.kind.as_str())
                .collect::<Vec<_>>()
                .join(","),
            None => "inherit".to_string(),
        };

        Self {
            name: container.name.clone(),
            image: container.image_name.clone(),
            cpu: container.cpu,
            memory: container.memory.to_string(),
            source,
            probes,
            env_vars: container.env_vars.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ValidationView<'a> {
    valid: bool,
    config_hash: &'a str,
    config: &'a AppConfig,
}

impl ConfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ConfigSubcommand::Validate(args) => validate(args, ctx.format),
        }
    }
}

fn validate(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let config = load_app_config(&args.config).map_err(RolloutError::from)?;
    let config_hash = config_hash_from_path(&args.config)?;

    match format {
        OutputFormat::Json => print_single(&ValidationView {
            valid: true,
            config_hash: &config_hash,
            config: &config,
        }),
        OutputFormat::Table => {
            let rows: Vec<ContainerRow> =
                config.template.containers.iter().map(ContainerRow::from).collect();
            print_output(&rows, format);

            match &config.ingress {
                Some(ingress) => println!(
                    "Ingress: {} port {} ({})",
                    if ingress.external { "external" } else { "internal" },
                    ingress.target_port,
                    ingress.transport
                ),
                None => println!("Ingress: none"),
            }
            println!(
                "Scale:   {}..{} replicas",
                config.scale.min_replicas, config.scale.max_replicas
            );
            if !config.secrets.is_empty() {
                println!("Secrets: {}", config.secrets.join(", "));
            }
            println!("Hash:    {config_hash}");
            print_success(&format!("{} is valid", args.config.display()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aca_revision::parse_app_config;

    #[test]
    fn test_container_rows_describe_sources() {
        let config = parse_app_config(
            r#"
containers:
  - name: web
    image_name: web
    cpu: 0.5
    memory: 1.0Gi
    dockerfile: ./Dockerfile
    probes:
      - type: Liveness
        tcpSocket:
          port: 8080
  - name: worker
    image_name: worker
    cpu: 0.25
    memory: 512Mi
    existing_image_tag: v3
    env_vars: [QUEUE_URL, LOG_LEVEL]
"#,
        )
        .unwrap();

        let rows: Vec<ContainerRow> =
            config.template.containers.iter().map(ContainerRow::from).collect();

        assert_eq!(rows[0].source, "build ./Dockerfile");
        assert_eq!(rows[0].probes, "Liveness");
        assert_eq!(rows[1].source, "retag v3");
        assert_eq!(rows[1].probes, "inherit");
        assert_eq!(rows[1].env_vars, 2);
    }

    #[test]
    fn test_validate_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        std::fs::write(&path, "ingress:\n  target_port: 8080\n").unwrap();

        let err = validate(ValidateArgs { config: path }, OutputFormat::Json).unwrap_err();
        assert!(err.downcast_ref::<RolloutError>().is_some());
    }
}
