//! Probe commands - show a container's probes and compare them with the live app.

use std::path::PathBuf;

use aca_revision::probes::TemplateContainer;
use aca_revision::{
    diff_probes, extract_probes, load_app_config, ContainerAppPayload, ProbeLookup, ProbeSpec,
};
use aca_rollout::{ContainerProbeDiff, Platform, RolloutError};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Show or compare health probes.
#[derive(Debug, Args)]
pub struct ProbesCommand {
    #[command(subcommand)]
    command: ProbesSubcommand,
}

#[derive(Debug, Subcommand)]
enum ProbesSubcommand {
    /// Show the probes of one container, from a config file or the live app.
    Show(ShowArgs),

    /// Compare the probes in a config file with the live app.
    Diff(DiffArgs),
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Container name.
    container: String,

    /// App config file (YAML). Ignored with --app.
    #[arg(long, short = 'c', value_name = "PATH", default_value = "app-config.yaml")]
    config: PathBuf,

    /// Read the probes of a deployed container app instead.
    #[arg(long)]
    app: Option<String>,
}

#[derive(Debug, Args)]
struct DiffArgs {
    /// Container app name.
    app: String,

    /// App config file (YAML).
    #[arg(long, short = 'c', value_name = "PATH", default_value = "app-config.yaml")]
    config: PathBuf,
}

#[derive(Debug, Serialize, Tabled)]
struct ProbeRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Delay")]
    initial_delay_seconds: u32,
    #[tabled(rename = "Period")]
    period_seconds: u32,
    #[tabled(rename = "Timeout")]
    timeout_seconds: u32,
    #[tabled(rename = "Failure")]
    failure_threshold: u32,
    #[tabled(rename = "Success")]
    success_threshold: u32,
}

impl From<&ProbeSpec> for ProbeRow {
    fn from(probe: &ProbeSpec) -> Self {
        let timing = probe.timing.effective();
        Self {
            kind: probe.kind.to_string(),
            check: probe.check.describe(),
            initial_delay_seconds: timing.initial_delay_seconds,
            period_seconds: timing.period_seconds,
            timeout_seconds: timing.timeout_seconds,
            failure_threshold: timing.failure_threshold,
            success_threshold: timing.success_threshold,
        }
    }
}

impl ProbesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ProbesSubcommand::Show(args) => show(args, ctx).await,
            ProbesSubcommand::Diff(args) => diff(args, ctx).await,
        }
    }
}

async fn show(args: ShowArgs, ctx: CommandContext) -> Result<()> {
    match &args.app {
        Some(app) => {
            let live = live_app(&ctx, app).await?;
            print_probes(live.containers(), &args.container, ctx.format)
        }
        None => {
            let config = load_app_config(&args.config).map_err(RolloutError::from)?;
            print_probes(&config.template.containers, &args.container, ctx.format)
        }
    }
}

fn print_probes<C: TemplateContainer>(
    containers: &[C],
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    match extract_probes(containers, name)? {
        ProbeLookup::Declared(probes) => {
            let rows: Vec<ProbeRow> = probes.iter().map(ProbeRow::from).collect();
            print_output(&rows, format);
        }
        ProbeLookup::NoProbes => match format {
            OutputFormat::Json => print_single(&Vec::<ProbeRow>::new()),
            OutputFormat::Table => print_info(&format!("Container '{name}' has no probes")),
        },
    }
    Ok(())
}

async fn diff(args: DiffArgs, ctx: CommandContext) -> Result<()> {
    let config = load_app_config(&args.config).map_err(RolloutError::from)?;
    let live = live_app(&ctx, &args.app).await?;

    let diffs = config_diffs(&config.template.containers, &live);

    match ctx.format {
        OutputFormat::Json => print_single(&diffs),
        OutputFormat::Table => {
            if diffs.is_empty() {
                print_success("Probes match the live app");
            }
            for diff in &diffs {
                println!("{}:", diff.container);
                for change in &diff.changes {
                    println!("  {change}");
                }
            }
        }
    }
    Ok(())
}

/// Per-container probe changes a deploy of `containers` would make.
///
/// Containers without declared probes inherit the live ones and never differ.
/// Containers the live app does not have yet compare against no probes.
fn config_diffs<C: TemplateContainer>(
    containers: &[C],
    live: &ContainerAppPayload,
) -> Vec<ContainerProbeDiff> {
    containers
        .iter()
        .filter_map(|container| {
            let desired = container.declared_probes()?;
            let current = extract_probes(live.containers(), container.container_name())
                .map(|lookup| lookup.probes())
                .unwrap_or(&[]);
            let changes = diff_probes(current, desired);
            (!changes.is_empty()).then(|| ContainerProbeDiff {
                container: container.container_name().to_string(),
                changes,
            })
        })
        .collect()
}

async fn live_app(ctx: &CommandContext, app: &str) -> Result<ContainerAppPayload> {
    let arm = ctx.arm().await?;
    arm.get_app(app)
        .await
        .with_context(|| format!("failed to fetch container app '{app}'"))?
        .with_context(|| format!("container app '{app}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aca_revision::{parse_app_config, ProbeChange, ProbeKind};

    fn live() -> ContainerAppPayload {
        serde_json::from_value(serde_json::json!({
            "location": "eastus",
            "properties": {
                "configuration": {},
                "template": {
                    "containers": [
                        {
                            "name": "web",
                            "image": "registry.azurecr.io/web:v1",
                            "probes": [
                                { "type": "Liveness", "httpGet": { "path": "/health", "port": 8080 } }
                            ]
                        }
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_config_diffs_skip_inherited_probes() {
        let config = parse_app_config(
            r#"
containers:
  - name: web
    image_name: web
    cpu: 0.5
    memory: 1.0Gi
"#,
        )
        .unwrap();

        assert!(config_diffs(&config.template.containers, &live()).is_empty());
    }

    #[test]
    fn test_config_diffs_report_changes_and_new_containers() {
        let config = parse_app_config(
            r#"
containers:
  - name: web
    image_name: web
    cpu: 0.5
    memory: 1.0Gi
    probes:
      - type: Liveness
        httpGet:
          path: /healthz
          port: 8080
  - name: worker
    image_name: worker
    cpu: 0.25
    memory: 512Mi
    probes:
      - type: Startup
        tcpSocket:
          port: 9000
"#,
        )
        .unwrap();

        let diffs = config_diffs(&config.template.containers, &live());
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].container, "web");
        assert_eq!(diffs[0].changes[0].to_string(), "~ Liveness GET :8080/health -> GET :8080/healthz");
        assert_eq!(diffs[1].container, "worker");
        assert_eq!(
            diffs[1].changes,
            vec![ProbeChange::Added {
                kind: ProbeKind::Startup,
                check: "TCP :9000".to_string(),
            }]
        );
    }

    #[test]
    fn test_print_probes_unknown_container_is_an_error() {
        let app = live();
        let err = print_probes(app.containers(), "api", OutputFormat::Json).unwrap_err();
        assert!(err.to_string().contains("container 'api' not found"));
    }

    #[test]
    fn test_probe_row_applies_defaults() {
        let row = ProbeRow::from(&ProbeSpec::tcp(ProbeKind::Readiness, 5432));
        assert_eq!(row.check, "TCP :5432");
        assert_eq!(row.period_seconds, 10);
        assert_eq!(row.failure_threshold, 3);
    }
}
