//! CLI commands.

mod config;
mod context;
mod deploy;
mod image;
mod probes;
mod status;

use aca_image::{DockerCli, DEFAULT_BUILD_PLATFORM};
use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::arm::ArmClient;
use crate::config::Config;
use crate::error::CliError;
use crate::output::OutputFormat;
use crate::resolve::ResourceScope;
use crate::telemetry::{self, LogFormat};
use crate::token::{self, ARM_AUDIENCE};

/// acactl - Deploy container app revisions and wait for them to become healthy.
#[derive(Debug, Parser)]
#[command(name = "acactl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Azure subscription ID.
    #[arg(long, global = true, env = "ACACTL_SUBSCRIPTION")]
    subscription: Option<String>,

    /// Resource group holding the container app.
    #[arg(long, global = true, env = "ACACTL_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Bearer token for Azure Resource Manager. Defaults to `az account get-access-token`.
    #[arg(long, global = true, env = "ACACTL_ARM_TOKEN", hide_env_values = true)]
    arm_token: Option<String>,

    /// Bearer token for Key Vault. Defaults to `az account get-access-token`.
    #[arg(long, global = true, env = "ACACTL_VAULT_TOKEN", hide_env_values = true)]
    vault_token: Option<String>,

    /// Container CLI used to build, tag and push images.
    #[arg(long, global = true, env = "ACACTL_DOCKER", default_value = "docker")]
    docker: String,

    /// Target platform for image builds.
    #[arg(long, global = true, env = "ACACTL_BUILD_PLATFORM", default_value = DEFAULT_BUILD_PLATFORM)]
    build_platform: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build or retag images, deploy a revision and wait until it is healthy.
    Deploy(deploy::DeployCommand),

    /// Show the state of a revision.
    Status(status::StatusCommand),

    /// Validate and inspect local app configs.
    Config(config::ConfigCommand),

    /// Show or compare health probes.
    Probes(probes::ProbesCommand),

    /// Retag and publish images.
    Image(image::ImageCommand),

    /// Show, set or clear saved CLI context.
    Context(context::ContextCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        telemetry::init(self.verbose, self.log_format)?;

        let config = Config::load()?;

        let ctx = CommandContext {
            config,
            format: self.format,
            subscription: self.subscription,
            resource_group: self.resource_group,
            arm_token: self.arm_token,
            vault_token: self.vault_token,
            docker: self.docker,
            build_platform: self.build_platform,
        };

        match self.command {
            Commands::Deploy(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Config(cmd) => cmd.run(ctx).await,
            Commands::Probes(cmd) => cmd.run(ctx).await,
            Commands::Image(cmd) => cmd.run(ctx).await,
            Commands::Context(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("acactl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub subscription: Option<String>,
    pub resource_group: Option<String>,
    pub arm_token: Option<String>,
    pub vault_token: Option<String>,
    pub docker: String,
    pub build_platform: String,
}

impl CommandContext {
    /// Resolve the subscription, preferring flag over context.
    pub fn resolve_subscription(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or(self.config.context.subscription.as_deref())
    }

    /// Resolve the resource group, preferring flag over context.
    pub fn resolve_resource_group(&self) -> Option<&str> {
        self.resource_group
            .as_deref()
            .or(self.config.context.resource_group.as_deref())
    }

    /// Subscription and resource group, both required.
    pub fn scope(&self) -> Result<ResourceScope> {
        let subscription = require(self.resolve_subscription(), "subscription", "--subscription")?;
        let resource_group =
            require(self.resolve_resource_group(), "resource group", "--resource-group")?;
        ResourceScope::new(subscription, resource_group)
    }

    /// Get an authenticated ARM client.
    pub async fn arm(&self) -> Result<ArmClient> {
        let scope = self.scope()?;
        let token = token::access_token(self.arm_token.as_deref(), ARM_AUDIENCE).await?;
        ArmClient::new(&self.config.arm_endpoint, scope, &token)
    }

    /// The image runtime selected by --docker and --build-platform.
    pub fn images(&self) -> DockerCli {
        DockerCli::new()
            .with_binary(&self.docker)
            .with_platform(&self.build_platform)
    }
}

/// Require a value from a flag or the saved context.
pub fn require<'a>(
    value: Option<&'a str>,
    what: &'static str,
    flag: &'static str,
) -> Result<&'a str, CliError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(CliError::MissingContext { what, flag })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "acactl",
            "status",
            "myapp",
            "--format",
            "json",
            "--subscription",
            "sub-123",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.subscription.as_deref(), Some("sub-123"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_subcommands_parse() {
        let cases: &[&[&str]] = &[
            &["acactl", "deploy", "myapp", "--dry-run", "--timeout", "600"],
            &["acactl", "status", "myapp", "--revision", "prod-1"],
            &["acactl", "config", "validate", "-c", "app.yaml"],
            &["acactl", "probes", "show", "web", "--app", "myapp"],
            &["acactl", "probes", "diff", "myapp"],
            &["acactl", "image", "retag", "web", "--from", "v1", "--to", "v2"],
            &["acactl", "context", "set", "--subscription", "sub-1", "--registry", "r.azurecr.io"],
            &["acactl", "version"],
        ];
        for args in cases {
            assert!(Cli::try_parse_from(*args).is_ok(), "failed to parse {args:?}");
        }
    }

    #[test]
    fn test_registry_password_flags_go_together() {
        let result = Cli::try_parse_from([
            "acactl",
            "deploy",
            "myapp",
            "--registry-username",
            "pusher",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_require_rejects_blank_values() {
        assert!(require(Some("  "), "subscription", "--subscription").is_err());
        assert_eq!(require(Some(" sub "), "subscription", "--subscription").unwrap(), "sub");
        assert!(matches!(
            require(None, "resource group", "--resource-group"),
            Err(CliError::MissingContext { flag: "--resource-group", .. })
        ));
    }
}
