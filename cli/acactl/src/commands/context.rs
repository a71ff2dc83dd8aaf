//! Context commands (saved defaults for deploy targets).

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::config::{CliContext, PollSettings};
use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

/// Manage saved CLI context (defaults for deploy targets).
#[derive(Debug, Args)]
pub struct ContextCommand {
    #[command(subcommand)]
    command: ContextSubcommand,
}

#[derive(Debug, Subcommand)]
enum ContextSubcommand {
    /// Show the saved context.
    Show,

    /// Save defaults. The global --subscription and --resource-group flags are saved too.
    Set(SetArgs),

    /// Clear the saved context.
    Clear,
}

#[derive(Debug, Args)]
struct SetArgs {
    /// Managed environment name or resource ID.
    #[arg(long)]
    environment: Option<String>,

    /// Azure region.
    #[arg(long)]
    location: Option<String>,

    /// Registry login server.
    #[arg(long)]
    registry: Option<String>,

    /// User-assigned identity name or resource ID.
    #[arg(long)]
    identity: Option<String>,

    /// Key vault name or URL.
    #[arg(long)]
    key_vault: Option<String>,

    /// Seconds between revision polls.
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Seconds to wait for a revision to become healthy.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Azure Resource Manager endpoint.
    #[arg(long)]
    arm_endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
struct ContextView<'a> {
    arm_endpoint: &'a str,
    #[serde(flatten)]
    context: &'a CliContext,
    polling: PollSettings,
}

impl ContextCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ContextSubcommand::Show => show(ctx),
            ContextSubcommand::Set(args) => set(args, ctx),
            ContextSubcommand::Clear => clear(ctx),
        }
    }
}

fn show(ctx: CommandContext) -> Result<()> {
    let view = ContextView {
        arm_endpoint: &ctx.config.arm_endpoint,
        context: &ctx.config.context,
        polling: ctx.config.polling,
    };

    match ctx.format {
        OutputFormat::Json => print_single(&view),
        OutputFormat::Table => {
            let context = view.context;
            let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
            println!("arm_endpoint:   {}", view.arm_endpoint);
            println!("subscription:   {}", field(&context.subscription));
            println!("resource_group: {}", field(&context.resource_group));
            println!("environment:    {}", field(&context.environment));
            println!("location:       {}", field(&context.location));
            println!("registry:       {}", field(&context.registry));
            println!("identity:       {}", field(&context.identity));
            println!("key_vault:      {}", field(&context.key_vault));
            println!("poll_interval:  {}s", view.polling.interval_secs);
            println!("timeout:        {}s", view.polling.timeout_secs);
        }
    }

    Ok(())
}

fn set(args: SetArgs, mut ctx: CommandContext) -> Result<()> {
    ctx.config.context.merge(CliContext {
        subscription: ctx.subscription.clone(),
        resource_group: ctx.resource_group.clone(),
        environment: args.environment,
        location: args.location,
        registry: args.registry,
        identity: args.identity,
        key_vault: args.key_vault,
    });

    let polling = PollSettings {
        interval_secs: args
            .poll_interval
            .unwrap_or(ctx.config.polling.interval_secs),
        timeout_secs: args.timeout.unwrap_or(ctx.config.polling.timeout_secs),
    };
    polling.policy()?;
    ctx.config.polling = polling;

    if let Some(endpoint) = args.arm_endpoint {
        ctx.config.arm_endpoint = endpoint.trim_end_matches('/').to_string();
    }

    ctx.config.save()?;

    match ctx.format {
        OutputFormat::Json => print_single(&serde_json::json!({ "ok": true })),
        OutputFormat::Table => print_success("Saved context"),
    }

    Ok(())
}

fn clear(mut ctx: CommandContext) -> Result<()> {
    ctx.config.context = CliContext::default();
    ctx.config.polling = PollSettings::default();
    ctx.config.save()?;

    match ctx.format {
        OutputFormat::Json => print_single(&serde_json::json!({ "ok": true })),
        OutputFormat::Table => print_success("Cleared saved context"),
    }

    Ok(())
}
