//! Image commands - publish images without deploying.

use std::path::PathBuf;

use aca_image::{build_and_publish, retag_and_publish, ImageRef};
use anyhow::Result;
use clap::{Args, Subcommand};

use crate::output::{print_single, print_success, OutputFormat};

use super::{require, CommandContext};

/// Retag and publish images.
#[derive(Debug, Args)]
pub struct ImageCommand {
    #[command(subcommand)]
    command: ImageSubcommand,
}

#[derive(Debug, Subcommand)]
enum ImageSubcommand {
    /// Republish an existing tag under a new tag.
    Retag(RetagArgs),

    /// Build an image from a Dockerfile and push it.
    Build(BuildArgs),
}

#[derive(Debug, Args)]
struct RetagArgs {
    /// Image name without registry or tag.
    name: String,

    /// Existing tag.
    #[arg(long)]
    from: String,

    /// New tag.
    #[arg(long)]
    to: String,

    /// Registry login server.
    #[arg(long)]
    registry: Option<String>,
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Image name without registry or tag.
    name: String,

    /// Tag to push.
    #[arg(long)]
    tag: String,

    /// Dockerfile to build.
    #[arg(long, value_name = "PATH", default_value = "Dockerfile")]
    dockerfile: PathBuf,

    /// Registry login server.
    #[arg(long)]
    registry: Option<String>,
}

impl ImageCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let runtime = ctx.images();

        let published = match self.command {
            ImageSubcommand::Retag(args) => {
                let registry = registry(&ctx, args.registry.as_deref())?;
                let source = ImageRef::new(&registry, &args.name, &args.from)?;
                let target = source.with_tag(&args.to)?;
                retag_and_publish(&runtime, &source, &target).await?;
                target
            }
            ImageSubcommand::Build(args) => {
                let registry = registry(&ctx, args.registry.as_deref())?;
                let target = ImageRef::new(&registry, &args.name, &args.tag)?;
                build_and_publish(&runtime, &args.dockerfile, &target).await?;
                target
            }
        };

        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({ "image": published.to_string() })),
            OutputFormat::Table => print_success(&format!("Published {published}")),
        }
        Ok(())
    }
}

fn registry(ctx: &CommandContext, flag: Option<&str>) -> Result<String> {
    let registry = require(
        flag.or(ctx.config.context.registry.as_deref()),
        "registry",
        "--registry",
    )?;
    Ok(registry.to_string())
}
