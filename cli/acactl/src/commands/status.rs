//! Status command - show the state of a revision.
//!
//! Uses the same health rule as `deploy`, so a revision reported healthy here
//! would also have ended a rollout as healthy.

use aca_rollout::{query_latest_revision, query_revision};
use anyhow::Result;
use clap::Args;

use crate::error::CliError;
use crate::output::print_revision;

use super::CommandContext;

/// Show the state of a revision.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Container app name.
    app: String,

    /// Revision name or suffix. Defaults to the app's latest revision.
    #[arg(long)]
    revision: Option<String>,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let arm = ctx.arm().await?;

        let result = match &self.revision {
            Some(revision) => {
                query_revision(&arm, &self.app, &full_revision_name(&self.app, revision)).await?
            }
            None => query_latest_revision(&arm, &self.app).await?,
        };

        print_revision(&result, ctx.format);

        if result.is_healthy() {
            Ok(())
        } else {
            Err(CliError::Unhealthy {
                revision: result.revision_name,
            }
            .into())
        }
    }
}

/// Accept either `<app>--<suffix>` or a bare suffix.
fn full_revision_name(app: &str, revision: &str) -> String {
    if revision.starts_with(&format!("{app}--")) {
        revision.to_string()
    } else {
        format!("{app}--{revision}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_name_expansion() {
        assert_eq!(full_revision_name("myapp", "v2"), "myapp--v2");
        assert_eq!(full_revision_name("myapp", "myapp--v2"), "myapp--v2");
        assert_eq!(full_revision_name("web", "web-api--v1"), "web--web-api--v1");
    }
}
