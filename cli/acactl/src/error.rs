//! Error handling and display for the CLI.

use aca_rollout::{PlatformError, RolloutError};
use colored::Colorize;
use thiserror::Error;

/// Exit code for an unhealthy revision.
pub const EXIT_UNHEALTHY: i32 = 2;
/// Exit code for a rollout that ran out of time.
pub const EXIT_TIMED_OUT: i32 = 3;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not get an access token for {audience}: {message}")]
    Token { audience: String, message: String },

    #[error("No {what} specified. Use {flag} or run `acactl context set {flag} <value>`.")]
    MissingContext {
        what: &'static str,
        flag: &'static str,
    },

    #[error("Revision {revision} is unhealthy")]
    Unhealthy { revision: String },

    #[error("Revision {revision} did not become healthy within {timeout_secs}s")]
    TimedOut { revision: String, timeout_secs: u64 },
}

/// Process exit code for `err`.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Unhealthy { .. }) => EXIT_UNHEALTHY,
        Some(CliError::TimedOut { .. }) => EXIT_TIMED_OUT,
        _ => 1,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Token { .. } => {
                Some("Run `az login`, or pass a token with ACACTL_ARM_TOKEN / ACACTL_VAULT_TOKEN.")
            }
            CliError::TimedOut { .. } => Some(
                "The revision may still converge. Check it later with `acactl status`.",
            ),
            CliError::Unhealthy { .. } => {
                Some("Inspect the revision's system and console logs for the failing container.")
            }
            CliError::MissingContext { .. } => None,
        };
    }

    let rollout_err = err.downcast_ref::<RolloutError>()?;
    match rollout_err {
        RolloutError::DryRunRefused { .. } => {
            Some("Publish the images first, or deploy without --dry-run.")
        }
        err if err.is_config_error() => {
            Some("Nothing was deployed. Fix the app config or environment and retry.")
        }
        RolloutError::PlatformRejected { .. } => {
            Some("The platform refused the revision. It was not retried.")
        }
        RolloutError::Platform {
            source: PlatformError::Auth(_),
            ..
        } => Some("Your access token may have expired. Run `az login`."),
        RolloutError::Image(_) | RolloutError::Build(aca_revision::BuildError::Image(_)) => {
            Some("Check that docker is running and logged in to the registry.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let unhealthy = anyhow::Error::new(CliError::Unhealthy {
            revision: "myapp--v2".to_string(),
        });
        let timed_out = anyhow::Error::new(CliError::TimedOut {
            revision: "myapp--v2".to_string(),
            timeout_secs: 300,
        });
        let other = anyhow::anyhow!("boom");

        assert_eq!(exit_code(&unhealthy), EXIT_UNHEALTHY);
        assert_eq!(exit_code(&timed_out), EXIT_TIMED_OUT);
        assert_eq!(exit_code(&other), 1);
    }

    #[test]
    fn test_config_errors_hint_that_nothing_was_deployed() {
        let err = anyhow::Error::new(RolloutError::Materialize(
            aca_revision::MaterializeError::MissingEnv {
                names: vec!["DB_URL".to_string()],
            },
        ));
        assert_eq!(
            hint(&err),
            Some("Nothing was deployed. Fix the app config or environment and retry.")
        );
    }
}
