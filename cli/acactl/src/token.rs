//! Bearer tokens for ARM and Key Vault.
//!
//! An explicit token (flag or environment) wins. Otherwise the Azure CLI is
//! asked for one.

use tokio::process::Command;
use tracing::debug;

use crate::error::CliError;

/// Audience for Azure Resource Manager.
pub const ARM_AUDIENCE: &str = "https://management.azure.com/";

/// Audience for Key Vault data-plane calls.
pub const VAULT_AUDIENCE: &str = "https://vault.azure.net";

/// Return `explicit` if set, else a token from `az account get-access-token`.
pub async fn access_token(explicit: Option<&str>, audience: &str) -> Result<String, CliError> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    debug!(audience, "Requesting access token from the Azure CLI");
    let output = Command::new("az")
        .args(az_token_args(audience))
        .output()
        .await
        .map_err(|e| token_error(audience, format!("failed to run az: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(token_error(audience, stderr.trim().to_string()));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(token_error(audience, "az returned an empty token".to_string()));
    }
    Ok(token)
}

fn az_token_args(audience: &str) -> [&str; 8] {
    [
        "account",
        "get-access-token",
        "--resource",
        audience,
        "--query",
        "accessToken",
        "-o",
        "tsv",
    ]
}

fn token_error(audience: &str, message: String) -> CliError {
    CliError::Token {
        audience: audience.to_string(),
        message,
    }
}
