use std::process::Command;

use ankisync_common::error::{AppError, AppResult};

const ONE_PASSWORD_SCHEME: &str = "op://";

/// Resolve a secret reference.
///
/// `op://vault/item/field` references are read through the 1Password CLI;
/// anything else is treated as the literal secret.
pub fn resolve_secret(reference: &str) -> AppResult<String> {
    if !is_secret_reference(reference) {
        return Ok(reference.to_string());
    }

    tracing::info!(reference, "reading secret from 1password");
    let output = Command::new("op")
        .arg("read")
        .arg(reference)
        .output()
        .map_err(|e| AppError::Secret(format!("failed to run `op read`: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Secret(format!(
            "`op read {reference}` exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let secret = String::from_utf8(output.stdout)
        .map_err(|e| AppError::Secret(format!("secret is not valid UTF-8: {e}")))?;
    Ok(secret.trim().to_string())
}

pub fn is_secret_reference(value: &str) -> bool {
    value.starts_with(ONE_PASSWORD_SCHEME)
}
