//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ConfigError(msg) => format!("configuration error: {}", msg),
        ApiError::InvalidSelector(msg) => format!("invalid --mode: {}", msg),
        ApiError::ProviderNotConfigured(msg) => {
            format!("provider not configured: {} (set [provider] in docpace.toml)", msg)
        }
        other => other.to_string(),
    }
}

/// Exit code for an analysis result: 0 on success, 2 when only a fallback was produced.
pub fn exit_code(success: bool) -> i32 {
    if success {
        0
    } else {
        2
    }
}
