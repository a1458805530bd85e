use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("migration stopped after {migrated} record(s), {remaining} remaining: {message}")]
    Migration {
        migrated: usize,
        remaining: usize,
        message: String,
    },
    #[error("record backend changed while the operation was in flight")]
    StaleBackend,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("credential error: {0}")]
    Credential(String),
}

impl InfraError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidConfig(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BackendUnavailable(_) => "NETWORK_ERROR",
            Self::Migration { .. } => "MIGRATION_FAILED",
            Self::StaleBackend => "STALE_BACKEND",
            Self::Unauthorized(_) | Self::Credential(_) => "UNAUTHORIZED",
            Self::Io(_) | Self::Json(_) | Self::Sqlite(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_error_reports_counts() {
        let error = InfraError::Migration {
            migrated: 1,
            remaining: 2,
            message: "network down".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "migration stopped after 1 record(s), 2 remaining: network down"
        );
        assert_eq!(error.code(), "MIGRATION_FAILED");
    }

    #[test]
    fn codes_follow_remote_envelope_names() {
        assert_eq!(InfraError::Validation("x".into()).code(), "INVALID_INPUT");
        assert_eq!(InfraError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(InfraError::BackendUnavailable("x".into()).code(), "NETWORK_ERROR");
    }
}
