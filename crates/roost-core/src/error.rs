use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoostError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Source acquisition failed: {0}")]
    Acquire(String),

    #[error("Dependency install failed: {0}")]
    Dependencies(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Dashboard already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("User already exists: {0}")]
    DuplicateEmail(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RoostError {
    /// Returns `true` for errors that must abort the whole command with a
    /// non-zero exit. Soft conditions (a build that failed but left a usable
    /// tree, a service that spawned but never answered the probe) are not
    /// modelled as errors at all — they are reported in result types.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AlreadyRunning(_))
    }
}

pub type Result<T> = std::result::Result<T, RoostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_is_not_fatal() {
        assert!(!RoostError::AlreadyRunning(1234).is_fatal());
        assert!(RoostError::Dependencies("npm install exited 1".into()).is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = RoostError::DuplicateEmail("ops@example.com".into());
        assert!(err.to_string().contains("ops@example.com"));
    }
}
