use thiserror::Error;

/// Tagged error surface for the agent. Callers branch on the variant
/// instead of catching exception subtypes.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("missing configuration value: {0}")]
    MissingConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
