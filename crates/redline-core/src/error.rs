use thiserror::Error;

/// Malformed window parameters. Fatal: raised before any call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    #[error("window size must be positive")]
    ZeroWindow,
    #[error("overlap ({overlap}) must be smaller than the window size ({window_size})")]
    OverlapTooLarge { window_size: usize, overlap: usize },
}

/// Whole-run configuration problems, validated before the first unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key for provider {0}")]
    MissingApiKey(String),
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// A single provider call failed. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("could not reach the provider (network or CORS failure): {0}")]
    Connectivity(String),
    #[error("provider request timed out after {0}s")]
    Timeout(u64),
    #[error("provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("provider reported an error: {0}")]
    ProviderReported(String),
    #[error("malformed provider reply: {0}")]
    MalformedReply(String),
}

/// Neither strict nor repaired parsing produced JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not recover JSON from reply: {detail}")]
pub struct RecoveryError {
    pub detail: String,
}

/// Errors that abort a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("review cancelled")]
    Cancelled,
}
