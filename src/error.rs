use serde::Serialize;

/// Rejected sweep or backend configuration. Always raised before dispatch starts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    #[error("{0} must contain at least one value")]
    EmptyRange(&'static str),

    #[error("{name} value {value} is outside [{min}, {max}]")]
    OutOfBounds {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("max_tokens must be within 1..=4000, got {0}")]
    MaxTokens(u32),

    #[error("batch_size must be at least 1")]
    BatchSize,

    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    RateLimited,
    AuthFailed,
    Other,
}

impl GenerationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("generation failed ({}): {message}", kind.as_str())]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Other, message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("persistence worker failed: {0}")]
    Worker(String),
}

/// Failure of a single sweep point. Never escapes the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("{stage} stage panicked: {message}")]
    StagePanicked { stage: &'static str, message: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(err) => err.kind.as_str(),
            Self::StagePanicked { .. } => "pipeline",
            Self::Persistence(_) => "persistence",
        }
    }
}
