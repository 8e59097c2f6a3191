use thiserror::Error;

/// Top-level error type for Ragline.
///
/// Each pipeline stage reports failures with its own variant. Stages that need
/// to attach identifying context (the directory being ingested, the chunk
/// being embedded) wrap the original error in [`RagError::Context`]; use
/// [`RagError::kind`] to branch on the underlying failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Generation error for query '{query}': {reason}")]
    Generation { query: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RagError>,
    },
}

/// Error category, independent of any context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Extraction,
    Embedding,
    Store,
    Generation,
    Config,
    Io,
    Serialization,
}

impl RagError {
    /// The category of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Validation(_) => ErrorKind::Validation,
            RagError::Extraction { .. } => ErrorKind::Extraction,
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::Store(_) => ErrorKind::Store,
            RagError::Generation { .. } => ErrorKind::Generation,
            RagError::Config(_) => ErrorKind::Config,
            RagError::Io(_) => ErrorKind::Io,
            RagError::Serialization(_) => ErrorKind::Serialization,
            RagError::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap this error with identifying context.
    pub fn context(self, context: impl Into<String>) -> Self {
        RagError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<toml::de::Error> for RagError {
    fn from(err: toml::de::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RagError {
    fn from(err: toml::ser::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Ragline operations.
pub type Result<T> = std::result::Result<T, RagError>;
