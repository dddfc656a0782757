use delta_core::{CastError, SourceRow};

/// Invalid mapping definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<delta_core::UnknownTypeError> for ConfigError {
    fn from(error: delta_core::UnknownTypeError) -> Self {
        Self(error.to_string())
    }
}

/// Why a column value could not be generated.
#[derive(Debug, thiserror::Error)]
pub enum GenerationCause {
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid UTF-8 in field {field}: {source}")]
    InvalidText {
        field: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Evaluation(#[from] crate::expression::EvaluationError),
}

/// Failure to generate one destination column from one source row.
#[derive(Debug, thiserror::Error)]
#[error("failed to generate {table}.{column}: {cause}: {source_row:?}")]
pub struct GenerationError {
    pub table: String,
    pub column: String,
    pub source_row: SourceRow,
    #[source]
    pub cause: GenerationCause,
}
