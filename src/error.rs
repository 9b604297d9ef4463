use thiserror::Error;

/// Result alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors raised by the reconciliation engine.
///
/// Data-quality findings are not errors; they are returned as
/// [`crate::validate::Issue`] values.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A raw source could not be loaded (missing, unreadable, unsupported format).
    #[error("data source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A source table or request is structurally unusable.
    #[error("schema violation in '{source_name}': {reason}")]
    SchemaViolation { source_name: String, reason: String },

    /// The combiner received no usable rows.
    #[error("no usable sources: cannot build a dataset with no rows")]
    EmptyDataset,

    /// A column that is not part of the canonical schema.
    #[error("unknown canonical field '{0}'")]
    UnknownField(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Build a [`ReconcileError::SourceUnavailable`].
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`ReconcileError::SchemaViolation`].
    pub fn schema(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the pipeline may skip the failing source and continue.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::SchemaViolation { .. } | Self::Io(_) | Self::Csv(_)
        )
    }
}
