//! Error types for snapshot decoding and validation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON for the state schema: {0}")]
    Parse(String),

    #[error("snapshot field `{field}` is invalid: {detail}")]
    Schema { field: String, detail: String },
}

impl SnapshotError {
    pub(crate) fn schema(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
            detail: detail.into(),
        }
    }
}
