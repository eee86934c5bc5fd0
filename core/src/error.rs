use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported kind '{kind}'")]
    UnsupportedKind { kind: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KpiError {
    pub fn unsupported(kind: impl Into<String>) -> Self {
        KpiError::UnsupportedKind { kind: kind.into() }
    }
}

pub type KpiResult<T> = Result<T, KpiError>;
