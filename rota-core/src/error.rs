use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("{what} already exists: {name}")]
    AlreadyExists { what: &'static str, name: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn owner_not_found(name: &str) -> Self {
        EngineError::NotFound {
            what: "owner",
            name: name.to_string(),
        }
    }

    pub fn entry_not_found(value: &str) -> Self {
        EngineError::NotFound {
            what: "entry",
            name: value.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
