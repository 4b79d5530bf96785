use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    EmptyValue(&'static str),
    InvalidRequester(String),
    UnknownResourceKind(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::EmptyValue(field) => {
                write!(f, "{field} is empty after normalization")
            }
            ModelError::InvalidRequester(raw) => {
                write!(f, "invalid requester id: {raw}")
            }
            ModelError::UnknownResourceKind(raw) => {
                write!(f, "unknown resource kind: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
