
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdsError {
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Type error: cannot assign {assigned} to '{path}' declared as {declared}")]
    Type {
        path: String,
        declared: String,
        assigned: String,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(
        "Dimension {dim} of element '{path}' has incorrect size {actual}. Expected size is {expected}{reference}"
    )]
    Coordinate {
        path: String,
        dim: usize,
        actual: usize,
        expected: usize,
        reference: String,
    },
    #[error("Path error: {0}")]
    Path(String),
    #[error("Uri error: {0}")]
    Uri(String),
    #[error("Entry error: {0}")]
    Entry(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, IdsError>;

// Helper conversions
impl From<rusqlite::Error> for IdsError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<serde_json::Error> for IdsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
