use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlossaryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid glossary record: {0}")]
    InvalidRecord(String),
    #[error("Glossary store unavailable: {0}")]
    Unavailable(String),
}
