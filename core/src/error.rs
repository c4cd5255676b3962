use std::io;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed corpus record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("review id out of range: {0}")]
    ReviewOutOfRange(u32),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("index corruption: {0}")]
    Corruption(String),
}

impl From<bincode::Error> for IndexError {
    fn from(e: bincode::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
