use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerisError {
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type VerisResult<T> = Result<T, VerisError>;

impl From<std::io::Error> for VerisError {
    fn from(e: std::io::Error) -> Self {
        VerisError::Io(e.to_string())
    }
}
