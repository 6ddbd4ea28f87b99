use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolysubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid audio duration: {0}")]
    InvalidDuration(String),

    #[error("No token with a timestamp available to borrow from: {0}")]
    NoTimestamp(String),

    #[error("Sentence alignment failed: {0}")]
    Alignment(String),

    #[error("Preprocessing cache error: {0}")]
    Cache(String),

    #[error("Pipeline step '{step}' failed: {message}")]
    Pipeline { step: String, message: String },

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Transcription error: {0}")]
    Transcriber(String),

    #[error("Sentence provider error: {0}")]
    Sentences(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, PolysubError>;
