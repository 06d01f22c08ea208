use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] nicodl_engine::NicoError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Progress style error: {0}")]
    ProgressStyle(#[from] indicatif::style::TemplateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interrupted by user")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, AppError>;
