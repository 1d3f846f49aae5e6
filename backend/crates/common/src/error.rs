use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("secret resolution failed: {0}")]
    Secret(String),
}

pub type AppResult<T> = Result<T, AppError>;
