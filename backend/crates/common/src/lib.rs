pub mod error;
pub mod types;

pub use error::{AppError, AppResult};
pub use types::{field_text, FieldMapping, TransformConfig, PLACEHOLDER};
