pub mod env;
pub mod secrets;
pub mod tracing_init;

pub use env::{AnkiSettings, AppConfig, NotionSettings};
pub use secrets::resolve_secret;
pub use tracing_init::init_tracing;
