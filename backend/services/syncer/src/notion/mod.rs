pub mod client;
pub mod extract;
pub mod models;
pub mod query;
