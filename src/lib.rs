pub mod chat;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod matrix;
pub mod models;
pub mod rules;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use server::run_server;
