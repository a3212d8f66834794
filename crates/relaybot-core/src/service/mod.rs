pub mod commands;
pub mod http;
pub mod runner;
pub mod tasks;

pub use http::{create_router, serve, AppState};
