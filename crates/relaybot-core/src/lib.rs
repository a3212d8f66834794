pub mod error;
pub mod types;
pub mod config;
pub mod agent;
pub mod provider;
pub mod tool;
pub mod channel;
pub mod service;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const SERVICE_NAME: &str = "relaybot";
