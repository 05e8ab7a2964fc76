pub mod analytics;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod prompt;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod types;
