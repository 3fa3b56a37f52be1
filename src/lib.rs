pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod table;
pub mod types;

// Layered boundaries for application ports and infrastructure adapters
pub mod app;
pub mod infra;
