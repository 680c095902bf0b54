pub mod activity;
pub mod auth;
pub mod config;
pub mod sync;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;
