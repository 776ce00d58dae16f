// Fitness trainer backend core
// Unit of work over a shared connection pool and token-pair session auth

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;

pub use app::create_router;
pub use config::{AppConfig, ConfigError};

#[cfg(test)]
mod tests;
