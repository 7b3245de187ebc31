//! Server side: credential store, token handling, auth service and HTTP surface

pub mod auth;
pub mod config;
pub mod db;
pub mod server;
#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError, RefreshPolicy};
