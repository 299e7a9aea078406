//! Snakepit game server library.

pub mod chat;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod server;
pub mod world;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use error::ServerError;
pub use server::{run, shutdown_signal, GameState, Server, SharedStore};
