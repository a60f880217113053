//! WebSocket front end for [`chatline_core`].
//!
//! Clients exchange JSON frames of the form `{"event": ..., "data": ...}`;
//! see [`chatline_core::ClientEvent`] and [`chatline_core::ServerEvent`].

pub mod cli;
pub mod config;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use server::{ChatServer, SharedManager, run};
