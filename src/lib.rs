pub mod admin;
pub mod config;
pub mod health;
pub mod metrics;
pub mod service;

pub use config::Config;
pub use health::{ConnectionController, ConnectionState, Mode, Status};
