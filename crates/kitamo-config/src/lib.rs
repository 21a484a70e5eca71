//! kitamo-config
//!
//! Engine settings: materialization horizon, projection window, logging and
//! data location. Owns the Config model plus disk persistence.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::Config;
