pub mod config;
pub mod error;

pub use config::SealfileConfig;
pub use error::{ConfigError, ConfigResult};
