mod logging_config;
mod storage_config;
pub mod config;

pub use logging_config::LoggingConfig;
pub use storage_config::{parse_byte_size, StorageAreaConfig};
