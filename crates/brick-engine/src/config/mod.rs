//! Configuration file parsing for brickcommand
//!
//! Supports:
//! - `.brickcommand/config.toml` - Engine timing and event settings

pub mod settings;
pub mod types;

pub use settings::{init_config_dir, load_settings, save_settings, CONFIG_DIR, CONFIG_FILENAME};
pub use types::*;
