//! Settings parser for .brickcommand/config.toml

use std::path::Path;

use brick_core::prelude::*;

use super::types::Settings;

pub const CONFIG_FILENAME: &str = "config.toml";
pub const CONFIG_DIR: &str = ".brickcommand";

/// Load settings from `<project>/.brickcommand/config.toml`.
///
/// A missing or unreadable file yields the defaults.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(CONFIG_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write `settings` to `<project>/.brickcommand/config.toml`, creating the directory
pub fn save_settings(project_path: &Path, settings: &Settings) -> Result<()> {
    let config_dir = project_path.join(CONFIG_DIR);
    std::fs::create_dir_all(&config_dir)
        .map_err(|e| Error::config(format!("Failed to create {}: {}", CONFIG_DIR, e)))?;

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;

    std::fs::write(config_dir.join(CONFIG_FILENAME), content)
        .map_err(|e| Error::config(format!("Failed to write {}: {}", CONFIG_FILENAME, e)))?;
    Ok(())
}

/// Create a commented default config file if none exists
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let config_dir = project_path.join(CONFIG_DIR);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| Error::config(format!("Failed to create {}: {}", CONFIG_DIR, e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# brickcommand configuration

[engine]
# Upper bound (ms) on how long the dispatcher sleeps when no command is ready.
# New controller input wakes it earlier.
idle_interval_ms = 20

# Longest (ms) a single device round trip may take.
command_timeout_ms = 5000

# Buffer size of the engine event channel.
event_capacity = 64
"#;
        std::fs::write(&config_path, default_content)?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}
