//! Configuration management

mod app_config;
mod migration;

pub use app_config::AppConfig;
pub use migration::Migrate;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Default data directory for the tracker
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("zonetrack"))
        .ok_or_else(|| anyhow!("Could not determine platform data directory"))
}
