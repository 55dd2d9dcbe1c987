//! Config schema migration support

use anyhow::Result;

/// Versioned migration for persisted configuration
pub trait Migrate {
    /// The version currently stored
    fn current_version(&self) -> u32;

    /// The version this build writes
    fn target_version() -> u32;

    /// Migrate in place up to the target version
    fn migrate(&mut self) -> Result<()>;
}
