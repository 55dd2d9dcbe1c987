//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use zonetrack_core::config::AppConfig;
use zonetrack_core::domain::Observation;
use zonetrack_core::registry::RegistrationPolicy;
use zonetrack_core::Core;

/// A core whose site accepts any device and any zone on first sight.
/// Most engine tests want this so they can emit observations freely.
pub async fn open_site_core() -> (TempDir, Core) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = AppConfig::default_with_dir(temp_dir.path().to_path_buf());
    config.registration.zones = RegistrationPolicy::AutoRegister;
    config.save().unwrap();

    let core = Core::new_with_config(temp_dir.path().to_path_buf())
        .await
        .unwrap();
    (temp_dir, core)
}

/// A core with the default policy: devices auto-register, zones must be
/// provisioned by an operator first.
pub async fn provisioned_site_core() -> (TempDir, Core) {
    let temp_dir = TempDir::new().unwrap();
    let core = Core::new_with_config(temp_dir.path().to_path_buf())
        .await
        .unwrap();
    (temp_dir, core)
}

/// A fixed instant `minute` minutes into a reference hour, so tests can
/// reason about ordering and durations in whole minutes.
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 12, 8, minute, 0).unwrap()
}

pub fn obs(site: &str, device: &str, zone: &str, minute: u32) -> Observation {
    Observation {
        site_id: site.to_string(),
        device_id: device.to_string(),
        zone_id: zone.to_string(),
        timestamp: at(minute),
    }
}
