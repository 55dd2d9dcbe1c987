//! Observation normalization
//!
//! Turns a raw inbound message (plus its routing key) into a canonical
//! [`Observation`]. Producers are inconsistent about field naming, so both
//! camel and snake case identifiers are accepted; payload fields win over
//! routing-key-derived values. Normalization failures are terminal for the
//! message: redelivery cannot fix a malformed payload.

use crate::domain::Observation;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Normalization errors
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// Unparseable payload or missing required identifiers. Never retried.
    #[error("Malformed observation: {0}")]
    Malformed(String),

    /// No site id in payload or routing key, and no default site configured
    #[error("No site id resolved and no default site configured")]
    MissingSite,
}

/// Raw payload shape, tolerant of both naming conventions
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default, alias = "deviceId")]
    device_id: Option<String>,
    #[serde(default, alias = "zoneId")]
    zone_id: Option<String>,
    #[serde(default, alias = "siteId")]
    site_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Normalize one raw message into an [`Observation`].
///
/// Site resolution order: payload field, then routing key segment, then the
/// configured default site. `received_at` is used as the event time when the
/// payload carries no timestamp.
pub fn normalize(
    routing_key: &str,
    payload: &[u8],
    default_site: Option<&str>,
    received_at: DateTime<Utc>,
) -> Result<Observation, NormalizeError> {
    let raw: RawPayload = serde_json::from_slice(payload)
        .map_err(|e| NormalizeError::Malformed(format!("invalid JSON payload: {}", e)))?;

    let (key_site, key_device) = parse_routing_key(routing_key);

    let site_id = non_empty(raw.site_id)
        .or(key_site)
        .or_else(|| default_site.map(str::to_string))
        .ok_or(NormalizeError::MissingSite)?;

    let device_id = non_empty(raw.device_id)
        .or(key_device)
        .ok_or_else(|| NormalizeError::Malformed("missing device id".to_string()))?;

    let zone_id = non_empty(raw.zone_id)
        .ok_or_else(|| NormalizeError::Malformed("missing zone id".to_string()))?;

    let timestamp = match raw.timestamp {
        Some(ts) => DateTime::parse_from_rfc3339(&ts)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| NormalizeError::Malformed(format!("invalid timestamp '{}': {}", ts, e)))?,
        None => received_at,
    };

    Ok(Observation {
        site_id,
        device_id,
        zone_id,
        timestamp,
    })
}

/// Extract `(site, device)` from a `site/<site>/device/<device>/location`
/// routing key. Anything else yields nothing; the payload may still carry the
/// identifiers.
fn parse_routing_key(routing_key: &str) -> (Option<String>, Option<String>) {
    let segments: Vec<&str> = routing_key.split('/').collect();
    match segments.as_slice() {
        ["site", site, "device", device, "location"]
            if !site.is_empty() && !device.is_empty() =>
        {
            (Some(site.to_string()), Some(device.to_string()))
        }
        _ => (None, None),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
