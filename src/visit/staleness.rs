//! Read-time staleness judgment
//!
//! A device that stops reporting does not get its open visit closed: the
//! audit log records what was observed, not what a timeout guessed. Readers
//! instead judge the open visit stale at query time. A device that resumes
//! reporting continues the same visit and the judgment reverts on its own.

use crate::infrastructure::database::entities;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Whether an open visit should display as inactive.
///
/// Pure and non-destructive: closed visits are never stale, and no stored row
/// changes because of this judgment.
pub fn is_stale(
    end_time: Option<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
    now: DateTime<Utc>,
    threshold_minutes: i64,
) -> bool {
    end_time.is_none() && now - last_seen > Duration::minutes(threshold_minutes)
}

/// One visit row as downstream readers see it, with the staleness judgment
/// applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitView {
    pub id: i32,
    pub zone_id: String,
    pub zone_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Stored end time, or `last_seen` when the open visit is judged stale
    pub effective_end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub is_open: bool,
    pub is_active: bool,
}

impl VisitView {
    pub fn project(
        visit: &entities::visit::Model,
        zone_name: &str,
        last_seen: DateTime<Utc>,
        now: DateTime<Utc>,
        threshold_minutes: i64,
    ) -> Self {
        let is_open = visit.end_time.is_none();
        let stale = is_stale(visit.end_time, last_seen, now, threshold_minutes);
        let effective_end_time = visit.end_time.or(if stale { Some(last_seen) } else { None });
        let duration_seconds =
            effective_end_time.map(|end| (end - visit.start_time).num_seconds().max(0));

        Self {
            id: visit.id,
            zone_id: visit.zone_id.clone(),
            zone_name: zone_name.to_string(),
            start_time: visit.start_time,
            end_time: visit.end_time,
            effective_end_time,
            duration_seconds,
            is_open,
            is_active: is_open && !stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
    }

    fn visit(start: u32, end: Option<u32>) -> entities::visit::Model {
        entities::visit::Model {
            id: 1,
            site_id: "s1".to_string(),
            device_id: "d1".to_string(),
            zone_id: "a".to_string(),
            start_time: t(start),
            end_time: end.map(t),
            duration_seconds: end.map(|e| ((e - start) * 60) as i64),
        }
    }

    #[test]
    fn open_visit_past_threshold_is_stale() {
        assert!(is_stale(None, t(0), t(31), 30));
    }

    #[test]
    fn open_visit_at_threshold_is_not_stale() {
        assert!(!is_stale(None, t(0), t(30), 30));
    }

    #[test]
    fn closed_visit_is_never_stale() {
        assert!(!is_stale(Some(t(5)), t(0), t(59), 30));
    }

    #[test]
    fn stale_view_shows_last_seen_as_effective_end() {
        let view = VisitView::project(&visit(0, None), "Zone A", t(10), t(45), 30);
        assert!(view.is_open);
        assert!(!view.is_active);
        assert_eq!(view.end_time, None);
        assert_eq!(view.effective_end_time, Some(t(10)));
        assert_eq!(view.duration_seconds, Some(600));
    }

    #[test]
    fn active_open_view_has_no_effective_end() {
        let view = VisitView::project(&visit(0, None), "Zone A", t(10), t(20), 30);
        assert!(view.is_open);
        assert!(view.is_active);
        assert_eq!(view.effective_end_time, None);
        assert_eq!(view.duration_seconds, None);
    }

    #[test]
    fn closed_view_uses_stored_end() {
        let view = VisitView::project(&visit(0, Some(10)), "Zone A", t(10), t(59), 30);
        assert!(!view.is_open);
        assert!(!view.is_active);
        assert_eq!(view.effective_end_time, Some(t(10)));
        assert_eq!(view.duration_seconds, Some(600));
    }
}
