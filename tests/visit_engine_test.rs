//! Visit engine integration tests over a real store

mod helpers;

use helpers::{at, obs, open_site_core};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use zonetrack_core::infrastructure::database::entities;
use zonetrack_core::registry;
use zonetrack_core::visit::ApplyOutcome;

#[tokio::test]
async fn opens_keeps_alive_and_transitions() {
    let (_dir, core) = open_site_core().await;

    let outcome = core.visits.apply(&obs("s1", "badge-1", "dock-a", 0)).await.unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Opened {
            zone_id: "dock-a".to_string()
        }
    );

    let outcome = core.visits.apply(&obs("s1", "badge-1", "dock-a", 5)).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::KeptAlive);

    let outcome = core.visits.apply(&obs("s1", "badge-1", "dock-b", 10)).await.unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Transitioned {
            from_zone: "dock-a".to_string(),
            to_zone: "dock-b".to_string(),
            closed_duration_seconds: 600,
        }
    );

    let visits = entities::Visit::find()
        .filter(entities::visit::Column::SiteId.eq("s1"))
        .filter(entities::visit::Column::DeviceId.eq("badge-1"))
        .all(core.db.conn())
        .await
        .unwrap();
    assert_eq!(visits.len(), 2);

    let closed = visits.iter().find(|v| v.zone_id == "dock-a").unwrap();
    assert_eq!(closed.start_time, at(0));
    assert_eq!(closed.end_time, Some(at(10)));
    assert_eq!(closed.duration_seconds, Some(600));

    let open = visits.iter().find(|v| v.zone_id == "dock-b").unwrap();
    assert_eq!(open.start_time, at(10));
    assert!(open.end_time.is_none());
    assert!(open.duration_seconds.is_none());

    let device = registry::find_device(core.db.conn(), "s1", "badge-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device.last_seen, at(10));
}

#[tokio::test]
async fn duplicate_delivery_changes_nothing() {
    let (_dir, core) = open_site_core().await;

    core.visits.apply(&obs("s1", "badge-2", "dock-a", 3)).await.unwrap();
    let outcome = core.visits.apply(&obs("s1", "badge-2", "dock-a", 3)).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::KeptAlive);

    let count = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-2"))
        .all(core.db.conn())
        .await
        .unwrap()
        .len();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn out_of_order_observation_is_discarded() {
    let (_dir, core) = open_site_core().await;

    core.visits.apply(&obs("s1", "badge-3", "dock-a", 0)).await.unwrap();
    core.visits.apply(&obs("s1", "badge-3", "dock-b", 10)).await.unwrap();

    // A late report from a third zone, older than the open visit's start
    let outcome = core.visits.apply(&obs("s1", "badge-3", "dock-c", 7)).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::DiscardedOutOfOrder);

    let visits = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-3"))
        .all(core.db.conn())
        .await
        .unwrap();
    assert_eq!(visits.len(), 2);
    assert!(visits.iter().all(|v| v.zone_id != "dock-c"));

    let open = visits.iter().find(|v| v.end_time.is_none()).unwrap();
    assert_eq!(open.zone_id, "dock-b");
    assert_eq!(open.start_time, at(10));

    // Discards mutate nothing, last_seen included
    let device = registry::find_device(core.db.conn(), "s1", "badge-3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device.last_seen, at(10));
}

#[tokio::test]
async fn closed_visits_never_reopen() {
    let (_dir, core) = open_site_core().await;

    core.visits.apply(&obs("s1", "badge-4", "dock-a", 0)).await.unwrap();
    core.visits.apply(&obs("s1", "badge-4", "dock-b", 10)).await.unwrap();

    // Late report for the already-closed dock-a visit window
    let outcome = core.visits.apply(&obs("s1", "badge-4", "dock-a", 4)).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::DiscardedOutOfOrder);

    let closed = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-4"))
        .filter(entities::visit::Column::ZoneId.eq("dock-a"))
        .one(core.db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.end_time, Some(at(10)));
    assert_eq!(closed.duration_seconds, Some(600));
}

#[tokio::test]
async fn devices_are_isolated_per_site() {
    let (_dir, core) = open_site_core().await;

    core.visits.apply(&obs("s1", "badge-5", "dock-a", 0)).await.unwrap();
    let outcome = core.visits.apply(&obs("s2", "badge-5", "dock-b", 5)).await.unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Opened {
            zone_id: "dock-b".to_string()
        }
    );

    // Same device id at two sites keeps two independent open visits
    let open = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-5"))
        .filter(entities::visit::Column::EndTime.is_null())
        .all(core.db.conn())
        .await
        .unwrap();
    assert_eq!(open.len(), 2);
}
