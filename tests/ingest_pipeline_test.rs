//! End-to-end ingest: channel source, competing workers, acknowledgments

mod helpers;

use helpers::{at, open_site_core, provisioned_site_core};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use zonetrack_core::infrastructure::database::entities;
use zonetrack_core::registry::{self, ZoneUpsert};
use zonetrack_core::services::ingest::{ChannelSource, Delivery, Resolution};

fn location_payload(zone: &str, minute: u32) -> Vec<u8> {
    serde_json::json!({
        "zone_id": zone,
        "timestamp": at(minute).to_rfc3339(),
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn deliveries_are_acked_after_commit() {
    let (_dir, core) = open_site_core().await;
    let (tx, source) = ChannelSource::new(16);
    let service = core.start_ingest(Arc::new(source)).await.unwrap();

    // Await each ack before sending the next so the workers see the reports
    // in event-time order
    let (first, first_receipt) = Delivery::new(
        "site/s1/device/badge-1/location",
        location_payload("dock-a", 0),
    );
    tx.send(first).await.unwrap();
    assert_eq!(first_receipt.await.unwrap(), Resolution::Ack);

    let (second, second_receipt) = Delivery::new(
        "site/s1/device/badge-1/location",
        location_payload("dock-b", 10),
    );
    tx.send(second).await.unwrap();
    assert_eq!(second_receipt.await.unwrap(), Resolution::Ack);

    drop(tx);
    service.join().await;
    assert_eq!(service.stats().applied.load(Ordering::Relaxed), 2);

    let visits = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-1"))
        .all(core.db.conn())
        .await
        .unwrap();
    assert_eq!(visits.len(), 2);
    assert_eq!(
        visits.iter().filter(|v| v.end_time.is_none()).count(),
        1,
        "exactly one open visit after the zone change"
    );

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn redelivered_message_is_acked_without_new_rows() {
    let (_dir, core) = open_site_core().await;
    let (tx, source) = ChannelSource::new(16);
    let service = core.start_ingest(Arc::new(source)).await.unwrap();

    for _ in 0..2 {
        let (delivery, receipt) = Delivery::new(
            "site/s1/device/badge-2/location",
            location_payload("dock-a", 0),
        );
        tx.send(delivery).await.unwrap();
        assert_eq!(receipt.await.unwrap(), Resolution::Ack);
    }
    drop(tx);
    service.join().await;

    let visits = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-2"))
        .all(core.db.conn())
        .await
        .unwrap();
    assert_eq!(visits.len(), 1);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered() {
    let (_dir, core) = open_site_core().await;
    let (tx, source) = ChannelSource::new(16);
    let service = core.start_ingest(Arc::new(source)).await.unwrap();

    let (delivery, receipt) = Delivery::new(
        "site/s1/device/badge-3/location",
        b"this is not json".to_vec(),
    );
    tx.send(delivery).await.unwrap();
    assert_eq!(receipt.await.unwrap(), Resolution::Reject);

    let (delivery, receipt) = Delivery::new(
        "site/s1/device/badge-3/location",
        br#"{"timestamp":"2025-06-12T08:00:00Z"}"#.to_vec(),
    );
    tx.send(delivery).await.unwrap();
    assert_eq!(receipt.await.unwrap(), Resolution::Reject);

    drop(tx);
    service.join().await;
    assert_eq!(service.stats().rejected_malformed.load(Ordering::Relaxed), 2);
    assert_eq!(service.stats().applied.load(Ordering::Relaxed), 0);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_zone_is_rejected_under_provisioned_policy() {
    let (_dir, core) = provisioned_site_core().await;

    registry::upsert_zone(
        core.db.conn(),
        ZoneUpsert {
            site_id: "s1".to_string(),
            zone_id: "dock-a".to_string(),
            zone_name: "Dock A".to_string(),
            x: Some(1.0),
            y: Some(2.0),
            z: None,
        },
    )
    .await
    .unwrap();

    let (tx, source) = ChannelSource::new(16);
    let service = core.start_ingest(Arc::new(source)).await.unwrap();

    let (delivery, receipt) = Delivery::new(
        "site/s1/device/badge-4/location",
        location_payload("dock-a", 0),
    );
    tx.send(delivery).await.unwrap();
    assert_eq!(receipt.await.unwrap(), Resolution::Ack);

    let (delivery, receipt) = Delivery::new(
        "site/s1/device/badge-4/location",
        location_payload("dock-unprovisioned", 5),
    );
    tx.send(delivery).await.unwrap();
    assert_eq!(receipt.await.unwrap(), Resolution::Reject);

    drop(tx);
    service.join().await;
    assert_eq!(
        service.stats().rejected_unknown_entity.load(Ordering::Relaxed),
        1
    );

    // The rejected report changed nothing: badge-4 is still in dock-a
    let open = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-4"))
        .filter(entities::visit::Column::EndTime.is_null())
        .one(core.db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.zone_id, "dock-a");

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn default_site_fills_in_for_bare_routing_keys() {
    let (_dir, core) = open_site_core().await;
    let (tx, source) = ChannelSource::new(16);
    let service = core.start_ingest(Arc::new(source)).await.unwrap();

    // No site anywhere in the message; config supplies site-001
    let payload = serde_json::json!({
        "device_id": "badge-5",
        "zone_id": "dock-a",
        "timestamp": at(0).to_rfc3339(),
    })
    .to_string()
    .into_bytes();
    let (delivery, receipt) = Delivery::new("locations", payload);
    tx.send(delivery).await.unwrap();
    assert_eq!(receipt.await.unwrap(), Resolution::Ack);

    drop(tx);
    service.join().await;

    let open = entities::Visit::find()
        .filter(entities::visit::Column::DeviceId.eq("badge-5"))
        .one(core.db.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.site_id, "site-001");

    core.shutdown().await.unwrap();
}
