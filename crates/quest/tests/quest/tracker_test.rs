use std::{sync::Arc, time::Duration};

use quest::{
    domain::{LocationTracker, TrackerEvent, TrackingError},
    LocationTrack, ReplayLocationProvider, TrackPoint, WatchOptions,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::helpers::{main_stage_quest, north_of, setup_static_logger, STAGE};

fn every_sample() -> WatchOptions {
    WatchOptions {
        min_interval: Duration::ZERO,
        min_displacement_meters: 0.0,
        ..Default::default()
    }
}

fn fix_north(meters: f64, offset_ms: u64) -> TrackPoint {
    let position = north_of(STAGE, meters);
    TrackPoint::fix(position.latitude, position.longitude, offset_ms)
}

async fn next_event(events: &mut mpsc::Receiver<TrackerEvent>) -> TrackerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for tracker event")
        .expect("tracker channel closed")
}

#[tokio::test]
async fn test_walk_towards_target() {
    setup_static_logger();
    let track = LocationTrack::new(vec![
        fix_north(400.0, 0),
        fix_north(250.0, 1_000),
        fix_north(120.0, 2_000),
        fix_north(60.0, 3_000),
    ]);
    let provider = Arc::new(ReplayLocationProvider::new(track).with_speedup(1_000));
    let (mut tracker, mut events) = LocationTracker::new(provider, every_sample());

    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();
    assert!(tracker.is_tracking());
    assert!(tracker.permission_granted().await);

    let mut distances = Vec::new();
    loop {
        match next_event(&mut events).await {
            TrackerEvent::Update(update) => distances.push((update.distance_meters, update.in_range)),
            TrackerEvent::Error(e) => panic!("unexpected tracking error: {}", e),
            TrackerEvent::StreamEnded => break,
        }
    }

    assert_eq!(distances.len(), 4);
    assert!(distances.windows(2).all(|w| w[1].0 < w[0].0));
    assert_eq!(
        distances.iter().map(|(_, in_range)| *in_range).collect::<Vec<_>>(),
        vec![false, false, false, true]
    );
    let last = tracker.last_update().await.unwrap();
    assert!(last.in_range);
    assert!((last.distance_meters - 60.0).abs() < 0.5);
}

#[tokio::test]
async fn test_thresholds_drop_close_samples() {
    setup_static_logger();
    // Three fixes a second apart that barely move, then a big jump
    let track = LocationTrack::new(vec![
        fix_north(300.0, 0),
        fix_north(299.0, 1_000),
        fix_north(298.0, 2_000),
        fix_north(200.0, 3_000),
    ]);
    let provider = Arc::new(ReplayLocationProvider::new(track).with_speedup(1_000));
    let (mut tracker, mut events) = LocationTracker::new(provider, WatchOptions::default());
    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();

    let mut updates = 0;
    loop {
        match next_event(&mut events).await {
            TrackerEvent::Update(_) => updates += 1,
            TrackerEvent::Error(e) => panic!("unexpected tracking error: {}", e),
            TrackerEvent::StreamEnded => break,
        }
    }
    assert_eq!(updates, 2);
}

#[tokio::test]
async fn test_permission_denied() {
    setup_static_logger();
    let track = LocationTrack {
        permission_granted: false,
        points: vec![fix_north(10.0, 0)],
    };
    let provider = Arc::new(ReplayLocationProvider::new(track));
    let (mut tracker, mut events) = LocationTracker::new(provider, every_sample());

    let err = tracker
        .start(&main_stage_quest(Uuid::now_v7()))
        .await
        .unwrap_err();
    assert_eq!(err, TrackingError::PermissionDenied);
    assert!(!tracker.is_tracking());
    assert!(!tracker.permission_granted().await);
    assert_eq!(tracker.last_error().await, Some(TrackingError::PermissionDenied));
    assert_eq!(
        next_event(&mut events).await,
        TrackerEvent::Error(TrackingError::PermissionDenied)
    );
}

#[tokio::test]
async fn test_transient_error_is_cleared_by_next_fix() {
    setup_static_logger();
    let track = LocationTrack::new(vec![
        fix_north(300.0, 0),
        TrackPoint::error("GPS signal lost", 1_000),
        fix_north(90.0, 2_000),
    ]);
    let provider = Arc::new(ReplayLocationProvider::new(track).with_speedup(1_000));
    let (mut tracker, mut events) = LocationTracker::new(provider, every_sample());
    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();

    assert!(matches!(next_event(&mut events).await, TrackerEvent::Update(_)));
    assert!(tracker.last_error().await.is_none());
    let TrackerEvent::Error(TrackingError::LocationUnavailable(message)) =
        next_event(&mut events).await
    else {
        panic!("expected a location error");
    };
    assert!(message.contains("GPS signal lost"));

    let TrackerEvent::Update(update) = next_event(&mut events).await else {
        panic!("expected tracking to resume");
    };
    assert!(update.in_range);
    assert_eq!(next_event(&mut events).await, TrackerEvent::StreamEnded);
    assert!(tracker.last_error().await.is_none());
    assert!(tracker.permission_granted().await);
}

#[tokio::test]
async fn test_stop_ends_delivery() {
    setup_static_logger();
    let track = LocationTrack::new(vec![
        fix_north(300.0, 0),
        fix_north(200.0, 60_000),
        fix_north(100.0, 120_000),
    ]);
    let provider = Arc::new(ReplayLocationProvider::new(track));
    let (mut tracker, mut events) = LocationTracker::new(provider, every_sample());
    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();

    assert!(matches!(next_event(&mut events).await, TrackerEvent::Update(_)));
    tracker.stop().await;
    assert!(!tracker.is_tracking());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_refresh_reads_last_known_position() {
    setup_static_logger();
    let track = LocationTrack::new(vec![fix_north(500.0, 0), fix_north(50.0, 1_000)]);
    let provider = Arc::new(ReplayLocationProvider::new(track).with_speedup(1_000));
    let (mut tracker, mut events) = LocationTracker::new(provider, every_sample());
    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();

    while next_event(&mut events).await != TrackerEvent::StreamEnded {}

    let update = tracker.refresh().await.unwrap();
    assert!(update.in_range);
    assert!((update.distance_meters - 50.0).abs() < 0.5);
}

#[tokio::test]
async fn test_refresh_after_stop_is_not_tracking() {
    setup_static_logger();
    let track = LocationTrack::new(vec![fix_north(50.0, 0)]);
    let provider = Arc::new(ReplayLocationProvider::new(track).with_speedup(1_000));
    let (mut tracker, mut events) = LocationTracker::new(provider, every_sample());
    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();
    while next_event(&mut events).await != TrackerEvent::StreamEnded {}

    tracker.stop().await;
    assert_eq!(tracker.refresh().await, Err(TrackingError::NotTracking));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_restart_while_events_pile_up() {
    setup_static_logger();
    let points = (0..200u64)
        .map(|i| fix_north(1_000.0 - i as f64, i * 1_000))
        .collect();
    let provider = Arc::new(ReplayLocationProvider::new(LocationTrack::new(points)).with_speedup(1_000));
    let (mut tracker, _events) = LocationTracker::new(provider, every_sample());
    tracker.start(&main_stage_quest(Uuid::now_v7())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // start stops the previous subscription first
    tokio::time::timeout(
        Duration::from_secs(3),
        tracker.start(&main_stage_quest(Uuid::now_v7())),
    )
    .await
    .expect("restart blocked on an undrained events channel")
    .unwrap();
    tokio::time::timeout(Duration::from_secs(3), tracker.stop())
        .await
        .expect("stop blocked on an undrained events channel");
}
