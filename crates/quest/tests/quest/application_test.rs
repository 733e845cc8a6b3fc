use quest::{
    domain::CapturedPhoto, Application, Command, DBSettings, LocationTrack, Settings,
    TrackerSettings, TrackPoint, VerifierSettings,
};
use quest_core::QuestStatusKind;
use uuid::Uuid;

use crate::helpers::{
    cleanup, event_context, main_stage_quest, north_of, setup_static_logger, sponsor_booth_quest,
    test_folder, STAGE,
};

fn test_settings(folder: &str, reject_reason: Option<&str>) -> Settings {
    Settings {
        db_settings: DBSettings {
            data_folder: folder.to_string(),
            ..Default::default()
        },
        verifier_settings: VerifierSettings {
            mock_enabled: true,
            mock_reject_reason: reject_reason.map(String::from),
            mock_delay_ms: None,
            ..Default::default()
        },
        tracker_settings: TrackerSettings {
            min_interval_ms: 0,
            min_displacement_meters: 0.0,
            replay_speedup: 1_000,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn approach_track() -> LocationTrack {
    let points = [(300.0, 0), (150.0, 5_000), (40.0, 10_000), (20.0, 15_000)]
        .into_iter()
        .map(|(meters, offset_ms)| {
            let position = north_of(STAGE, meters);
            TrackPoint::fix(position.latitude, position.longitude, offset_ms)
        })
        .collect();
    LocationTrack::new(points)
}

fn photo() -> CapturedPhoto {
    CapturedPhoto::new("file:///photos/stage.jpg", vec![1u8, 2, 3, 4])
}

#[tokio::test]
async fn test_run_requires_joined_event() {
    setup_static_logger();
    let folder = test_folder("no_event");
    let app = Application::build(test_settings(&folder, None)).await.unwrap();

    let err = app
        .run_quest(main_stage_quest(Uuid::now_v7()), approach_track(), Some(photo()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no event joined"));

    cleanup(&folder);
}

#[tokio::test]
async fn test_run_photo_quest_to_completion() {
    setup_static_logger();
    let folder = test_folder("photo_run");
    let app = Application::build(test_settings(&folder, None)).await.unwrap();
    let context = event_context();
    app.join(context.clone()).await.unwrap();

    let quest = main_stage_quest(context.event_id);
    let progress = app
        .run_quest(quest.clone(), approach_track(), Some(photo()))
        .await
        .unwrap();
    assert_eq!(progress.status, QuestStatusKind::Completed);
    assert_eq!(progress.progress_percentage, 100.0);

    let completion = progress.completion.unwrap();
    assert_eq!(completion.participant_id, context.participant_id);
    let data = completion.completion_data.unwrap();
    // Captured at the first in-range fix
    assert!((data.distance_meters.unwrap() - 40.0).abs() < 0.5);

    let store = app.store();
    assert_eq!(store.get_points().await.unwrap(), 50);

    // Running it again finds the stored record straight away
    let again = app
        .run_quest(quest, approach_track(), Some(photo()))
        .await
        .unwrap();
    assert_eq!(again.status, QuestStatusKind::Completed);
    assert_eq!(store.get_completions().await.unwrap().len(), 1);

    cleanup(&folder);
}

#[tokio::test]
async fn test_run_with_rejected_photo() {
    setup_static_logger();
    let folder = test_folder("rejected_run");
    let app = Application::build(test_settings(&folder, Some("No stage in view")))
        .await
        .unwrap();
    let context = event_context();
    app.join(context.clone()).await.unwrap();

    let progress = app
        .run_quest(main_stage_quest(context.event_id), approach_track(), Some(photo()))
        .await
        .unwrap();
    assert_eq!(progress.status, QuestStatusKind::InRange);
    assert_eq!(progress.progress_percentage, 75.0);
    assert!(progress.completion.is_none());
    assert_eq!(app.store().get_points().await.unwrap(), 0);

    cleanup(&folder);
}

#[tokio::test]
async fn test_run_location_only_quest() {
    setup_static_logger();
    let folder = test_folder("booth_run");
    let app = Application::build(test_settings(&folder, None)).await.unwrap();
    let context = event_context();
    app.join(context.clone()).await.unwrap();

    let progress = app
        .run_quest(sponsor_booth_quest(context.event_id), approach_track(), None)
        .await
        .unwrap();
    assert_eq!(progress.status, QuestStatusKind::Completed);
    let completion = progress.completion.unwrap();
    assert!(completion.verified_by.is_none());
    assert_eq!(app.store().get_points().await.unwrap(), 25);

    cleanup(&folder);
}

#[tokio::test]
async fn test_join_status_and_leave_commands() {
    setup_static_logger();
    let folder = test_folder("commands");
    let app = Application::build(test_settings(&folder, None)).await.unwrap();
    let event_id = Uuid::now_v7();

    app.run(Command::Join {
        event_id,
        event_name: String::from("Summer Fest"),
        participant_id: Uuid::now_v7(),
        starts_at: Some(String::from("2026-07-01T10:00:00Z")),
        ends_at: None,
    })
    .await
    .unwrap();

    let context = app.store().event_context().await.unwrap().unwrap();
    assert_eq!(context.event_id, event_id);
    assert_eq!(context.event_start_date.unwrap().year(), 2026);
    assert!(context.event_end_date.is_none());

    app.run(Command::Status).await.unwrap();
    app.run(Command::Leave).await.unwrap();
    assert!(app.store().event_context().await.unwrap().is_none());

    let err = app
        .run(Command::Join {
            event_id,
            event_name: String::from("Summer Fest"),
            participant_id: Uuid::now_v7(),
            starts_at: Some(String::from("next tuesday")),
            ends_at: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid RFC 3339 date"));

    cleanup(&folder);
}

#[tokio::test]
async fn test_run_finishes_with_route_left_over() {
    setup_static_logger();
    let folder = test_folder("long_route");
    let app = Application::build(test_settings(&folder, None)).await.unwrap();
    let context = event_context();
    app.join(context.clone()).await.unwrap();

    // In range from the second fix, then many more fixes nobody reads
    let points = (0..150u64)
        .map(|i| {
            let position = north_of(STAGE, if i == 0 { 300.0 } else { 10.0 + (i % 5) as f64 });
            TrackPoint::fix(position.latitude, position.longitude, i * 1_000)
        })
        .collect();

    let progress = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        app.run_quest(sponsor_booth_quest(context.event_id), LocationTrack::new(points), None),
    )
    .await
    .expect("run did not return after the quest completed")
    .unwrap();
    assert_eq!(progress.status, QuestStatusKind::Completed);

    cleanup(&folder);
}

#[tokio::test]
async fn test_commands_work_without_verifier_credentials() {
    setup_static_logger();
    let folder = test_folder("no_credentials");
    let mut settings = test_settings(&folder, None);
    settings.verifier_settings = VerifierSettings {
        api_key_file: format!("{}/missing_api_key", folder),
        ..Default::default()
    };
    assert!(!settings.verifier_settings.mock_enabled);

    let app = Application::build(settings).await.unwrap();
    let context = event_context();
    app.join(context.clone()).await.unwrap();
    app.run(Command::Status).await.unwrap();

    // Only running a quest needs the verifier
    let err = app
        .run_quest(sponsor_booth_quest(context.event_id), approach_track(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("api key file not found"));

    app.run(Command::Leave).await.unwrap();
    assert!(app.store().event_context().await.unwrap().is_none());

    cleanup(&folder);
}
