use std::sync::Arc;

use quest::{
    domain::{LocalCompletionStore, NewCompletion, StorageKeys},
    DBConnection, DatabasePoolConfig, KeyValueStore, KvError, QuestError, SqliteKeyValueStore,
};
use quest_core::CompletionData;
use uuid::Uuid;

use crate::helpers::{cleanup, event_context, memory_store, setup_static_logger, sqlite_store};

fn new_completion(participant_id: Uuid, points: u32) -> NewCompletion {
    NewCompletion {
        participant_id,
        completion_data: Some(CompletionData {
            distance_meters: Some(12.5),
            ..Default::default()
        }),
        points_earned: points,
        verified: true,
        verified_by: None,
    }
}

#[tokio::test]
async fn test_completions_and_points_survive_reopen() {
    setup_static_logger();
    let (store, folder) = sqlite_store("reopen").await;
    let context = event_context();
    let (first_quest, second_quest) = (Uuid::now_v7(), Uuid::now_v7());

    store.save_event_context(&context).await.unwrap();
    store
        .save_completion(first_quest, new_completion(context.participant_id, 50))
        .await
        .unwrap();
    store
        .save_completion(second_quest, new_completion(context.participant_id, 25))
        .await
        .unwrap();
    drop(store);

    let db = DBConnection::new(&folder, "quest", DatabasePoolConfig::default())
        .await
        .unwrap();
    let reopened = LocalCompletionStore::new(Arc::new(SqliteKeyValueStore::new(db)));

    assert_eq!(reopened.event_context().await.unwrap(), Some(context));
    assert_eq!(reopened.get_points().await.unwrap(), 75);
    let completions = reopened.get_completions().await.unwrap();
    assert_eq!(completions.len(), 2);
    assert_eq!(completions[0].quest_id, first_quest);
    assert_eq!(
        completions[0].completion_data.as_ref().unwrap().distance_meters,
        Some(12.5)
    );
    assert!(reopened.is_completed(second_quest).await.unwrap());

    cleanup(&folder);
}

#[tokio::test]
async fn test_second_save_returns_existing_record() {
    setup_static_logger();
    let (store, folder) = sqlite_store("idempotent").await;
    let participant_id = Uuid::now_v7();
    let quest_id = Uuid::now_v7();

    let first = store
        .save_completion(quest_id, new_completion(participant_id, 50))
        .await
        .unwrap();
    assert!(first.is_new());

    let second = store
        .save_completion(quest_id, new_completion(participant_id, 999))
        .await
        .unwrap();
    assert!(!second.is_new());
    assert_eq!(second.completion(), first.completion());
    assert_eq!(store.get_points().await.unwrap(), 50);

    cleanup(&folder);
}

#[tokio::test]
async fn test_parallel_saves_of_one_quest() {
    setup_static_logger();
    let (store, _) = memory_store();
    let participant_id = Uuid::now_v7();
    let quest_id = Uuid::now_v7();

    let (a, b) = futures::future::join(
        store.save_completion(quest_id, new_completion(participant_id, 40)),
        store.save_completion(quest_id, new_completion(participant_id, 40)),
    )
    .await;
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_new() != b.is_new());
    assert_eq!(a.completion().id, b.completion().id);
    assert_eq!(store.get_completions().await.unwrap().len(), 1);
    assert_eq!(store.get_points().await.unwrap(), 40);
}

#[tokio::test]
async fn test_clear_all_wipes_everything() {
    setup_static_logger();
    let (store, folder) = sqlite_store("clear").await;
    let context = event_context();
    store.save_event_context(&context).await.unwrap();
    store
        .save_completion(Uuid::now_v7(), new_completion(context.participant_id, 10))
        .await
        .unwrap();

    store.clear_all().await.unwrap();

    assert!(store.event_context().await.unwrap().is_none());
    assert!(store.get_completions().await.unwrap().is_empty());
    assert_eq!(store.get_points().await.unwrap(), 0);

    cleanup(&folder);
}

#[tokio::test]
async fn test_corrupt_completions_are_reported() {
    setup_static_logger();
    let (store, kv) = memory_store();
    kv.set(StorageKeys::QUEST_COMPLETIONS, String::from("{not json"))
        .await
        .unwrap();

    let err = store.get_completions().await.unwrap_err();
    assert!(matches!(
        err,
        QuestError::Persistence(KvError::Corrupt { ref key, .. }) if key == StorageKeys::QUEST_COMPLETIONS
    ));

    // A corrupt list must not be overwritten by a fresh save
    assert!(store
        .save_completion(Uuid::now_v7(), new_completion(Uuid::now_v7(), 5))
        .await
        .is_err());
    assert_eq!(
        kv.get(StorageKeys::QUEST_COMPLETIONS).await.unwrap().as_deref(),
        Some("{not json")
    );
}

#[tokio::test]
async fn test_unavailable_storage_surfaces_error() {
    setup_static_logger();
    let (store, kv) = memory_store();
    kv.set_unavailable(true);

    let err = store
        .save_completion(Uuid::now_v7(), new_completion(Uuid::now_v7(), 5))
        .await
        .unwrap_err();
    assert!(matches!(err, QuestError::Persistence(KvError::Unavailable(_))));

    kv.set_unavailable(false);
    assert!(store.get_completions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replayed_save_heals_stale_points() {
    setup_static_logger();
    let (store, folder) = sqlite_store("stale_points").await;
    let participant_id = Uuid::now_v7();
    let quest_id = Uuid::now_v7();
    store
        .save_completion(quest_id, new_completion(participant_id, 50))
        .await
        .unwrap();

    // Leave the list recorded but the total behind it
    let db = DBConnection::new(&folder, "quest", DatabasePoolConfig::default())
        .await
        .unwrap();
    let kv = SqliteKeyValueStore::new(db);
    kv.set(StorageKeys::USER_POINTS, String::from("0"))
        .await
        .unwrap();
    assert_eq!(store.get_points().await.unwrap(), 0);

    let outcome = store
        .save_completion(quest_id, new_completion(participant_id, 50))
        .await
        .unwrap();
    assert!(!outcome.is_new());
    assert_eq!(store.get_points().await.unwrap(), 50);
    assert_eq!(
        kv.get(StorageKeys::USER_POINTS).await.unwrap().as_deref(),
        Some("50")
    );

    cleanup(&folder);
}
