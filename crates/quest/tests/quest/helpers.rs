use std::{
    env, fs,
    sync::{Arc, Once},
};

use async_trait::async_trait;
use mockall::mock;
use quest::{
    domain::{LocalCompletionStore, LocationUpdate, ParticipantContext},
    DBConnection, DatabasePoolConfig, MemoryKeyValueStore, PhotoVerifier, SqliteKeyValueStore,
    VerificationRequest, VerifierError,
};
use quest_core::{
    Coordinate, EventContext, LocationSample, Quest, QuestType, VerificationResult,
};
use time::OffsetDateTime;
use uuid::Uuid;

mock! {
    #[derive(Send, Sync)]
    pub VerifierClient { }

    #[async_trait]
    impl PhotoVerifier for VerifierClient {
        async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, VerifierError>;
    }
}

static INIT_LOGGER: Once = Once::new();

pub fn setup_static_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Meters per degree of latitude on the sphere used by the distance math
pub const METERS_PER_DEGREE: f64 = 111_194.93;

pub const STAGE: Coordinate = Coordinate {
    latitude: 37.7749,
    longitude: -122.4194,
};

pub fn main_stage_quest(event_id: Uuid) -> Quest {
    Quest {
        id: Uuid::now_v7(),
        event_id,
        title: String::from("Find the Main Stage"),
        description: String::from("Take a photo of the main stage setup"),
        quest_type: QuestType::Location,
        points_reward: 50,
        location_latitude: Some(STAGE.latitude),
        location_longitude: Some(STAGE.longitude),
        location_radius_meters: 100.0,
        required_photo: true,
        unlock_condition: None,
        time_limit_minutes: None,
        max_completions: None,
        is_active: true,
        order_index: 1,
        created_at: None,
    }
}

pub fn sponsor_booth_quest(event_id: Uuid) -> Quest {
    Quest {
        title: String::from("Visit the sponsor booth"),
        description: String::from("Stop by the booth near the entrance"),
        quest_type: QuestType::Sponsor,
        points_reward: 25,
        required_photo: false,
        location_radius_meters: 50.0,
        ..main_stage_quest(event_id)
    }
}

pub fn check_in_quest(event_id: Uuid) -> Quest {
    Quest {
        title: String::from("Check in"),
        description: String::from("Say hello at registration"),
        quest_type: QuestType::Social,
        points_reward: 10,
        location_latitude: None,
        location_longitude: None,
        required_photo: false,
        ..main_stage_quest(event_id)
    }
}

pub fn event_context() -> EventContext {
    EventContext {
        event_id: Uuid::now_v7(),
        event_name: String::from("Summer Fest"),
        participant_id: Uuid::now_v7(),
        event_start_date: None,
        event_end_date: None,
        joined_at: OffsetDateTime::now_utc(),
    }
}

pub fn participant(context: &EventContext) -> ParticipantContext {
    ParticipantContext::from(context)
}

pub fn memory_store() -> (Arc<LocalCompletionStore>, Arc<MemoryKeyValueStore>) {
    let kv = Arc::new(MemoryKeyValueStore::new());
    (Arc::new(LocalCompletionStore::new(kv.clone())), kv)
}

/// Fresh on-disk database under the system temp dir
pub async fn sqlite_store(test_name: &str) -> (Arc<LocalCompletionStore>, String) {
    let folder = test_folder(test_name);
    let db = DBConnection::new(&folder, "quest", DatabasePoolConfig::default())
        .await
        .expect("failed to open test database");
    let store = LocalCompletionStore::new(Arc::new(SqliteKeyValueStore::new(db)));
    (Arc::new(store), folder)
}

pub fn test_folder(test_name: &str) -> String {
    let folder = env::temp_dir()
        .join(format!("quest_{}_{}", test_name, Uuid::now_v7()))
        .to_string_lossy()
        .to_string();
    fs::create_dir_all(&folder).expect("failed to create test folder");
    folder
}

pub fn cleanup(folder: &str) {
    let _ = fs::remove_dir_all(folder);
}

/// A point `meters` due north of `origin`
pub fn north_of(origin: Coordinate, meters: f64) -> Coordinate {
    Coordinate::new(origin.latitude + meters / METERS_PER_DEGREE, origin.longitude)
}

pub fn update_towards(quest: &Quest, position: Coordinate) -> LocationUpdate {
    let target = quest.target().expect("quest has a location");
    LocationUpdate::from_sample(
        LocationSample::new(position.latitude, position.longitude),
        target,
        quest.location_radius_meters,
    )
}
