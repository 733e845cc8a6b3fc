use std::sync::Arc;

use log::{debug, info, warn};
use quest_core::{CompletionData, EventContext, QuestCompletion};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::kv::{KeyValueStore, KvError},
};

pub struct StorageKeys;

impl StorageKeys {
    pub const EVENT_CONTEXT: &'static str = "eventContext";
    pub const QUEST_COMPLETIONS: &'static str = "questCompletions";
    pub const USER_POINTS: &'static str = "userPoints";
}

/// Payload of a completion before it is stamped with an id and time
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompletion {
    pub participant_id: Uuid,
    pub completion_data: Option<CompletionData>,
    pub points_earned: u32,
    pub verified: bool,
    pub verified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(QuestCompletion),
    /// The quest was already recorded, only a stale point total is rewritten
    AlreadyCompleted(QuestCompletion),
}

impl SaveOutcome {
    pub fn completion(&self) -> &QuestCompletion {
        match self {
            Self::Saved(c) | Self::AlreadyCompleted(c) => c,
        }
    }

    pub fn into_completion(self) -> QuestCompletion {
        match self {
            Self::Saved(c) | Self::AlreadyCompleted(c) => c,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Device-local record of completed quests and the running point total.
pub struct LocalCompletionStore {
    kv: Arc<dyn KeyValueStore>,
    // check-then-write on the completions list must not interleave
    write_lock: Mutex<()>,
}

impl LocalCompletionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get_completions(&self) -> Result<Vec<QuestCompletion>, Error> {
        self.read_json(StorageKeys::QUEST_COMPLETIONS)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn get_completion(&self, quest_id: Uuid) -> Result<Option<QuestCompletion>, Error> {
        let completions = self.get_completions().await?;
        Ok(completions.into_iter().find(|c| c.quest_id == quest_id))
    }

    pub async fn is_completed(&self, quest_id: Uuid) -> Result<bool, Error> {
        Ok(self.get_completion(quest_id).await?.is_some())
    }

    /// Record a completion unless the quest already has one. The point total is
    /// recomputed from the full list and written together with it.
    pub async fn save_completion(
        &self,
        quest_id: Uuid,
        completion: NewCompletion,
    ) -> Result<SaveOutcome, Error> {
        let _guard = self.write_lock.lock().await;

        let mut completions = self.get_completions().await?;
        if let Some(existing) = completions.iter().find(|c| c.quest_id == quest_id).cloned() {
            debug!("quest {} already completed", quest_id);
            if let Err(e) = self.repair_points(&completions).await {
                warn!("failed to repair point total: {}", e);
            }
            return Ok(SaveOutcome::AlreadyCompleted(existing));
        }

        let completion = QuestCompletion {
            id: Uuid::now_v7(),
            quest_id,
            participant_id: completion.participant_id,
            completion_data: completion.completion_data,
            points_earned: completion.points_earned,
            completed_at: OffsetDateTime::now_utc(),
            verified: completion.verified,
            verified_by: completion.verified_by,
        };
        completions.push(completion.clone());

        let total_points = total_points(&completions);

        self.kv
            .set_many(&[
                (
                    StorageKeys::QUEST_COMPLETIONS,
                    serde_json::to_string(&completions)?,
                ),
                (StorageKeys::USER_POINTS, total_points.to_string()),
            ])
            .await?;

        info!(
            "quest {} completed for {} points, total {}",
            quest_id, completion.points_earned, total_points
        );
        Ok(SaveOutcome::Saved(completion))
    }

    /// Rewrite the stored total when it no longer matches the completions list.
    async fn repair_points(&self, completions: &[QuestCompletion]) -> Result<(), Error> {
        let expected = total_points(completions);
        let stored = self.kv.get(StorageKeys::USER_POINTS).await?;
        let current = stored.as_deref().and_then(|v| v.trim().parse::<u64>().ok());
        if current != Some(expected) {
            warn!(
                "stored points {:?} disagree with completions, resetting to {}",
                stored, expected
            );
            self.kv
                .set(StorageKeys::USER_POINTS, expected.to_string())
                .await?;
        }
        Ok(())
    }

    pub async fn get_points(&self) -> Result<u64, Error> {
        match self.kv.get(StorageKeys::USER_POINTS).await? {
            None => Ok(0),
            Some(value) => value.trim().parse::<u64>().map_err(|e| {
                Error::Persistence(KvError::Corrupt {
                    key: StorageKeys::USER_POINTS.to_string(),
                    reason: e.to_string(),
                })
            }),
        }
    }

    pub async fn save_event_context(&self, context: &EventContext) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.write_json(StorageKeys::EVENT_CONTEXT, context).await
    }

    pub async fn event_context(&self) -> Result<Option<EventContext>, Error> {
        self.read_json(StorageKeys::EVENT_CONTEXT).await
    }

    /// Wipe the event context, completions and points together.
    pub async fn clear_all(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.kv
            .remove_many(&[
                StorageKeys::EVENT_CONTEXT,
                StorageKeys::QUEST_COMPLETIONS,
                StorageKeys::USER_POINTS,
            ])
            .await?;
        info!("cleared local quest data");
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            Error::Persistence(KvError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
    }

    async fn write_json<T: serde::Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, raw).await?;
        Ok(())
    }
}

fn total_points(completions: &[QuestCompletion]) -> u64 {
    completions.iter().map(|c| c.points_earned as u64).sum()
}
