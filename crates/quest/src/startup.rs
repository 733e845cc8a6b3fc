use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::anyhow;
use log::{info, warn};
use quest_core::{EventContext, Quest, QuestProgress};
use reqwest_middleware::{
    reqwest::{self, Client, Url},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::select;

#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::verifier_mock::{MockPhotoVerifier, MockVerdict};
use crate::{
    config::{Command, Settings},
    domain::{
        CaptureOutcome, CapturedPhoto, LocalCompletionStore, LocationTracker, ParticipantContext,
        QuestProgressEngine, TrackerEvent, TrackingError, VerificationStep,
    },
    infra::{
        db::DBConnection,
        file_utils::create_folder,
        kv::SqliteKeyValueStore,
        location::WatchOptions,
        location_replay::{LocationTrack, ReplayLocationProvider},
        verifier::{get_api_key, PhotoVerificationClient, PhotoVerifier},
    },
};

const DATABASE_NAME: &str = "quest";

pub struct Application {
    settings: Settings,
    store: Arc<LocalCompletionStore>,
}

impl Application {
    /// Opens the local store. The photo verifier is only built by `run_quest`,
    /// the other commands never need it.
    pub async fn build(settings: Settings) -> Result<Self, anyhow::Error> {
        let store = build_store(&settings).await?;
        Ok(Self { settings, store })
    }

    pub fn store(&self) -> Arc<LocalCompletionStore> {
        self.store.clone()
    }

    pub async fn run(&self, command: Command) -> Result<(), anyhow::Error> {
        match command {
            Command::Join {
                event_id,
                event_name,
                participant_id,
                starts_at,
                ends_at,
            } => {
                let context = EventContext {
                    event_id,
                    event_name,
                    participant_id,
                    event_start_date: parse_optional_date(starts_at.as_deref())?,
                    event_end_date: parse_optional_date(ends_at.as_deref())?,
                    joined_at: OffsetDateTime::now_utc(),
                };
                self.join(context).await
            }
            Command::Run {
                quest,
                track,
                photo,
            } => {
                let quest = load_quest(&quest)?;
                let track = LocationTrack::from_file(&track)?;
                let photo = photo.as_deref().map(load_photo).transpose()?;
                let progress = self.run_quest(quest, track, photo).await?;
                println!("{}", serde_json::to_string_pretty(&progress)?);
                Ok(())
            }
            Command::Status => self.status().await,
            Command::Leave => self.leave().await,
        }
    }

    pub async fn join(&self, context: EventContext) -> Result<(), anyhow::Error> {
        info!(
            "joining event {} ({}) as {}",
            context.event_name, context.event_id, context.participant_id
        );
        self.store.save_event_context(&context).await?;
        println!("Joined {}", context.event_name);
        Ok(())
    }

    pub async fn status(&self) -> Result<(), anyhow::Error> {
        let context = self.store.event_context().await?;
        let completions = self.store.get_completions().await?;
        let points = self.store.get_points().await?;

        let summary = serde_json::json!({
            "event": context,
            "completions": completions,
            "points": points,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }

    pub async fn leave(&self) -> Result<(), anyhow::Error> {
        self.store.clear_all().await?;
        println!("Left event, local quest data cleared");
        Ok(())
    }

    /// Follow a recorded route for `quest`: the photo is submitted the first
    /// time the participant is in range, quests without a photo are completed
    /// directly. Returns the final progress.
    pub async fn run_quest(
        &self,
        quest: Quest,
        track: LocationTrack,
        photo: Option<CapturedPhoto>,
    ) -> Result<QuestProgress, anyhow::Error> {
        let context = self
            .store
            .event_context()
            .await?
            .ok_or_else(|| anyhow!("no event joined, run `quest join` first"))?;
        if context.event_id != quest.event_id {
            warn!(
                "quest {} belongs to event {}, joined event is {}",
                quest.id, quest.event_id, context.event_id
            );
        }

        info!(
            "running {} {} ({})",
            quest.quest_type.label(),
            quest.title,
            quest.id
        );
        let verifier = build_verifier(&self.settings)?;

        let mut engine = QuestProgressEngine::new(
            quest.clone(),
            ParticipantContext::from(&context),
            self.store.clone(),
            verifier,
        )
        .await?;
        if engine.is_completed() {
            info!("quest {} already completed", quest.id);
            return Ok(engine.progress());
        }

        // Nothing to walk to, no tracking needed
        if !quest.has_location_requirement() {
            complete_without_location(&mut engine, photo).await?;
            return Ok(engine.progress());
        }

        let provider = ReplayLocationProvider::new(track)
            .with_speedup(self.settings.tracker_settings.replay_speedup);
        let (mut tracker, mut events) = LocationTracker::new(
            Arc::new(provider),
            WatchOptions::from(&self.settings.tracker_settings),
        );
        tracker.start(&quest).await?;

        let mut photo = photo;
        let mut route_finished = false;

        loop {
            select! {
                event = events.recv(), if !route_finished => {
                    match event {
                        Some(TrackerEvent::Update(update)) => {
                            engine.on_location_update(&update);
                            log_progress(&engine.progress());
                            act_on_progress(&mut engine, &mut photo).await?;
                        }
                        Some(TrackerEvent::Error(e)) => {
                            warn!("tracking error: {}", e);
                            if e == TrackingError::PermissionDenied {
                                break;
                            }
                        }
                        Some(TrackerEvent::StreamEnded) | None => {
                            info!("route finished");
                            route_finished = true;
                        }
                    }
                }
                outcome = engine.next_verification(), if engine.is_verifying() => {
                    if let Some(outcome) = outcome {
                        match engine.on_verification_result(outcome).await? {
                            VerificationStep::Completed(completion) => {
                                info!("quest completed for {} points", completion.points_earned);
                            }
                            VerificationStep::Rejected { reason } => {
                                warn!("photo rejected: {}", reason);
                            }
                            VerificationStep::Failed { error } => {
                                warn!("verification failed: {}", error.message);
                            }
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping tracker");
                    break;
                }
            }

            if engine.is_completed() || (route_finished && !engine.is_verifying()) {
                break;
            }
        }

        tracker.stop().await;

        // Verification keeps going after the view is gone so the award is not lost
        let background = engine.background_tasks();
        background.close();
        if tokio::time::timeout(Duration::from_secs(30), background.wait())
            .await
            .is_err()
        {
            warn!("verification still running at shutdown");
        }

        Ok(engine.progress())
    }
}

async fn complete_without_location(
    engine: &mut QuestProgressEngine,
    photo: Option<CapturedPhoto>,
) -> Result<(), anyhow::Error> {
    if !engine.quest().required_photo {
        engine.complete().await?;
        return Ok(());
    }
    let Some(photo) = photo else {
        return Err(anyhow!("quest requires a photo, pass --photo"));
    };
    if let CaptureOutcome::Submitted = engine.on_photo_captured(photo).await? {
        match engine.await_verification().await? {
            VerificationStep::Completed(_) => {}
            VerificationStep::Rejected { reason } => warn!("photo rejected: {}", reason),
            VerificationStep::Failed { error } => warn!("verification failed: {}", error.message),
        }
    }
    Ok(())
}

/// Submit the photo or complete once the participant is where they need to be.
async fn act_on_progress(
    engine: &mut QuestProgressEngine,
    photo: &mut Option<CapturedPhoto>,
) -> Result<(), anyhow::Error> {
    let progress = engine.progress();
    if !progress.is_in_range || engine.is_completed() || engine.status().is_photo_in_flight() {
        return Ok(());
    }

    if engine.quest().required_photo {
        if let Some(photo) = photo.take() {
            engine.on_photo_captured(photo).await?;
        }
    } else if progress.can_complete {
        engine.complete().await?;
    }
    Ok(())
}

fn log_progress(progress: &QuestProgress) {
    match progress.distance_to_location {
        Some(distance) => info!(
            "{:?} {:.0}% ({:.1}m away, in range: {})",
            progress.status, progress.progress_percentage, distance, progress.is_in_range
        ),
        None => info!(
            "{:?} {:.0}%",
            progress.status, progress.progress_percentage
        ),
    }
}

pub async fn build_store(settings: &Settings) -> Result<Arc<LocalCompletionStore>, anyhow::Error> {
    create_folder(&settings.db_settings.data_folder);
    let db_connection = DBConnection::new(
        &settings.db_settings.data_folder,
        DATABASE_NAME,
        settings.db_settings.clone().into(),
    )
    .await?;
    db_connection.ping().await?;
    info!("Local store at {}", db_connection.database_path);

    let kv = SqliteKeyValueStore::new(db_connection);
    Ok(Arc::new(LocalCompletionStore::new(Arc::new(kv))))
}

pub fn build_verifier(settings: &Settings) -> Result<Arc<dyn PhotoVerifier>, anyhow::Error> {
    let verifier_settings = &settings.verifier_settings;

    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    if verifier_settings.mock_enabled {
        let verdict = match &verifier_settings.mock_reject_reason {
            Some(reason) => MockVerdict::rejected(reason.clone()),
            None => MockVerdict::verified(),
        };
        let mut mock = MockPhotoVerifier::new(verdict);
        if let Some(delay_ms) = verifier_settings.mock_delay_ms {
            mock = mock.with_delay(Duration::from_millis(delay_ms));
        }
        info!("Mock photo verifier configured");
        return Ok(Arc::new(mock));
    }

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    if verifier_settings.mock_enabled {
        return Err(anyhow!(
            "Mock photo verifier requires e2e-testing feature or debug build"
        ));
    }

    let base_url = Url::parse(&verifier_settings.base_url)?;
    let api_key = get_api_key(&verifier_settings.api_key_file)?;
    let client = build_reqwest_client(verifier_settings.max_retries);
    info!("Photo verifier configured at {}", base_url);
    Ok(Arc::new(PhotoVerificationClient::new(
        client, &base_url, api_key,
    )))
}

pub fn build_reqwest_client(max_retries: u32) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build()
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<OffsetDateTime>, anyhow::Error> {
    value
        .map(|raw| {
            OffsetDateTime::parse(raw, &Rfc3339)
                .map_err(|e| anyhow!("invalid RFC 3339 date {}: {}", raw, e))
        })
        .transpose()
}

pub fn load_quest(path: &Path) -> Result<Quest, anyhow::Error> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read quest {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse quest {}: {}", path.display(), e))
}

pub fn load_photo(path: &Path) -> Result<CapturedPhoto, anyhow::Error> {
    let data = fs::read(path).map_err(|e| anyhow!("Failed to read photo {}: {}", path.display(), e))?;
    let uri = format!("file://{}", path.display());
    Ok(CapturedPhoto::new(uri, data))
}
