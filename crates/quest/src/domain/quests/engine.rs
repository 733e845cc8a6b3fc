use std::sync::Arc;

use log::{debug, error, info, warn};
use quest_core::{
    validate_quest, CompletionData, Quest, QuestCompletion, QuestProgress, VerificationResult,
};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use super::{
    progress::{can_complete, progress_percentage, FULL_PROGRESS},
    states::{
        Available, CapturedPhoto, Completed, HasSessionData, ParticipantContext, QuestSession,
        QuestStatus,
    },
};
use crate::{
    domain::{
        completions::{LocalCompletionStore, NewCompletion},
        location::LocationUpdate,
        Error,
    },
    infra::verifier::{PhotoVerifier, VerificationRequest},
};

/// Recorded as the verifying authority on photo completions
pub const AI_CLASSIFIER: &str = "ai-classifier";

/// The classifier could not give an answer
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationError {
    pub message: String,
    pub transient: bool,
}

/// What a background verification reports back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// `completion` is set when the background task already stored it
    Verified {
        result: VerificationResult,
        completion: Option<QuestCompletion>,
    },
    Rejected(VerificationResult),
    Failed(VerificationError),
}

/// Result of applying a verification outcome
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationStep {
    Completed(QuestCompletion),
    /// Photo cleared, a new capture is needed
    Rejected { reason: String },
    /// Photo kept, `retry_verification` re-sends it
    Failed { error: VerificationError },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Submitted,
    /// The store already had this quest, nothing was sent
    AlreadyCompleted(QuestCompletion),
}

/// Drives one quest for one participant from first sample to completion.
pub struct QuestProgressEngine {
    status: QuestStatus,
    store: Arc<LocalCompletionStore>,
    verifier: Arc<dyn PhotoVerifier>,
    outcome_tx: mpsc::Sender<VerificationOutcome>,
    outcome_rx: mpsc::Receiver<VerificationOutcome>,
    background_tasks: TaskTracker,
}

impl QuestProgressEngine {
    /// Starts in `Completed` when the store already holds this quest.
    pub async fn new(
        quest: Quest,
        participant: ParticipantContext,
        store: Arc<LocalCompletionStore>,
        verifier: Arc<dyn PhotoVerifier>,
    ) -> Result<Self, Error> {
        validate_quest(&quest)?;

        let existing = store.get_completion(quest.id).await?;
        let session = QuestSession::new(quest, participant);
        let status = match existing {
            Some(completion) => {
                debug!("quest {} already completed", completion.quest_id);
                QuestStatus::Completed(Completed::new(session, completion))
            }
            None => QuestStatus::Available(Available::from_session(session)),
        };

        let (outcome_tx, outcome_rx) = mpsc::channel(8);
        Ok(Self {
            status,
            store,
            verifier,
            outcome_tx,
            outcome_rx,
            background_tasks: TaskTracker::new(),
        })
    }

    pub fn quest(&self) -> &Quest {
        &self.status.session().quest
    }

    pub fn status(&self) -> &QuestStatus {
        &self.status
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self.status, QuestStatus::Verifying(_))
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reason the classifier gave for the last rejected photo
    pub fn last_rejection(&self) -> Option<&str> {
        self.status.session().last_rejection.as_deref()
    }

    /// Verification tasks keep running after the engine is dropped; wait on
    /// this to know they have finished.
    pub fn background_tasks(&self) -> TaskTracker {
        self.background_tasks.clone()
    }

    pub fn progress(&self) -> QuestProgress {
        let session = self.status.session();
        let quest = &session.quest;

        let (completion, percentage, completable) = match &self.status {
            QuestStatus::Completed(completed) => {
                (Some(completed.completion.clone()), FULL_PROGRESS, false)
            }
            status => (
                None,
                progress_percentage(
                    quest,
                    session.distance_meters,
                    session.in_range,
                    session.photo.is_some(),
                ),
                !status.is_photo_in_flight() && can_complete(quest, session.in_range, false),
            ),
        };

        QuestProgress {
            quest: quest.clone(),
            completion,
            distance_to_location: session.distance_meters,
            is_in_range: session.in_range,
            can_complete: completable,
            progress_percentage: percentage,
            status: self.status.kind(),
            is_verifying: self.is_verifying(),
        }
    }

    pub fn on_location_update(&mut self, update: &LocationUpdate) {
        if !self.quest().has_location_requirement() {
            debug!("ignoring location for quest {} without a target", self.quest().id);
            return;
        }
        if self.status.is_terminal() {
            debug!("ignoring location for completed quest {}", self.quest().id);
            return;
        }

        let previous = self.status.kind();
        self.status = self.status.clone().on_location_update(update);
        if previous != self.status.kind() {
            info!(
                "quest {} {:?} -> {} at {:.1}m",
                self.quest().id,
                previous,
                self.status,
                update.distance_meters
            );
        }
    }

    /// Store the photo and hand it to the classifier in the background.
    pub async fn on_photo_captured(&mut self, photo: CapturedPhoto) -> Result<CaptureOutcome, Error> {
        let quest = self.quest().clone();
        if !quest.required_photo {
            return Err(Error::PhotoNotRequired);
        }

        let session = match &self.status {
            QuestStatus::Verifying(_) => return Err(Error::VerificationInProgress),
            QuestStatus::Completed(completed) => {
                return Ok(CaptureOutcome::AlreadyCompleted(completed.completion.clone()))
            }
            status => status.session(),
        };
        if !quest.is_active {
            return Err(Error::NotCompletable(String::from("quest is not active")));
        }
        if !session.location_satisfied() {
            return Err(Error::OutOfRange {
                distance: session.distance_meters,
                radius: quest.location_radius_meters,
            });
        }

        if let Some(existing) = self.resurface_existing().await? {
            return Ok(CaptureOutcome::AlreadyCompleted(existing));
        }

        self.status = match self.status.clone() {
            QuestStatus::Available(s) => s.into_photo_pending(photo),
            QuestStatus::InRange(s) => s.into_photo_pending(photo),
            QuestStatus::PhotoPending(s) => s.replace_photo(photo),
            other => {
                return Err(Error::InvalidState(format!(
                    "cannot capture a photo while {}",
                    other
                )))
            }
        };

        self.spawn_verification()?;
        Ok(CaptureOutcome::Submitted)
    }

    /// Re-send the held photo after the classifier could not be reached.
    pub async fn retry_verification(&mut self) -> Result<CaptureOutcome, Error> {
        match &self.status {
            QuestStatus::PhotoPending(_) => {}
            QuestStatus::Verifying(_) => return Err(Error::VerificationInProgress),
            QuestStatus::Completed(completed) => {
                return Ok(CaptureOutcome::AlreadyCompleted(completed.completion.clone()))
            }
            other => {
                return Err(Error::InvalidState(format!(
                    "no photo to re-send while {}",
                    other
                )))
            }
        }

        if let Some(existing) = self.resurface_existing().await? {
            return Ok(CaptureOutcome::AlreadyCompleted(existing));
        }

        self.spawn_verification()?;
        Ok(CaptureOutcome::Submitted)
    }

    /// Wait for the in-flight verification to report. None when nothing is in flight.
    pub async fn next_verification(&mut self) -> Option<VerificationOutcome> {
        if !self.is_verifying() {
            return None;
        }
        self.outcome_rx.recv().await
    }

    /// Wait for the in-flight verification and apply it.
    pub async fn await_verification(&mut self) -> Result<VerificationStep, Error> {
        match self.next_verification().await {
            Some(outcome) => self.on_verification_result(outcome).await,
            None => Err(Error::InvalidState(String::from(
                "no verification in flight",
            ))),
        }
    }

    pub async fn on_verification_result(
        &mut self,
        outcome: VerificationOutcome,
    ) -> Result<VerificationStep, Error> {
        let QuestStatus::Verifying(verifying) = self.status.clone() else {
            return Err(Error::InvalidState(format!(
                "verification result arrived while {}",
                self.status
            )));
        };
        debug!(
            "quest {} classifier answered after {}ms",
            self.quest().id,
            verifying.elapsed().whole_milliseconds()
        );

        match outcome {
            VerificationOutcome::Verified { result, completion } => {
                let completion = match completion {
                    Some(completion) => completion,
                    None => match record_verified(&self.store, verifying.session(), &result).await
                    {
                        Ok(completion) => completion,
                        Err(e) => {
                            error!("failed to store verified quest {}: {}", self.quest().id, e);
                            self.status = verifying.into_failed();
                            return Err(e);
                        }
                    },
                };
                info!(
                    "quest {} verified ({:.2}): {}",
                    completion.quest_id, result.confidence, result.reason
                );
                self.status = verifying.into_completed(completion.clone());
                Ok(VerificationStep::Completed(completion))
            }
            VerificationOutcome::Rejected(result) => {
                info!("quest {} photo rejected: {}", self.quest().id, result.reason);
                self.status = verifying.into_rejected(result.reason.clone());
                Ok(VerificationStep::Rejected {
                    reason: result.reason,
                })
            }
            VerificationOutcome::Failed(error) => {
                warn!(
                    "quest {} verification failed (transient: {}): {}",
                    self.quest().id,
                    error.transient,
                    error.message
                );
                self.status = verifying.into_failed();
                Ok(VerificationStep::Failed { error })
            }
        }
    }

    /// Complete a quest that needs no photo. Calling again once completed
    /// returns the stored record.
    pub async fn complete(&mut self) -> Result<QuestCompletion, Error> {
        if let QuestStatus::Completed(completed) = &self.status {
            return Ok(completed.completion.clone());
        }
        if self.status.is_photo_in_flight() {
            return Err(Error::VerificationInProgress);
        }

        if let Some(existing) = self.resurface_existing().await? {
            return Ok(existing);
        }

        let session = self.status.session();
        let quest = &session.quest;
        if quest.required_photo {
            return Err(Error::PhotoRequired);
        }
        if !session.location_satisfied() {
            return Err(Error::OutOfRange {
                distance: session.distance_meters,
                radius: quest.location_radius_meters,
            });
        }
        if !can_complete(quest, session.in_range, false) {
            return Err(Error::NotCompletable(format!(
                "quest {} cannot be completed",
                quest.id
            )));
        }

        let completion_data = session.distance_meters.map(|distance| CompletionData {
            distance_meters: Some(distance),
            ..Default::default()
        });
        let outcome = self
            .store
            .save_completion(
                quest.id,
                NewCompletion {
                    participant_id: session.participant.participant_id,
                    completion_data,
                    points_earned: quest.points_reward,
                    verified: true,
                    verified_by: None,
                },
            )
            .await?;
        let completion = outcome.into_completion();

        self.status = match self.status.clone() {
            QuestStatus::Available(s) => s.into_completed(completion.clone()),
            QuestStatus::InRange(s) => s.into_completed(completion.clone()),
            other => {
                return Err(Error::InvalidState(format!(
                    "cannot complete while {}",
                    other
                )))
            }
        };
        Ok(completion)
    }

    /// Move to Completed if the store already has this quest.
    async fn resurface_existing(&mut self) -> Result<Option<QuestCompletion>, Error> {
        let Some(existing) = self.store.get_completion(self.quest().id).await? else {
            return Ok(None);
        };
        debug!("re-surfacing stored completion {}", existing.id);
        let session = self.status.clone().into_session();
        self.status = QuestStatus::Completed(Completed::new(session, existing.clone()));
        Ok(Some(existing))
    }

    fn spawn_verification(&mut self) -> Result<(), Error> {
        let QuestStatus::PhotoPending(pending) = self.status.clone() else {
            return Err(Error::InvalidState(format!(
                "cannot verify while {}",
                self.status
            )));
        };
        let Some(photo) = pending.photo().cloned() else {
            return Err(Error::InvalidState(String::from("no photo to verify")));
        };

        let session = pending.session().clone();
        let request =
            VerificationRequest::from_photo(&photo.data, session.quest.description.clone());
        let verifier = self.verifier.clone();
        let store = self.store.clone();
        let outcome_tx = self.outcome_tx.clone();

        info!(
            "verifying photo {} for quest {}",
            photo.uri, session.quest.id
        );
        self.background_tasks.spawn(async move {
            let outcome = match verifier.verify(request).await {
                Ok(result) if result.verified => {
                    // Stored here so the award survives the engine going away
                    let completion = match record_verified(&store, &session, &result).await {
                        Ok(completion) => Some(completion),
                        Err(e) => {
                            error!("background save of quest {} failed: {}", session.quest.id, e);
                            None
                        }
                    };
                    VerificationOutcome::Verified { result, completion }
                }
                Ok(result) => VerificationOutcome::Rejected(result),
                Err(e) => VerificationOutcome::Failed(VerificationError {
                    transient: e.is_transient(),
                    message: e.to_string(),
                }),
            };

            if outcome_tx.send(outcome).await.is_err() {
                debug!(
                    "engine for quest {} is gone, verification outcome dropped",
                    session.quest.id
                );
            }
        });

        self.status = pending.into_verifying();
        Ok(())
    }
}

async fn record_verified(
    store: &LocalCompletionStore,
    session: &QuestSession,
    result: &VerificationResult,
) -> Result<QuestCompletion, Error> {
    let quest = &session.quest;
    let outcome = store
        .save_completion(
            quest.id,
            NewCompletion {
                participant_id: session.participant.participant_id,
                completion_data: Some(CompletionData {
                    photo_url: session.photo.as_ref().map(|photo| photo.uri.clone()),
                    distance_meters: session.distance_meters,
                    confidence: Some(result.confidence),
                    reason: Some(result.reason.clone()),
                    extra: None,
                }),
                points_earned: quest.points_reward,
                verified: true,
                verified_by: Some(AI_CLASSIFIER.to_string()),
            },
        )
        .await?;
    Ok(outcome.into_completion())
}
