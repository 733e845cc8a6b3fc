use std::sync::Arc;

use log::{debug, info, warn};
use quest_core::{validate_sample, Coordinate, LocationSample, Quest};
use thiserror::Error;
use tokio::{
    select,
    sync::{mpsc, RwLock},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::geo::{haversine_distance, in_range};
use crate::infra::location::{LocationError, LocationProvider, PermissionStatus, WatchOptions};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("unable to read location: {0}")]
    LocationUnavailable(String),
    #[error("no quest with a location is being tracked")]
    NotTracking,
}

impl From<LocationError> for TrackingError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => TrackingError::PermissionDenied,
            other => TrackingError::LocationUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub sample: LocationSample,
    pub distance_meters: f64,
    pub in_range: bool,
}

impl LocationUpdate {
    pub fn from_sample(sample: LocationSample, target: Coordinate, radius_meters: f64) -> Self {
        let distance_meters = haversine_distance(sample.coordinate(), target);
        Self {
            in_range: in_range(distance_meters, radius_meters),
            distance_meters,
            sample,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Update(LocationUpdate),
    Error(TrackingError),
    /// The provider has no more positions to give
    StreamEnded,
}

#[derive(Debug, Clone, Copy)]
struct Geofence {
    target: Coordinate,
    radius_meters: f64,
}

#[derive(Debug, Default)]
struct TrackerState {
    last_update: Option<LocationUpdate>,
    last_error: Option<TrackingError>,
    permission_granted: bool,
}

/// Follows the device position for one quest at a time and reports the
/// distance to its target on the events channel.
pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    options: WatchOptions,
    events_tx: mpsc::Sender<TrackerEvent>,
    cancel_token: CancellationToken,
    task_tracker: TaskTracker,
    geofence: Option<Geofence>,
    state: Arc<RwLock<TrackerState>>,
}

impl LocationTracker {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        options: WatchOptions,
    ) -> (Self, mpsc::Receiver<TrackerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(32);
        let tracker = Self {
            provider,
            options,
            events_tx,
            cancel_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
            geofence: None,
            state: Arc::new(RwLock::new(TrackerState::default())),
        };
        (tracker, events_rx)
    }

    /// Begin sampling for `quest`, replacing whatever was tracked before.
    /// Quests without a target coordinate are not sampled at all.
    pub async fn start(&mut self, quest: &Quest) -> Result<(), TrackingError> {
        self.stop().await;

        let Some(target) = quest.target() else {
            debug!("quest {} has no location, not tracking", quest.id);
            self.geofence = None;
            return Ok(());
        };
        let geofence = Geofence {
            target,
            radius_meters: quest.location_radius_meters,
        };

        if self.provider.request_permission().await == PermissionStatus::Denied {
            warn!("location permission denied for quest {}", quest.id);
            self.report_denied().await;
            return Err(TrackingError::PermissionDenied);
        }
        self.state.write().await.permission_granted = true;

        let cancel_token = CancellationToken::new();
        let rx = match self
            .provider
            .watch_position(self.options.clone(), cancel_token.child_token())
            .await
        {
            Ok(rx) => rx,
            Err(LocationError::PermissionDenied) => {
                self.report_denied().await;
                return Err(TrackingError::PermissionDenied);
            }
            Err(e) => {
                let err = TrackingError::from(e);
                self.report_error(err.clone()).await;
                return Err(err);
            }
        };

        info!(
            "tracking quest {} target ({}, {}) radius {}m",
            quest.id, target.latitude, target.longitude, geofence.radius_meters
        );
        self.geofence = Some(geofence);
        self.cancel_token = cancel_token.clone();

        let events_tx = self.events_tx.clone();
        let state = self.state.clone();
        self.task_tracker.spawn(consume_samples(
            rx,
            geofence,
            events_tx,
            state,
            cancel_token,
        ));

        Ok(())
    }

    /// Cancel the subscription and wait for the consumer to finish.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        self.task_tracker.reopen();
        self.geofence = None;
    }

    /// One-shot position read through the same computation path as the watch.
    pub async fn refresh(&self) -> Result<LocationUpdate, TrackingError> {
        let geofence = self.geofence.ok_or(TrackingError::NotTracking)?;

        match self.provider.current_position(self.options.accuracy).await {
            Ok(sample) => {
                let update = handle_sample(sample, geofence, &self.state)
                    .await
                    .map_err(|e| TrackingError::LocationUnavailable(e.to_string()))?;
                let _ = self
                    .events_tx
                    .send(TrackerEvent::Update(update.clone()))
                    .await;
                Ok(update)
            }
            Err(LocationError::PermissionDenied) => {
                self.report_denied().await;
                Err(TrackingError::PermissionDenied)
            }
            Err(e) => {
                let err = TrackingError::from(e);
                self.report_error(err.clone()).await;
                Err(err)
            }
        }
    }

    pub async fn last_update(&self) -> Option<LocationUpdate> {
        self.state.read().await.last_update.clone()
    }

    pub async fn last_error(&self) -> Option<TrackingError> {
        self.state.read().await.last_error.clone()
    }

    pub async fn permission_granted(&self) -> bool {
        self.state.read().await.permission_granted
    }

    pub fn is_tracking(&self) -> bool {
        self.geofence.is_some() && !self.cancel_token.is_cancelled()
    }

    async fn report_denied(&self) {
        self.state.write().await.permission_granted = false;
        self.report_error(TrackingError::PermissionDenied).await;
    }

    async fn report_error(&self, err: TrackingError) {
        self.state.write().await.last_error = Some(err.clone());
        let _ = self.events_tx.send(TrackerEvent::Error(err)).await;
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn handle_sample(
    sample: LocationSample,
    geofence: Geofence,
    state: &RwLock<TrackerState>,
) -> Result<LocationUpdate, quest_core::CoreError> {
    validate_sample(&sample)?;
    let update = LocationUpdate::from_sample(sample, geofence.target, geofence.radius_meters);

    let mut state = state.write().await;
    state.last_error = None;
    state.last_update = Some(update.clone());

    Ok(update)
}

async fn consume_samples(
    mut rx: mpsc::Receiver<Result<LocationSample, LocationError>>,
    geofence: Geofence,
    events_tx: mpsc::Sender<TrackerEvent>,
    state: Arc<RwLock<TrackerState>>,
    cancel_token: CancellationToken,
) {
    loop {
        let item = select! {
            _ = cancel_token.cancelled() => {
                debug!("location tracker cancelled");
                break;
            }
            item = rx.recv() => item,
        };

        let event = match item {
            None => {
                debug!("location stream ended");
                send_event(&events_tx, TrackerEvent::StreamEnded, &cancel_token).await;
                break;
            }
            Some(Ok(sample)) => match handle_sample(sample, geofence, &state).await {
                Ok(update) => {
                    debug!(
                        "distance {:.1}m in_range {}",
                        update.distance_meters, update.in_range
                    );
                    TrackerEvent::Update(update)
                }
                Err(e) => {
                    let err = TrackingError::LocationUnavailable(e.to_string());
                    state.write().await.last_error = Some(err.clone());
                    TrackerEvent::Error(err)
                }
            },
            Some(Err(LocationError::PermissionDenied)) => {
                let mut guard = state.write().await;
                guard.permission_granted = false;
                guard.last_error = Some(TrackingError::PermissionDenied);
                drop(guard);
                send_event(
                    &events_tx,
                    TrackerEvent::Error(TrackingError::PermissionDenied),
                    &cancel_token,
                )
                .await;
                break;
            }
            Some(Err(e)) => {
                warn!("location error: {}", e);
                let err = TrackingError::from(e);
                state.write().await.last_error = Some(err.clone());
                TrackerEvent::Error(err)
            }
        };

        if !send_event(&events_tx, event, &cancel_token).await {
            break;
        }
    }
}

/// Deliver `event` unless the tracker is stopped first. A full channel must
/// not keep `stop` waiting. Returns false when the consumer should exit.
async fn send_event(
    events_tx: &mpsc::Sender<TrackerEvent>,
    event: TrackerEvent,
    cancel_token: &CancellationToken,
) -> bool {
    select! {
        _ = cancel_token.cancelled() => {
            debug!("location tracker cancelled while delivering an event");
            false
        }
        sent = events_tx.send(event) => {
            if sent.is_err() {
                debug!("tracker events receiver dropped");
            }
            sent.is_ok()
        }
    }
}
