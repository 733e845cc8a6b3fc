use std::{
    fs,
    path::Path,
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info};
use quest_core::LocationSample;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;

use super::location::{
    Accuracy, LocationError, LocationProvider, PermissionStatus, WatchOptions,
};

/// One entry of a recorded route, either a fix or a provider failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackPoint {
    Fix {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accuracy: Option<f64>,
        /// Milliseconds since the start of the recording
        #[serde(default)]
        offset_ms: u64,
    },
    Error {
        error: String,
        #[serde(default)]
        offset_ms: u64,
    },
}

impl TrackPoint {
    pub fn fix(latitude: f64, longitude: f64, offset_ms: u64) -> Self {
        Self::Fix {
            latitude,
            longitude,
            accuracy: None,
            offset_ms,
        }
    }

    pub fn error(error: impl Into<String>, offset_ms: u64) -> Self {
        Self::Error {
            error: error.into(),
            offset_ms,
        }
    }

    fn offset_ms(&self) -> u64 {
        match self {
            Self::Fix { offset_ms, .. } | Self::Error { offset_ms, .. } => *offset_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTrack {
    #[serde(default = "default_permission")]
    pub permission_granted: bool,
    pub points: Vec<TrackPoint>,
}

fn default_permission() -> bool {
    true
}

impl LocationTrack {
    pub fn new(points: Vec<TrackPoint>) -> Self {
        Self {
            permission_granted: true,
            points,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read track {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse track {}: {}", path.display(), e))
    }
}

/// Replays a recorded route as if it came from the device, honouring the
/// watch thresholds against the recorded timestamps.
#[derive(Clone)]
pub struct ReplayLocationProvider {
    track: LocationTrack,
    /// Recorded offsets are divided by this before sleeping
    speedup: u32,
    last_position: Arc<RwLock<Option<LocationSample>>>,
}

impl ReplayLocationProvider {
    pub fn new(track: LocationTrack) -> Self {
        Self {
            track,
            speedup: 1,
            last_position: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_speedup(mut self, speedup: u32) -> Self {
        self.speedup = speedup.max(1);
        self
    }

    fn first_fix(&self, started_at: OffsetDateTime) -> Option<LocationSample> {
        self.track
            .points
            .iter()
            .find_map(|point| to_sample(point, started_at))
    }
}

fn to_sample(point: &TrackPoint, started_at: OffsetDateTime) -> Option<LocationSample> {
    match point {
        TrackPoint::Fix {
            latitude,
            longitude,
            accuracy,
            offset_ms,
        } => Some(LocationSample {
            latitude: *latitude,
            longitude: *longitude,
            accuracy: *accuracy,
            timestamp: started_at + time::Duration::milliseconds(*offset_ms as i64),
        }),
        TrackPoint::Error { .. } => None,
    }
}

#[async_trait]
impl LocationProvider for ReplayLocationProvider {
    async fn request_permission(&self) -> PermissionStatus {
        if self.track.permission_granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample, LocationError> {
        if !self.track.permission_granted {
            return Err(LocationError::PermissionDenied);
        }
        debug!("replay current position requested with {:?} accuracy", accuracy);

        let last = self
            .last_position
            .read()
            .map_err(|_| LocationError::Unavailable(String::from("position lock poisoned")))?
            .clone();

        match last {
            Some(sample) => Ok(sample),
            None => self
                .first_fix(OffsetDateTime::now_utc())
                .ok_or_else(|| LocationError::Unavailable(String::from("track has no fixes"))),
        }
    }

    async fn watch_position(
        &self,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Result<LocationSample, LocationError>>, LocationError> {
        if !self.track.permission_granted {
            return Err(LocationError::PermissionDenied);
        }

        let (tx, rx) = mpsc::channel(16);
        let points = self.track.points.clone();
        let speedup = self.speedup as u64;
        let last_position = self.last_position.clone();
        let started_at = OffsetDateTime::now_utc();

        tokio::spawn(async move {
            let mut last_emitted: Option<LocationSample> = None;
            let mut previous_offset = 0;

            for point in points {
                let wait_ms = point.offset_ms().saturating_sub(previous_offset) / speedup;
                previous_offset = point.offset_ms();

                select! {
                    _ = cancel.cancelled() => {
                        debug!("replay watch cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
                }

                let item = match to_sample(&point, started_at) {
                    Some(sample) => {
                        let emit = last_emitted
                            .as_ref()
                            .map(|last| options.should_emit(last, &sample))
                            .unwrap_or(true);
                        if !emit {
                            continue;
                        }
                        if let Ok(mut last) = last_position.write() {
                            *last = Some(sample.clone());
                        }
                        last_emitted = Some(sample.clone());
                        Ok(sample)
                    }
                    None => match &point {
                        TrackPoint::Error { error, .. } => {
                            Err(LocationError::Unavailable(error.clone()))
                        }
                        TrackPoint::Fix { .. } => continue,
                    },
                };

                select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            info!("replay track finished");
        });

        Ok(rx)
    }
}
