use std::time::Duration;

use async_trait::async_trait;
use quest_core::LocationSample;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::haversine_distance;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("location stream closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Lowest,
    Low,
    #[default]
    Balanced,
    High,
    Highest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub accuracy: Accuracy,
    pub min_interval: Duration,
    pub min_displacement_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Balanced,
            min_interval: Duration::from_secs(5),
            min_displacement_meters: 10.0,
        }
    }
}

impl WatchOptions {
    /// A new sample is delivered once either threshold is reached.
    pub fn should_emit(&self, last: &LocationSample, next: &LocationSample) -> bool {
        let elapsed_ms = (next.timestamp - last.timestamp).whole_milliseconds();
        if elapsed_ms >= self.min_interval.as_millis() as i128 {
            return true;
        }
        haversine_distance(last.coordinate(), next.coordinate()) >= self.min_displacement_meters
    }
}

/// Source of device positions.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample, LocationError>;

    /// Subscribe to position changes. The channel closes once `cancel` fires
    /// or the provider runs out of positions.
    async fn watch_position(
        &self,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Result<LocationSample, LocationError>>, LocationError>;
}
