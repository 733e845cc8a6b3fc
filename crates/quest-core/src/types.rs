//! Shared types between the quest engine, the local store and the classifier client

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Geofence radius used when a quest definition omits one
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// Kind of challenge a quest represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestType {
    Location,
    Photo,
    Social,
    Scavenger,
    Sponsor,
}

impl QuestType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Location => "Location Quest",
            Self::Photo => "Photo Quest",
            Self::Social => "Social Quest",
            Self::Scavenger => "Scavenger Hunt",
            Self::Sponsor => "Sponsor Quest",
        }
    }
}

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Static definition of a challenge, read-only from the client's perspective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: Uuid,
    pub event_id: Uuid,
    pub title: String,
    /// Shown to the participant and sent to the classifier as the requirement prompt
    pub description: String,
    pub quest_type: QuestType,
    pub points_reward: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_longitude: Option<f64>,
    #[serde(default = "default_radius")]
    pub location_radius_meters: f64,
    #[serde(default)]
    pub required_photo: bool,
    /// Opaque JSON describing unlock logic, evaluated by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
    /// None means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completions: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_METERS
}

fn default_active() -> bool {
    true
}

impl Quest {
    /// Target of the geofence, only when both coordinates are present.
    pub fn target(&self) -> Option<Coordinate> {
        match (self.location_latitude, self.location_longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
            _ => None,
        }
    }

    pub fn has_location_requirement(&self) -> bool {
        self.target().is_some()
    }
}

/// A single reading from the location provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Payload stored alongside a completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Distance to the target when the completing action happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Free-form data such as text responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Durable record that a participant finished a quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestCompletion {
    pub id: Uuid,
    pub quest_id: Uuid,
    pub participant_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_data: Option<CompletionData>,
    pub points_earned: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
}

/// Event the participant joined on this device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub event_id: Uuid,
    pub event_name: String,
    pub participant_id: Uuid,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub event_start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub event_end_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Verdict returned by the remote photo classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(default)]
    pub verified: bool,
    /// 0-1
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    String::from("Unable to verify")
}

impl VerificationResult {
    pub fn verified(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            verified: true,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn rejected(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            confidence,
            reason: reason.into(),
        }
    }

    /// Clamp confidence into [0, 1], a NaN confidence becomes 0.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }
}

/// Quest lifecycle state for API responses and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatusKind {
    Available,
    InRange,
    PhotoPending,
    Verifying,
    Completed,
}

/// Live, derived state for one (quest, participant) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub quest: Quest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<QuestCompletion>,
    /// Meters, None until a sample arrives or when the quest has no location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_to_location: Option<f64>,
    pub is_in_range: bool,
    pub can_complete: bool,
    pub progress_percentage: f64,
    pub status: QuestStatusKind,
    pub is_verifying: bool,
}
