//! Typestate machine for a single quest as seen by one participant.
//!
//! Each state is a separate struct owning the session data. Transitions
//! consume `self` and return the next state wrapped in [`QuestStatus`].
//!
//! # State Flow
//!
//! ```text
//! Available <──> InRange          (location updates)
//!     │             │
//!     └──────┬──────┘
//!            ↓ photo captured
//!       PhotoPending <──────┐
//!            ↓              │ classifier unreachable
//!        Verifying ─────────┘
//!            │  └──────────→ Available / InRange (photo rejected)
//!            ↓ verified
//!        Completed
//! ```
//!
//! Quests without a photo go straight from Available/InRange to Completed.

mod available;
mod completed;
mod photo_pending;
mod verifying;

pub use available::*;
pub use completed::*;
pub use photo_pending::*;
pub use verifying::*;

use std::{fmt, sync::Arc};

use quest_core::{Quest, QuestStatusKind};
use uuid::Uuid;

use crate::domain::location::LocationUpdate;

/// Who the engine is tracking progress for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantContext {
    pub event_id: Uuid,
    pub participant_id: Uuid,
}

impl From<&quest_core::EventContext> for ParticipantContext {
    fn from(context: &quest_core::EventContext) -> Self {
        Self {
            event_id: context.event_id,
            participant_id: context.participant_id,
        }
    }
}

/// A photo taken for a quest, held until the classifier answers
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPhoto {
    /// Where the photo lives on the device, stored with the completion
    pub uri: String,
    pub data: Arc<[u8]>,
}

impl CapturedPhoto {
    pub fn new(uri: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            uri: uri.into(),
            data: data.into(),
        }
    }
}

/// Data every state carries
#[derive(Debug, Clone)]
pub struct QuestSession {
    pub quest: Quest,
    pub participant: ParticipantContext,
    /// None until a sample arrives, always None for quests without a location
    pub distance_meters: Option<f64>,
    pub in_range: bool,
    pub photo: Option<CapturedPhoto>,
    /// Reason given by the classifier for the last rejected photo
    pub last_rejection: Option<String>,
}

impl QuestSession {
    pub fn new(quest: Quest, participant: ParticipantContext) -> Self {
        Self {
            quest,
            participant,
            distance_meters: None,
            in_range: false,
            photo: None,
            last_rejection: None,
        }
    }

    /// In range, or the quest has no location to be in range of.
    pub fn location_satisfied(&self) -> bool {
        !self.quest.has_location_requirement() || self.in_range
    }

    pub(crate) fn record_location(&mut self, update: &LocationUpdate) {
        self.distance_meters = Some(update.distance_meters);
        self.in_range = update.in_range;
    }
}

/// Wrapper enum used when the concrete state isn't known at compile time.
#[derive(Debug, Clone)]
pub enum QuestStatus {
    Available(Available),
    InRange(InRange),
    PhotoPending(PhotoPending),
    Verifying(Verifying),
    Completed(Completed),
}

impl QuestStatus {
    /// Pick Available or InRange from the session's location data.
    pub fn from_session(session: QuestSession) -> Self {
        if session.quest.has_location_requirement() && session.in_range {
            Self::InRange(InRange::from_session(session))
        } else {
            Self::Available(Available::from_session(session))
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Available(_) => "available",
            Self::InRange(_) => "in_range",
            Self::PhotoPending(_) => "photo_pending",
            Self::Verifying(_) => "verifying",
            Self::Completed(_) => "completed",
        }
    }

    pub fn kind(&self) -> QuestStatusKind {
        match self {
            Self::Available(_) => QuestStatusKind::Available,
            Self::InRange(_) => QuestStatusKind::InRange,
            Self::PhotoPending(_) => QuestStatusKind::PhotoPending,
            Self::Verifying(_) => QuestStatusKind::Verifying,
            Self::Completed(_) => QuestStatusKind::Completed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// A photo is out for verification or waiting to be re-sent.
    pub fn is_photo_in_flight(&self) -> bool {
        matches!(self, Self::PhotoPending(_) | Self::Verifying(_))
    }

    /// Apply a location update. Completed ignores it, states holding a photo
    /// only record the new distance.
    pub fn on_location_update(self, update: &LocationUpdate) -> QuestStatus {
        match self {
            Self::Available(s) => s.on_location_update(update),
            Self::InRange(s) => s.on_location_update(update),
            Self::PhotoPending(mut s) => {
                s.session_mut().record_location(update);
                Self::PhotoPending(s)
            }
            Self::Verifying(mut s) => {
                s.session_mut().record_location(update);
                Self::Verifying(s)
            }
            Self::Completed(s) => Self::Completed(s),
        }
    }

    pub fn session(&self) -> &QuestSession {
        match self {
            Self::Available(s) => s.session(),
            Self::InRange(s) => s.session(),
            Self::PhotoPending(s) => s.session(),
            Self::Verifying(s) => s.session(),
            Self::Completed(s) => s.session(),
        }
    }

    pub fn into_session(self) -> QuestSession {
        match self {
            Self::Available(s) => s.into_session(),
            Self::InRange(s) => s.into_session(),
            Self::PhotoPending(s) => s.into_session(),
            Self::Verifying(s) => s.into_session(),
            Self::Completed(s) => s.into_session(),
        }
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

/// Trait for states that hold session data and can be converted back.
pub trait HasSessionData {
    fn session(&self) -> &QuestSession;

    fn session_mut(&mut self) -> &mut QuestSession;

    fn into_session(self) -> QuestSession;
}
