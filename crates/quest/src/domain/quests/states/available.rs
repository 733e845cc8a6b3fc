//! Available and InRange states - the participant is working towards the quest.

use quest_core::QuestCompletion;

use super::{CapturedPhoto, Completed, HasSessionData, PhotoPending, QuestSession, QuestStatus};
use crate::domain::location::LocationUpdate;

/// Not yet at the quest location, or the quest has no location.
#[derive(Debug, Clone)]
pub struct Available {
    pub(crate) session: QuestSession,
}

impl Available {
    pub fn from_session(session: QuestSession) -> Self {
        Self { session }
    }

    pub fn on_location_update(mut self, update: &LocationUpdate) -> QuestStatus {
        self.session.record_location(update);
        QuestStatus::from_session(self.session)
    }

    /// Caller should check `location_satisfied()` before calling this.
    pub fn into_photo_pending(mut self, photo: CapturedPhoto) -> QuestStatus {
        self.session.photo = Some(photo);
        self.session.last_rejection = None;
        QuestStatus::PhotoPending(PhotoPending::from_session(self.session))
    }

    /// Only quests without location or photo requirements complete from here.
    pub fn into_completed(self, completion: QuestCompletion) -> QuestStatus {
        QuestStatus::Completed(Completed::new(self.session, completion))
    }
}

impl HasSessionData for Available {
    fn session(&self) -> &QuestSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut QuestSession {
        &mut self.session
    }

    fn into_session(self) -> QuestSession {
        self.session
    }
}

/// Inside the geofence of a quest that has a location.
#[derive(Debug, Clone)]
pub struct InRange {
    pub(crate) session: QuestSession,
}

impl InRange {
    pub fn from_session(session: QuestSession) -> Self {
        Self { session }
    }

    pub fn on_location_update(mut self, update: &LocationUpdate) -> QuestStatus {
        self.session.record_location(update);
        QuestStatus::from_session(self.session)
    }

    pub fn into_photo_pending(mut self, photo: CapturedPhoto) -> QuestStatus {
        self.session.photo = Some(photo);
        self.session.last_rejection = None;
        QuestStatus::PhotoPending(PhotoPending::from_session(self.session))
    }

    /// Caller should check the quest needs no photo before calling this.
    pub fn into_completed(self, completion: QuestCompletion) -> QuestStatus {
        QuestStatus::Completed(Completed::new(self.session, completion))
    }
}

impl HasSessionData for InRange {
    fn session(&self) -> &QuestSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut QuestSession {
        &mut self.session
    }

    fn into_session(self) -> QuestSession {
        self.session
    }
}
