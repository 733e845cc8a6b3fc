//! Verifying state - the classifier has the photo.

use quest_core::QuestCompletion;
use time::{Duration, OffsetDateTime};

use super::{Completed, HasSessionData, PhotoPending, QuestSession, QuestStatus};

/// While in this state new captures and completions are refused.
#[derive(Debug, Clone)]
pub struct Verifying {
    started_at: OffsetDateTime,
    pub(crate) session: QuestSession,
}

impl Verifying {
    pub fn from_session(session: QuestSession) -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            session,
        }
    }

    /// Time since the photo was handed to the classifier
    pub fn elapsed(&self) -> Duration {
        OffsetDateTime::now_utc() - self.started_at
    }

    pub fn into_completed(self, completion: QuestCompletion) -> QuestStatus {
        QuestStatus::Completed(Completed::new(self.session, completion))
    }

    /// The classifier said no: drop the photo and go back to where the
    /// participant was before capturing.
    pub fn into_rejected(mut self, reason: String) -> QuestStatus {
        self.session.photo = None;
        self.session.last_rejection = Some(reason);
        QuestStatus::from_session(self.session)
    }

    /// The classifier could not answer: keep the photo for a retry.
    pub fn into_failed(self) -> QuestStatus {
        QuestStatus::PhotoPending(PhotoPending::from_session(self.session))
    }
}

impl HasSessionData for Verifying {
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
