//! PhotoPending state - a photo is held and waiting to be sent to the classifier.

use quest_core::QuestCompletion;

use super::{CapturedPhoto, Completed, HasSessionData, QuestSession, QuestStatus, Verifying};

/// Entered when a photo is captured, and again when the classifier could not
/// be reached so the same photo can be re-sent.
#[derive(Debug, Clone)]
pub struct PhotoPending {
    pub(crate) session: QuestSession,
}

impl PhotoPending {
    pub fn from_session(session: QuestSession) -> Self {
        Self { session }
    }

    pub fn photo(&self) -> Option<&CapturedPhoto> {
        self.session.photo.as_ref()
    }

    /// Swap the held photo for a retake.
    pub fn replace_photo(mut self, photo: CapturedPhoto) -> QuestStatus {
        self.session.photo = Some(photo);
        QuestStatus::PhotoPending(self)
    }

    pub fn into_verifying(self) -> QuestStatus {
        QuestStatus::Verifying(Verifying::from_session(self.session))
    }

    /// Another engine recorded the quest while this photo was waiting.
    pub fn into_completed(self, completion: QuestCompletion) -> QuestStatus {
        QuestStatus::Completed(Completed::new(self.session, completion))
    }
}

impl HasSessionData for PhotoPending {
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
