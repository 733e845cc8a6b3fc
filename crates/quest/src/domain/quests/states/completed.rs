//! Completed state - the quest is recorded in the local store.

use quest_core::QuestCompletion;

use super::{HasSessionData, QuestSession};

/// Terminal state. Progress is pinned at 100 and nothing can be submitted.
#[derive(Debug, Clone)]
pub struct Completed {
    pub completion: QuestCompletion,
    pub(crate) session: QuestSession,
}

impl Completed {
    pub fn new(mut session: QuestSession, completion: QuestCompletion) -> Self {
        session.photo = None;
        Self {
            completion,
            session,
        }
    }
}

impl HasSessionData for Completed {
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
