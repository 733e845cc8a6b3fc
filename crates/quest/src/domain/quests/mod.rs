mod engine;
mod progress;
pub mod states;

pub use engine::*;
pub use progress::*;
pub use states::{CapturedPhoto, ParticipantContext, QuestSession, QuestStatus};
