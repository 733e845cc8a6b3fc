pub mod completions;
pub mod location;
pub mod quests;

pub use completions::*;
pub use location::*;
pub use quests::*;

use quest_core::CoreError;
use thiserror::Error;

use crate::infra::kv::KvError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("local storage failure: {0}")]
    Persistence(#[from] KvError),
    #[error("failed to serialize: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid quest: {0}")]
    InvalidQuest(#[from] CoreError),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("quest cannot be completed: {0}")]
    NotCompletable(String),
    #[error("not in range of the quest location ({} of {radius}m)", fmt_distance(.distance))]
    OutOfRange { distance: Option<f64>, radius: f64 },
    #[error("a photo is already being verified")]
    VerificationInProgress,
    #[error("quest does not take a photo")]
    PhotoNotRequired,
    #[error("quest requires a verified photo")]
    PhotoRequired,
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

fn fmt_distance(distance: &Option<f64>) -> String {
    match distance {
        Some(d) => format!("{:.0}m", d),
        None => String::from("unknown distance"),
    }
}
