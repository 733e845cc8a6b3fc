pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use config::*;
pub use domain::{
    CaptureOutcome, CapturedPhoto, Error as QuestError, LocalCompletionStore, LocationTracker,
    LocationUpdate, ParticipantContext, QuestProgressEngine, QuestStatus, TrackerEvent,
    TrackingError, VerificationOutcome, VerificationStep,
};
pub use infra::db::*;
pub use infra::file_utils::*;
pub use infra::kv::{KeyValueStore, KvError, SqliteKeyValueStore};
pub use infra::kv_memory::MemoryKeyValueStore;
pub use infra::location::{Accuracy, LocationError, LocationProvider, PermissionStatus, WatchOptions};
pub use infra::location_replay::{LocationTrack, ReplayLocationProvider, TrackPoint};
pub use infra::verifier::{
    Error as VerifierError, PhotoVerificationClient, PhotoVerifier, VerificationRequest,
};
pub use startup::*;
