pub mod db;
pub mod file_utils;
pub mod kv;
pub mod kv_memory;
pub mod location;
pub mod location_replay;
pub mod verifier;

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod verifier_mock;
