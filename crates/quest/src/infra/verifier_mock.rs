use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use log::debug;
use quest_core::VerificationResult;

use super::verifier::{Error, PhotoVerifier, VerificationRequest};

/// Canned classifier answer
#[derive(Debug, Clone)]
pub enum MockVerdict {
    Verified { confidence: f64, reason: String },
    Rejected { confidence: f64, reason: String },
    Transient(String),
    Failed(String),
}

impl MockVerdict {
    pub fn verified() -> Self {
        Self::Verified {
            confidence: 0.95,
            reason: String::from("Photo matches the quest requirements"),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            confidence: 0.2,
            reason: reason.into(),
        }
    }

    fn into_result(self) -> Result<VerificationResult, Error> {
        match self {
            Self::Verified { confidence, reason } => {
                Ok(VerificationResult::verified(confidence, reason).normalized())
            }
            Self::Rejected { confidence, reason } => {
                Ok(VerificationResult::rejected(confidence, reason).normalized())
            }
            Self::Transient(msg) => Err(Error::Transient(msg)),
            Self::Failed(msg) => Err(Error::Request(msg)),
        }
    }
}

/// Deterministic in-memory classifier. Queued verdicts are answered in order,
/// once the queue is empty every call gets the default verdict.
#[derive(Clone)]
pub struct MockPhotoVerifier {
    default_verdict: MockVerdict,
    queued: Arc<RwLock<VecDeque<MockVerdict>>>,
    calls: Arc<RwLock<Vec<VerificationRequest>>>,
    delay: Option<Duration>,
}

impl MockPhotoVerifier {
    pub fn new(default_verdict: MockVerdict) -> Self {
        Self {
            default_verdict,
            queued: Arc::new(RwLock::new(VecDeque::new())),
            calls: Arc::new(RwLock::new(vec![])),
            delay: None,
        }
    }

    pub fn always_verified() -> Self {
        Self::new(MockVerdict::verified())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_verdict(&self, verdict: MockVerdict) {
        if let Ok(mut queued) = self.queued.write() {
            queued.push_back(verdict);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<VerificationRequest> {
        self.calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl Default for MockPhotoVerifier {
    fn default() -> Self {
        Self::always_verified()
    }
}

#[async_trait]
impl PhotoVerifier for MockPhotoVerifier {
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, Error> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Ok(mut calls) = self.calls.write() {
            calls.push(request);
        }

        let verdict = self
            .queued
            .write()
            .ok()
            .and_then(|mut queued| queued.pop_front())
            .unwrap_or_else(|| self.default_verdict.clone());
        debug!("mock verifier answering with {:?}", verdict);

        verdict.into_result()
    }
}
