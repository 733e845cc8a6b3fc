use std::{fs, path::Path};

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, error};
use mime::APPLICATION_JSON;
use quest_core::VerificationResult;
use reqwest_middleware::{
    reqwest::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Response, StatusCode, Url,
    },
    ClientWithMiddleware,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const VERIFY_PHOTO_PATH: &str = "/functions/v1/verify-quest-photo";

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem sending request to photo classifier: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending request to photo classifier: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("problem requesting photo classifier: {0}")]
    Request(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("photo classifier temporarily unavailable: {0}")]
    Transient(String),
    #[error("invalid response from photo classifier: {0}")]
    InvalidResponse(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::Send(_) | Error::SendRetry(_)
        )
    }
}

/// Body sent to the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub photo_base64: String,
    /// The quest description, used as the prompt the photo is judged against
    pub quest_requirements: String,
}

impl VerificationRequest {
    pub fn from_photo(photo: &[u8], quest_requirements: impl Into<String>) -> Self {
        Self {
            photo_base64: BASE64.encode(photo),
            quest_requirements: quest_requirements.into(),
        }
    }
}

#[async_trait]
pub trait PhotoVerifier: Send + Sync {
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, Error>;
}

#[derive(Clone)]
pub struct PhotoVerificationClient {
    pub base_url: Url,
    pub client: ClientWithMiddleware,
    api_key: SecretString,
}

impl PhotoVerificationClient {
    pub fn new(client: ClientWithMiddleware, base_url: &Url, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.to_owned(),
            client,
            api_key,
        }
    }

    async fn send_request(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<Response, Error> {
        let mut request = self
            .client
            .request(method, url)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header(CONTENT_TYPE, APPLICATION_JSON.to_string());

        if let Some(b) = body {
            request = request.body(b);
        }

        let response = request.send().await.map_err(|e| {
            error!("error sending to photo classifier: {}", e);
            Error::SendRetry(e)
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::BAD_REQUEST {
            Err(Error::BadRequest(
                response
                    .text()
                    .await
                    .unwrap_or(String::from("bad request to photo classifier")),
            ))
        } else if status == StatusCode::SERVICE_UNAVAILABLE
            || status == StatusCode::BAD_GATEWAY
            || status == StatusCode::GATEWAY_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Transient(format!(
                "error response from photo classifier with status {}: {:?}",
                status, body
            )))
        } else {
            let body = response.text().await?;
            Err(Error::Request(format!(
                "error response from photo classifier with status {}: {:?}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl PhotoVerifier for PhotoVerificationClient {
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, Error> {
        debug!(
            "verifying photo ({} base64 bytes) against: {}",
            request.photo_base64.len(),
            request.quest_requirements
        );
        let url = self
            .base_url
            .join(VERIFY_PHOTO_PATH)
            .map_err(|e| Error::Request(e.to_string()))?;

        let body = serde_json::to_vec(&request)
            .map_err(|e| Error::Request(format!("Failed to serialize request: {}", e)))?;

        let response = self.send_request(Method::POST, url, Some(body)).await?;
        let text = response.text().await?;
        parse_verification_response(&text)
    }
}

/// Missing fields fall back to an unverified result, confidence is clamped to [0, 1].
pub fn parse_verification_response(body: &str) -> Result<VerificationResult, Error> {
    serde_json::from_str::<VerificationResult>(body)
        .map(VerificationResult::normalized)
        .map_err(|e| Error::InvalidResponse(format!("{}: {:?}", e, body)))
}

pub fn get_api_key(file_path: &str) -> Result<SecretString, anyhow::Error> {
    if !Path::new(file_path).exists() {
        return Err(anyhow!("api key file not found: {}", file_path));
    }
    let contents =
        fs::read_to_string(file_path).map_err(|e| anyhow!("Failed to read api key file: {}", e))?;
    let key = contents.trim();
    if key.is_empty() {
        return Err(anyhow!("api key file {} is empty", file_path));
    }
    Ok(SecretString::from(key.to_string()))
}
