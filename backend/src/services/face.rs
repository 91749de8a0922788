//! Face recognition capability. The provider is a black box: it answers
//! whether an image matches an enrolled employee and how confident it is.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("no face image supplied")]
    MissingImage,

    #[error("face provider request failed: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("face provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub matched: bool,
    /// 0-100.
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceEnrollment {
    pub face_id: String,
    pub confidence: u8,
}

#[async_trait]
pub trait FaceCapability: Send + Sync {
    async fn verify(&self, employee_id: Uuid, image: &str) -> Result<FaceMatch, FaceError>;

    async fn register(&self, employee_id: Uuid, image: &str) -> Result<FaceEnrollment, FaceError>;

    async fn delete(&self, face_id: &str) -> Result<(), FaceError>;
}

/// Deterministic provider for development and tests. Every non-empty image
/// scores the configured confidence; a match needs `confidence >= threshold`.
pub struct MockFaceProvider {
    confidence: AtomicU8,
    threshold: u8,
}

impl MockFaceProvider {
    pub fn new(threshold: u8) -> Self {
        Self {
            confidence: AtomicU8::new(92),
            threshold,
        }
    }

    /// Score returned by subsequent verifications.
    pub fn set_confidence(&self, confidence: u8) {
        self.confidence.store(confidence.min(100), Ordering::Relaxed);
    }
}

impl Default for MockFaceProvider {
    fn default() -> Self {
        Self::new(80)
    }
}

#[async_trait]
impl FaceCapability for MockFaceProvider {
    async fn verify(&self, _employee_id: Uuid, image: &str) -> Result<FaceMatch, FaceError> {
        if image.trim().is_empty() {
            return Err(FaceError::MissingImage);
        }
        let confidence = self.confidence.load(Ordering::Relaxed);
        Ok(FaceMatch {
            matched: confidence >= self.threshold,
            confidence,
        })
    }

    async fn register(&self, employee_id: Uuid, image: &str) -> Result<FaceEnrollment, FaceError> {
        if image.trim().is_empty() {
            return Err(FaceError::MissingImage);
        }
        Ok(FaceEnrollment {
            face_id: format!("mock-face-{employee_id}"),
            confidence: 98,
        })
    }

    async fn delete(&self, _face_id: &str) -> Result<(), FaceError> {
        Ok(())
    }
}

/// Talks to a remote recognition service over JSON/HTTP.
///
/// Expected endpoints: `POST {base}/verify`, `POST {base}/faces`,
/// `DELETE {base}/faces/{face_id}`. The remote confidence is a float in
/// 0-100; the match decision is made locally against `threshold`.
pub struct HttpFaceProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    threshold: u8,
}

#[derive(Serialize)]
struct FaceRequest<'a> {
    employee_id: Uuid,
    image: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    confidence: f64,
}

#[derive(Deserialize)]
struct RegisterResponse {
    face_id: String,
    confidence: f64,
}

impl HttpFaceProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        threshold: u8,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            threshold,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

fn to_score(raw: f64) -> Result<u8, FaceError> {
    if !(0.0..=100.0).contains(&raw) {
        return Err(FaceError::InvalidResponse(format!("confidence {raw} out of range")));
    }
    Ok(raw.round() as u8)
}

#[async_trait]
impl FaceCapability for HttpFaceProvider {
    async fn verify(&self, employee_id: Uuid, image: &str) -> Result<FaceMatch, FaceError> {
        if image.trim().is_empty() {
            return Err(FaceError::MissingImage);
        }
        let body: VerifyResponse = self
            .authorize(self.client.post(format!("{}/verify", self.base_url)))
            .json(&FaceRequest { employee_id, image })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let confidence = to_score(body.confidence)?;
        Ok(FaceMatch {
            matched: confidence >= self.threshold,
            confidence,
        })
    }

    async fn register(&self, employee_id: Uuid, image: &str) -> Result<FaceEnrollment, FaceError> {
        if image.trim().is_empty() {
            return Err(FaceError::MissingImage);
        }
        let body: RegisterResponse = self
            .authorize(self.client.post(format!("{}/faces", self.base_url)))
            .json(&FaceRequest { employee_id, image })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(FaceEnrollment {
            face_id: body.face_id,
            confidence: to_score(body.confidence)?,
        })
    }

    async fn delete(&self, face_id: &str) -> Result<(), FaceError> {
        self.authorize(self.client.delete(format!("{}/faces/{face_id}", self.base_url)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
