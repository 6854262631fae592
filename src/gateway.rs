//! Narrow capability traits over the hosted backend.
//!
//! The submission workflow only talks to these traits, so it can run against
//! the Supabase-backed implementations in production and against in-memory
//! fakes in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AssetKey, Bucket, LocalFile, NewProblem, RecordId, SessionIdentity};

/// Failures surfaced by the external services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("sign-in could not be started: {0}")]
    AuthInitiationFailed(String),

    #[error("session lookup failed: {0}")]
    SessionLookupFailed(String),

    #[error("upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("invalid record: {0}")]
    ValidationFailed(String),

    #[error("record could not be saved: {0}")]
    PersistFailed(String),
}

impl GatewayError {
    pub fn upload(reason: impl Into<String>) -> Self {
        GatewayError::UploadFailed {
            reason: reason.into(),
        }
    }

    /// Human-readable detail without the error-kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            GatewayError::AuthInitiationFailed(reason)
            | GatewayError::SessionLookupFailed(reason)
            | GatewayError::ValidationFailed(reason)
            | GatewayError::PersistFailed(reason) => reason,
            GatewayError::UploadFailed { reason } => reason,
        }
    }
}

/// Where the browser must be sent to start the provider's sign-in flow.
#[derive(Debug, Clone)]
pub struct SignInRedirect {
    pub url: String,
    /// PKCE verifier the caller keeps until the provider redirects back.
    pub code_verifier: String,
}

/// Tokens issued once the provider redirect has been completed.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[async_trait]
pub trait IdentityGateway: Send + Sync {
    fn sign_in(&self, return_to: &str) -> Result<SignInRedirect, GatewayError>;

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionTokens, GatewayError>;

    /// `Ok(None)` means nobody is signed in; `Err` is reserved for transport faults.
    async fn current_user(&self) -> Result<Option<SessionIdentity>, GatewayError>;
}

#[async_trait]
pub trait ObjectStorageGateway: Send + Sync {
    /// Stores `file` under a fresh key inside `folder` (empty for the bucket root).
    async fn upload(
        &self,
        bucket: Bucket,
        folder: &str,
        file: &LocalFile,
    ) -> Result<AssetKey, GatewayError>;

    fn public_url(&self, bucket: Bucket, key: &AssetKey) -> String;
}

#[async_trait]
pub trait RecordStoreGateway: Send + Sync {
    async fn insert_problem(&self, record: &NewProblem) -> Result<RecordId, GatewayError>;
}

/// Shape checks shared by every record store implementation.
pub fn validate_problem(record: &NewProblem) -> Result<(), GatewayError> {
    if record.title.trim().is_empty() {
        return Err(GatewayError::ValidationFailed("title is empty".into()));
    }
    if record.text_content.trim().is_empty() {
        return Err(GatewayError::ValidationFailed("text_content is empty".into()));
    }
    if record.created_by.trim().is_empty() {
        return Err(GatewayError::ValidationFailed("created_by is missing".into()));
    }
    Ok(())
}
