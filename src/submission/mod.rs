//! Question submission: validation, image upload and record creation for one
//! press of the "post" button.
//!
//! The flow is an explicit state machine. Each attempt gets its own
//! [`SubmissionWorkflow`]; a failed attempt is retried by starting a new one.
//! Uploads run strictly in attachment order. When a later step fails the
//! already-uploaded objects are left in storage; nothing deletes them.

use std::{fmt, future::Future};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    gateway::{GatewayError, IdentityGateway, ObjectStorageGateway, RecordStoreGateway},
    models::{
        Bucket, Category, Difficulty, LocalFile, NewProblem, RecordId, SessionIdentity,
        UploadedAsset,
    },
};

/// Storage folder used for images attached to new questions.
pub const QUESTION_IMAGE_FOLDER: &str = "questions";

/// Everything the author typed and attached before pressing submit.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDraft {
    pub title: String,
    pub body: String,
    pub difficulty: Difficulty,
    pub category: Category,
    pub files: Vec<LocalFile>,
}

impl SubmissionDraft {
    fn missing_required_field(&self) -> bool {
        self.title.trim().is_empty() || self.body.trim().is_empty()
    }
}

/// Steps that can end an attempt with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    UploadingAssets,
    PersistingRecord,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::UploadingAssets => "uploading_assets",
            Stage::PersistingRecord => "persisting_record",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ValidationFailed,
    AuthRequired,
    SessionLookupFailed,
    UploadFailed,
    PersistFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

impl SubmissionFailure {
    fn new(stage: Stage, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            reason: reason.into(),
        }
    }

    fn from_gateway(stage: Stage, err: &GatewayError) -> Self {
        let kind = match err {
            GatewayError::ValidationFailed(_) => FailureKind::ValidationFailed,
            GatewayError::UploadFailed { .. } => FailureKind::UploadFailed,
            GatewayError::SessionLookupFailed(_) => FailureKind::SessionLookupFailed,
            GatewayError::AuthInitiationFailed(_) => FailureKind::AuthRequired,
            GatewayError::PersistFailed(_) => FailureKind::PersistFailed,
        };
        Self::new(stage, kind, err.reason())
    }

    /// Message shown under the form.
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::ValidationFailed => {
                "タイトルと質問内容を入力してください".to_string()
            }
            FailureKind::AuthRequired => "ログインが必要です".to_string(),
            FailureKind::SessionLookupFailed => {
                "ログイン状態を確認できませんでした。時間をおいて再度お試しください".to_string()
            }
            FailureKind::UploadFailed => {
                format!("画像のアップロードに失敗しました: {}", self.reason)
            }
            FailureKind::PersistFailed => format!("投稿に失敗しました: {}", self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Editing,
    Validating,
    UploadingAssets { done: usize, total: usize },
    PersistingRecord,
    Succeeded(RecordId),
    Failed(SubmissionFailure),
    /// The hosting view went away; results that arrive afterwards are dropped.
    Abandoned,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Succeeded(_) | SubmissionState::Failed(_) | SubmissionState::Abandoned
        )
    }

    fn permits(&self, next: &SubmissionState) -> bool {
        use SubmissionState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Abandoned) => true,
            (Editing, Validating) => true,
            (Validating, UploadingAssets { done: 0, .. }) => true,
            (Validating, Failed(failure)) => matches!(
                failure.stage,
                Stage::Validating | Stage::UploadingAssets
            ),
            (UploadingAssets { done, total }, UploadingAssets { done: after, total: t }) => {
                t == total && *after == done + 1 && after <= total
            }
            (UploadingAssets { done, total }, PersistingRecord) => done == total,
            (UploadingAssets { .. }, Failed(failure)) => failure.stage == Stage::UploadingAssets,
            (PersistingRecord, Succeeded(_)) => true,
            (PersistingRecord, Failed(failure)) => failure.stage == Stage::PersistingRecord,
            _ => false,
        }
    }
}

/// Drives one submission attempt against the three gateways.
pub struct SubmissionWorkflow<'a> {
    identity: &'a dyn IdentityGateway,
    storage: &'a dyn ObjectStorageGateway,
    records: &'a dyn RecordStoreGateway,
    bucket: Bucket,
    folder: &'a str,
    cancel: CancellationToken,
    state: SubmissionState,
    history: Vec<SubmissionState>,
    uploaded: Vec<UploadedAsset>,
}

impl<'a> SubmissionWorkflow<'a> {
    pub fn new(
        identity: &'a dyn IdentityGateway,
        storage: &'a dyn ObjectStorageGateway,
        records: &'a dyn RecordStoreGateway,
    ) -> Self {
        Self {
            identity,
            storage,
            records,
            bucket: Bucket::ProblemImages,
            folder: QUESTION_IMAGE_FOLDER,
            cancel: CancellationToken::new(),
            state: SubmissionState::Editing,
            history: vec![SubmissionState::Editing],
            uploaded: Vec::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Every state visited so far, starting with `Editing`.
    pub fn history(&self) -> &[SubmissionState] {
        &self.history
    }

    /// Assets stored during this attempt, including ones orphaned by a later failure.
    pub fn uploaded(&self) -> &[UploadedAsset] {
        &self.uploaded
    }

    /// Runs the attempt to a terminal state and returns it.
    pub async fn submit(&mut self, draft: SubmissionDraft) -> &SubmissionState {
        if self.state != SubmissionState::Editing {
            warn!(state = ?self.state, "submission attempt already used");
            return &self.state;
        }

        self.transition(SubmissionState::Validating);
        if draft.missing_required_field() {
            self.fail(
                Stage::Validating,
                FailureKind::ValidationFailed,
                "missing required field",
            );
            return &self.state;
        }

        let Some(lookup) = self.until_abandoned(self.identity.current_user()).await else {
            return self.abandon();
        };
        let author = match lookup {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                self.fail(
                    Stage::UploadingAssets,
                    FailureKind::AuthRequired,
                    "not authenticated",
                );
                return &self.state;
            }
            Err(err) => {
                warn!(?err, "could not resolve the current user");
                self.fail_with(Stage::UploadingAssets, &err);
                return &self.state;
            }
        };

        let Some(image_urls) = self.upload_all(&draft.files).await else {
            return &self.state;
        };

        self.transition(SubmissionState::PersistingRecord);
        let record = build_record(draft, image_urls, &author);
        let Some(inserted) = self.until_abandoned(self.records.insert_problem(&record)).await
        else {
            return self.abandon();
        };
        match inserted {
            Ok(id) => {
                info!(record_id = %id, images = record.image_urls.len(), "question posted");
                self.transition(SubmissionState::Succeeded(id));
            }
            Err(err) => {
                if !self.uploaded.is_empty() {
                    warn!(
                        orphaned = self.uploaded.len(),
                        "record insert failed after uploads; assets stay in storage"
                    );
                }
                self.fail_with(Stage::PersistingRecord, &err);
            }
        }
        &self.state
    }

    /// Uploads files in order, returning their public URLs, or `None` once the
    /// attempt has reached a terminal state.
    async fn upload_all(&mut self, files: &[LocalFile]) -> Option<Vec<String>> {
        let total = files.len();
        self.transition(SubmissionState::UploadingAssets { done: 0, total });

        let mut urls = Vec::with_capacity(total);
        for (index, file) in files.iter().enumerate() {
            let Some(result) = self
                .until_abandoned(self.storage.upload(self.bucket, self.folder, file))
                .await
            else {
                self.abandon();
                return None;
            };
            match result {
                Ok(key) => {
                    let public_url = self.storage.public_url(self.bucket, &key);
                    debug!(index, key = %key, "asset uploaded");
                    urls.push(public_url.clone());
                    self.uploaded.push(UploadedAsset { key, public_url });
                    self.transition(SubmissionState::UploadingAssets {
                        done: index + 1,
                        total,
                    });
                }
                Err(err) => {
                    warn!(
                        ?err,
                        index,
                        file = %file.file_name,
                        orphaned = self.uploaded.len(),
                        "asset upload failed; aborting remaining uploads"
                    );
                    self.fail_with(Stage::UploadingAssets, &err);
                    return None;
                }
            }
        }
        Some(urls)
    }

    async fn until_abandoned<F>(&self, call: F) -> Option<F::Output>
    where
        F: Future,
    {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = call => Some(output),
        }
    }

    fn abandon(&mut self) -> &SubmissionState {
        info!(state = ?self.state, "submission abandoned");
        self.transition(SubmissionState::Abandoned);
        &self.state
    }

    fn fail(&mut self, stage: Stage, kind: FailureKind, reason: &str) {
        self.transition(SubmissionState::Failed(SubmissionFailure::new(
            stage, kind, reason,
        )));
    }

    fn fail_with(&mut self, stage: Stage, err: &GatewayError) {
        self.transition(SubmissionState::Failed(SubmissionFailure::from_gateway(
            stage, err,
        )));
    }

    fn transition(&mut self, next: SubmissionState) {
        debug_assert!(
            self.state.permits(&next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "submission transition");
        self.history.push(next.clone());
        self.state = next;
    }
}

fn build_record(
    draft: SubmissionDraft,
    image_urls: Vec<String>,
    author: &SessionIdentity,
) -> NewProblem {
    NewProblem {
        title: draft.title,
        text_content: draft.body,
        image_urls,
        difficulty: draft.difficulty,
        category: draft.category,
        created_by: author.id.clone(),
    }
}
