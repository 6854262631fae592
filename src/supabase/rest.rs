use async_trait::async_trait;
use reqwest::Method;
use tracing::{error, info};

use super::{SupabaseSession, error_message};
use crate::{
    gateway::{GatewayError, RecordStoreGateway, validate_problem},
    models::{NewProblem, ProblemRow, RecordId},
};

const PROBLEMS_TABLE: &str = "rest/v1/problems";

#[async_trait]
impl RecordStoreGateway for SupabaseSession {
    async fn insert_problem(&self, record: &NewProblem) -> Result<RecordId, GatewayError> {
        validate_problem(record)?;

        let response = self
            .authorized(Method::POST, PROBLEMS_TABLE)
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await
            .map_err(|err| {
                error!(?err, "problem insert request failed");
                GatewayError::PersistFailed(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = error_message(status, &body);
            error!(%reason, "record store rejected problem");
            return Err(GatewayError::PersistFailed(reason));
        }

        let rows: Vec<ProblemRow> = response
            .json()
            .await
            .map_err(|err| GatewayError::PersistFailed(format!("unexpected response: {err}")))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::PersistFailed("store returned no row".into()))?;

        info!(id = %row.id, created_at = ?row.created_at, "problem row inserted");
        Ok(row.id)
    }
}
