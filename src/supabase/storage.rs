use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, error};
use uuid::Uuid;

use super::{SupabaseSession, error_message};
use crate::{
    gateway::{GatewayError, ObjectStorageGateway},
    models::{AssetKey, Bucket, LocalFile},
};

/// Cache lifetime, in seconds, requested for uploaded objects.
const OBJECT_CACHE_CONTROL: &str = "3600";
const PUBLIC_OBJECT_PREFIX: &str = "storage/v1/object/public";

/// Builds `<folder>/<random-token>.<ext>`, keeping the original extension.
pub fn object_key(folder: &str, file_name: &str) -> AssetKey {
    let token = Uuid::new_v4().simple().to_string();
    let name = match file_extension(file_name) {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    };

    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        AssetKey(name)
    } else {
        AssetKey(format!("{folder}/{name}"))
    }
}

/// `https://<project>/storage/v1/object/public/<bucket>/<key>`
pub fn public_object_url(base_url: &str, bucket: Bucket, key: &AssetKey) -> String {
    format!(
        "{}/{PUBLIC_OBJECT_PREFIX}/{}/{}",
        base_url.trim_end_matches('/'),
        bucket.as_str(),
        key.as_str()
    )
}

fn file_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();

    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

#[async_trait]
impl ObjectStorageGateway for SupabaseSession {
    async fn upload(
        &self,
        bucket: Bucket,
        folder: &str,
        file: &LocalFile,
    ) -> Result<AssetKey, GatewayError> {
        if file.bytes.is_empty() {
            return Err(GatewayError::upload(format!(
                "`{}` is empty",
                file.file_name
            )));
        }

        let key = object_key(folder, &file.file_name);
        let path = format!("storage/v1/object/{}/{}", bucket.as_str(), key.as_str());
        let content_type = if file.content_type.is_empty() {
            mime::APPLICATION_OCTET_STREAM.to_string()
        } else {
            file.content_type.clone()
        };

        let response = self
            .authorized(Method::POST, &path)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, format!("max-age={OBJECT_CACHE_CONTROL}"))
            .header("x-upsert", "false")
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|err| {
                error!(?err, %bucket, key = %key, "storage upload request failed");
                GatewayError::upload(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = error_message(status, &body);
            error!(%bucket, key = %key, %reason, "storage rejected upload");
            return Err(GatewayError::upload(reason));
        }

        debug!(%bucket, key = %key, bytes = file.bytes.len(), "object stored");
        Ok(key)
    }

    fn public_url(&self, bucket: Bucket, key: &AssetKey) -> String {
        public_object_url(self.client.base_url(), bucket, key)
    }
}
