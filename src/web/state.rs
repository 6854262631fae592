use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::{AppConfig, MediaConfig},
    supabase::{SupabaseClient, SupabaseSession},
};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    supabase: SupabaseClient,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let supabase =
            SupabaseClient::new(&config.supabase).context("failed to initialize Supabase client")?;
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build media HTTP client")?;

        info!(project = %supabase.base_url(), "Supabase client ready");

        Ok(Self {
            config: Arc::new(config),
            supabase,
            http,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn media_config(&self) -> &MediaConfig {
        &self.config.media
    }

    /// Gateways bound to the caller's access token, if any.
    pub fn session(&self, access_token: Option<String>) -> SupabaseSession {
        self.supabase.session(access_token)
    }

    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }
}
