//! HTTP client for the hosted Supabase project: GoTrue for identity, Storage
//! for images and PostgREST for the `problems` table.

pub mod auth;
pub mod rest;
pub mod storage;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Url};

use crate::config::SupabaseConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared, cheaply cloneable handle on the project.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        let base_url = Url::parse(config.url.trim_end_matches('/'))
            .with_context(|| format!("invalid Supabase URL `{}`", config.url))?;

        Ok(Self {
            http,
            base_url,
            anon_key: config.anon_key.clone(),
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Gateways acting on behalf of the holder of `access_token`, or anonymously.
    pub fn session(&self, access_token: Option<String>) -> SupabaseSession {
        SupabaseSession {
            client: self.clone(),
            access_token,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.anon_key)
    }
}

/// Per-request view of the project. Row-level security on the backend sees
/// the user's token when present and the anonymous key otherwise.
#[derive(Clone)]
pub struct SupabaseSession {
    client: SupabaseClient,
    access_token: Option<String>,
}

impl SupabaseSession {
    fn authorized(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let bearer = self
            .access_token
            .as_deref()
            .unwrap_or(&self.client.anon_key);
        self.client.request(method, path).bearer_auth(bearer)
    }
}

/// Extracts the most useful message from a Supabase error body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|field| value.get(*field).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), detail)
    }
}
