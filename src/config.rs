use std::env;

use anyhow::{Context, Result, anyhow};
use reqwest::Url;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SITE_URL: &str = "http://localhost:8080";
/// Public images may be cached for at least this long.
pub const MIN_MEDIA_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

/// Rules for proxying remote images through `/media`.
#[derive(Clone, Debug)]
pub struct MediaConfig {
    /// Only `https://<allowed_host><PUBLIC_PATH_PREFIX>...` is served.
    pub allowed_host: String,
    pub cache_ttl_secs: u64,
}

impl MediaConfig {
    pub const PUBLIC_PATH_PREFIX: &'static str = "/storage/v1/object/public/";
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    /// Origin the browser sees; used to build the OAuth return URL.
    pub site_url: String,
    pub max_upload_bytes: usize,
    pub supabase: SupabaseConfig,
    pub media: MediaConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let supabase_url = lookup("SUPABASE_URL").context("SUPABASE_URL env var is missing")?;
        let anon_key =
            lookup("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY env var is missing")?;

        let allowed_host = Url::parse(&supabase_url)
            .with_context(|| format!("SUPABASE_URL `{supabase_url}` is not a valid URL"))?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("SUPABASE_URL `{supabase_url}` has no host"))?;

        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let cache_ttl_secs =
            parse_or(&lookup, "MEDIA_CACHE_TTL_SECS", MIN_MEDIA_CACHE_TTL_SECS)?
                .max(MIN_MEDIA_CACHE_TTL_SECS);
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let site_url = lookup("SITE_URL")
            .unwrap_or_else(|| DEFAULT_SITE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            port,
            site_url,
            max_upload_bytes,
            supabase: SupabaseConfig {
                url: supabase_url,
                anon_key,
            },
            media: MediaConfig {
                allowed_host,
                cache_ttl_secs,
            },
        })
    }

    /// Where the identity provider sends the browser after sign-in.
    pub fn auth_callback_url(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {key} `{raw}`: {err}")),
        None => Ok(default),
    }
}
