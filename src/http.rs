use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::store::{Artifact, Store};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Anything that can hand back the body behind a URL.
pub trait Source {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP source. Requests are issued one at a time; transient failures
/// (transport errors, 429, 5xx) are retried with exponential backoff.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn get_once(&self, url: &str) -> reqwest::Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl Source for HttpSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}; backing off {:.1}s",
                        url,
                        attempt + 1,
                        MAX_RETRIES,
                        e,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("Failed to fetch {}", url)))
                }
            }
        }
    }
}

fn is_retryable(e: &reqwest::Error) -> bool {
    match e.status() {
        Some(status) => status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
    }
}

/// Fetch `url` into `artifact` unless the artifact already exists.
/// Returns whether anything was downloaded.
pub async fn download_once<S: Source>(
    source: &S,
    store: &Store,
    artifact: &Artifact,
    url: &str,
) -> Result<bool> {
    let path = store.path(artifact);
    if path.exists() {
        info!("{} already exists", path.display());
        return Ok(false);
    }

    info!("Downloading {}", url);
    let body = source.get(url).await?;
    store.write_bytes(artifact, &body)?;
    info!("Downloaded {} ({} bytes)", path.display(), body.len());
    Ok(true)
}

// ── Test double ──
