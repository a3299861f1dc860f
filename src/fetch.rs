use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use url::Url;

use crate::error::ScrapeError;

pub const DEFAULT_USER_AGENT: &str = concat!("kindexport/", env!("CARGO_PKG_VERSION"));

/// HTTP client for one scrape. Carries the session cookie for the target
/// origin, so it must not be shared between scrapes.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(
        target_url: &Url,
        session_token: Option<&str>,
        user_agent: &str,
        request_timeout: Duration,
    ) -> Result<Self, ScrapeError> {
        let builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10));
        let client = crate::session::attach(builder, target_url, session_token)
            .build()
            .map_err(|source| ScrapeError::Transport {
                url: target_url.to_string(),
                source,
            })?;
        Ok(Self { client })
    }

    /// Fetches the article page body. Non-success statuses are errors.
    pub async fn page(&self, url: &Url) -> Result<String, ScrapeError> {
        tracing::info!(%url, "visiting");
        let transport = |source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(transport)
    }

    /// Downloads an image for the package.
    pub async fn image(&self, url: &Url) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "image/*,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: HTTP {}", status.as_u16());
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;
        if bytes.is_empty() {
            anyhow::bail!("GET {url}: empty body");
        }
        Ok(bytes.to_vec())
    }
}

/// Parses a user-supplied article URL; only http/https are accepted.
pub fn parse_target_url(input: &str) -> Result<Url, ScrapeError> {
    let url = Url::parse(input.trim()).map_err(|err| ScrapeError::InvalidUrl {
        url: input.to_owned(),
        reason: err.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScrapeError::InvalidUrl {
            url: input.to_owned(),
            reason: format!("scheme must be http or https, got {}", url.scheme()),
        });
    }
    Ok(url)
}
