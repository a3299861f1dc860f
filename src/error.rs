//! Errors surfaced by a scrape.
//!
//! Only fatal conditions live here. Malformed JSON-LD blocks and images that
//! cannot be fetched are reported as [`crate::page::SkippedElement`] entries
//! instead.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The requested URL could not be parsed or is not http/https.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network level failure while fetching the article page.
    #[error("fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The article page answered with a non-success status.
    #[error("fetch {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The scrape did not finish before its deadline.
    #[error("scrape of {url} timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },

    /// The article exists but the current session cannot read it.
    #[error(
        "the article at {url} is behind a paywall; subscribe and provide a session cookie to export it"
    )]
    PaywallBlocked { url: String },

    /// The page did not match the expected layout.
    #[error("failed to extract the article at {url}: missing {}", .missing.join(", "))]
    IncompleteExtraction {
        url: String,
        missing: Vec<&'static str>,
    },

    /// The page walk could not be set up.
    #[error("inspect page: {0:#}")]
    Inspect(#[source] anyhow::Error),

    /// Writing the EPUB package failed.
    #[error("write epub package: {0:#}")]
    Serialization(#[source] anyhow::Error),
}

impl ScrapeError {
    /// Whether the failure happened while talking to the remote site.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
