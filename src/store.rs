use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt as _;
use url::Url;

use crate::scrape::ScrapeResult;

/// What the caller keeps about an exported article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// `dedup_key` of the canonical URL.
    pub key: String,
    /// Other keys the article was requested under.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub title: String,
    pub file_path: PathBuf,
    pub canonical_url: String,
    pub is_paid: bool,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<FixedOffset>>,
    pub fetched_at: DateTime<Utc>,
}

impl ArticleRecord {
    pub fn from_result(requested_url: &str, result: &ScrapeResult) -> Self {
        let key = dedup_key(&result.canonical_url);
        let requested = dedup_key(requested_url);
        let aliases = if requested == key {
            Vec::new()
        } else {
            vec![requested]
        };
        Self {
            key,
            aliases,
            title: result.package.title().to_owned(),
            file_path: result.file_path.clone(),
            canonical_url: result.canonical_url.clone(),
            is_paid: result.is_paid_content,
            author: result.package.author().to_owned(),
            published_at: result.metadata.published_at,
            fetched_at: Utc::now(),
        }
    }

    /// Whether `key` names this article, canonically or through an alias.
    pub fn matches(&self, key: &str) -> bool {
        self.key == key || self.aliases.iter().any(|alias| alias == key)
    }
}

/// Key under which articles are deduplicated: `https` scheme, no query or
/// fragment, no trailing slash. Case is preserved. Input that does not parse
/// is returned as is.
pub fn dedup_key(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_owned();
    };
    if parsed.scheme() != "https" && parsed.set_scheme("https").is_err() {
        return url.to_owned();
    }
    parsed.set_query(None);
    parsed.set_fragment(None);

    let path = parsed.path().to_owned();
    if let Some(trimmed) = path.strip_suffix('/')
        && !trimmed.is_empty()
    {
        parsed.set_path(trimmed);
    }

    let mut key = parsed.to_string();
    if parsed.path() == "/" && key.ends_with('/') {
        key.pop();
    }
    key
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn find(&self, key: &str) -> anyhow::Result<Option<ArticleRecord>>;
    async fn insert(&self, record: &ArticleRecord) -> anyhow::Result<()>;
}

/// Append-only JSON lines file, one record per line.
#[derive(Debug, Clone)]
pub struct LocalFsArticleStore {
    path: PathBuf,
}

impl LocalFsArticleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ArticleStore for LocalFsArticleStore {
    async fn find(&self, key: &str) -> anyhow::Result<Option<ArticleRecord>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read store: {}", self.path.display()));
            }
        };

        let mut found = None;
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: ArticleRecord = serde_json::from_str(line).with_context(|| {
                format!("parse store line {}: {}", idx + 1, self.path.display())
            })?;
            if record.matches(key) {
                found = Some(record);
            }
        }
        Ok(found)
    }

    async fn insert(&self, record: &ArticleRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create store dir: {}", parent.display()))?;
        }

        let mut line = serde_json::to_vec(record).context("serialize article record")?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open store: {}", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("append store: {}", self.path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flush store: {}", self.path.display()))?;
        Ok(())
    }
}
