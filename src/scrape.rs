use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::content::{ArticleBody, CONTENT_SELECTOR, ContentTransformer};
use crate::epub::{DocumentPackage, PackageMetadata};
use crate::error::{Result, ScrapeError};
use crate::fetch::{DEFAULT_USER_AGENT, Fetcher};
use crate::metadata::{ArticleMetadata, METADATA_SELECTOR, MetadataExtractor};
use crate::page::{PageWalker, SkippedElement};
use crate::paywall::{PAYWALL_SELECTOR, PaywallEvaluator};

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Directory receiving `<title>.epub`.
    pub output_dir: PathBuf,
    pub user_agent: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Deadline for a whole scrape, images included.
    pub deadline: Duration,
    /// BCP-47 tag for the package.
    pub lang: String,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            request_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(120),
            lang: "en".to_owned(),
        }
    }
}

/// A finished export.
#[derive(Debug)]
pub struct ScrapeResult {
    pub package: DocumentPackage,
    pub file_path: PathBuf,
    /// Canonical article URL, or the requested URL when the page declared none.
    pub canonical_url: String,
    pub is_paid_content: bool,
    pub metadata: ArticleMetadata,
    /// Elements dropped along the way without failing the scrape.
    pub skipped: Vec<SkippedElement>,
}

/// What one walk over an article page found.
#[derive(Debug)]
struct ArticlePage {
    metadata: Option<ArticleMetadata>,
    accessible: bool,
    body: Option<ArticleBody>,
    skipped: Vec<SkippedElement>,
}

impl ArticlePage {
    /// Runs metadata extraction, paywall evaluation and content
    /// transformation over `html` in a single walk.
    fn inspect(html: &str, page_url: &Url) -> anyhow::Result<Self> {
        let mut metadata = MetadataExtractor::default();
        let mut paywall = PaywallEvaluator::default();
        let mut content = ContentTransformer::new(page_url.clone());

        PageWalker::new()
            .on("metadata", METADATA_SELECTOR, |el| metadata.on_element(el))?
            .on("paywall", PAYWALL_SELECTOR, |el| paywall.on_element(el))?
            .on("content", CONTENT_SELECTOR, |el| content.on_element(el))?
            .walk(html);

        let (metadata, mut skipped) = metadata.finish();
        let (body, content_skipped) = content.finish();
        skipped.extend(content_skipped);

        Ok(Self {
            metadata,
            accessible: paywall.accessible(),
            body,
            skipped,
        })
    }
}

/// Turns article pages into EPUB packages.
///
/// Each call builds its own HTTP client and package, so one `Scraper` can
/// serve concurrent scrapes.
#[derive(Debug, Clone, Default)]
pub struct Scraper {
    options: ScrapeOptions,
}

impl Scraper {
    pub fn new(options: ScrapeOptions) -> Self {
        Self { options }
    }

    pub async fn scrape(
        &self,
        target_url: &str,
        session_token: Option<&str>,
    ) -> Result<ScrapeResult> {
        self.scrape_with_deadline(target_url, session_token, self.options.deadline)
            .await
    }

    pub async fn scrape_with_deadline(
        &self,
        target_url: &str,
        session_token: Option<&str>,
        deadline: Duration,
    ) -> Result<ScrapeResult> {
        tokio::time::timeout(deadline, self.run_scrape(target_url, session_token))
            .await
            .map_err(|_| ScrapeError::Timeout {
                url: target_url.to_owned(),
                after: deadline,
            })?
    }

    /// Fetches only enough to tell whether the current session can read the
    /// article.
    pub async fn check_paywall_accessible(
        &self,
        target_url: &str,
        session_token: Option<&str>,
    ) -> Result<bool> {
        let deadline = self.options.deadline;
        tokio::time::timeout(deadline, async {
            let url = crate::fetch::parse_target_url(target_url)?;
            let fetcher = self.fetcher(&url, session_token)?;
            let html = fetcher.page(&url).await?;

            let accessible = crate::paywall::evaluate(&html).map_err(ScrapeError::Inspect)?;
            tracing::info!(%url, accessible, "checked paywall");
            Ok::<_, ScrapeError>(accessible)
        })
        .await
        .map_err(|_| ScrapeError::Timeout {
            url: target_url.to_owned(),
            after: deadline,
        })?
    }

    async fn run_scrape(
        &self,
        target_url: &str,
        session_token: Option<&str>,
    ) -> Result<ScrapeResult> {
        let url = crate::fetch::parse_target_url(target_url)?;
        let fetcher = self.fetcher(&url, session_token)?;

        let html = fetcher.page(&url).await?;
        tracing::debug!(%url, bytes = html.len(), "fetched");

        let page = ArticlePage::inspect(&html, &url).map_err(ScrapeError::Inspect)?;
        let ArticlePage {
            metadata,
            accessible,
            body,
            mut skipped,
        } = page;

        let is_free_access = metadata.as_ref().is_some_and(|m| m.is_free_access);
        if !is_free_access && !accessible {
            tracing::info!(%url, "paywall blocked");
            return Err(ScrapeError::PaywallBlocked {
                url: target_url.to_owned(),
            });
        }

        let metadata = metadata.unwrap_or_default();
        let title = metadata.title().map(str::to_owned);
        let author = metadata.author_display_name();
        let mut missing = Vec::new();
        if title.is_none() {
            missing.push("title");
        }
        if author.is_none() {
            missing.push("author");
        }
        if body.is_none() {
            missing.push("content");
        }
        let (Some(title), Some(author), Some(body)) = (title, author, body) else {
            tracing::info!(%url, ?missing, "incomplete extraction");
            return Err(ScrapeError::IncompleteExtraction {
                url: target_url.to_owned(),
                missing,
            });
        };

        let canonical_url = metadata
            .canonical_url()
            .map_or_else(|| target_url.to_owned(), str::to_owned);

        let mut package = DocumentPackage::new(&self.options.lang);
        package.set_metadata(PackageMetadata {
            title: title.clone(),
            author: author.clone(),
            identifier: canonical_url.clone(),
            description: metadata.description.clone(),
            published_at: metadata.published_at,
        });

        let mut failed_sources = HashSet::new();
        for slot in body.images() {
            let Some(source) = slot.resolved.as_ref() else {
                continue;
            };
            if package.image_reference(source.as_str()).is_some()
                || failed_sources.contains(source.as_str())
            {
                continue;
            }
            match fetcher.image(source).await {
                Ok(bytes) => {
                    package.add_image(source.as_str(), bytes);
                }
                Err(err) => {
                    failed_sources.insert(source.as_str());
                    skipped.push(SkippedElement::new(
                        format!("img[src={}]", slot.source),
                        format!("{err:#}"),
                    ));
                }
            }
        }

        let header = crate::content::render_header(&title, &author, metadata.published_at);
        let body_html = body.render(|slot| {
            slot.resolved
                .as_ref()
                .and_then(|source| package.image_reference(source.as_str()))
        });
        let file_stem = match crate::normalize::normalize(&title) {
            stem if stem.is_empty() => "article".to_owned(),
            stem => stem,
        };
        package.add_section(&format!("{header}{body_html}"), &title, &file_stem);

        let output_dir = self.options.output_dir.clone();
        let (package, file_path) = tokio::task::spawn_blocking(move || {
            let file_path = package.serialize(&output_dir)?;
            Ok::<_, anyhow::Error>((package, file_path))
        })
        .await
        .map_err(|err| ScrapeError::Serialization(anyhow::anyhow!("epub writer task: {err}")))?
        .map_err(ScrapeError::Serialization)?;
        tracing::info!(
            %url,
            path = %file_path.display(),
            skipped = skipped.len(),
            "scrape complete"
        );

        Ok(ScrapeResult {
            package,
            file_path,
            canonical_url,
            is_paid_content: !metadata.is_free_access,
            metadata,
            skipped,
        })
    }

    fn fetcher(&self, url: &Url, session_token: Option<&str>) -> Result<Fetcher> {
        Fetcher::new(
            url,
            session_token,
            &self.options.user_agent,
            self.options.request_timeout,
        )
    }
}
