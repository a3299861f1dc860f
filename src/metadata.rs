use chrono::{DateTime, FixedOffset};
use scraper::ElementRef;
use serde::{Deserialize, Deserializer};

use crate::page::SkippedElement;

/// Selector for the embedded structured-data block.
pub const METADATA_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

/// Article metadata published by the platform as JSON-LD.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleMetadata {
    pub title: String,
    pub canonical_url: String,
    pub description: String,
    /// `None` when `datePublished` is absent or not strict RFC 3339.
    pub published_at: Option<DateTime<FixedOffset>>,
    pub is_free_access: bool,
    pub author_names: Vec<String>,
    pub publisher_name: String,
}

impl ArticleMetadata {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let schema: ArticleSchema = serde_json::from_str(json.trim())?;
        Ok(schema.into())
    }

    /// Author line for the package: `"<publisher> - <first author>"`, or
    /// whichever half exists.
    pub fn author_display_name(&self) -> Option<String> {
        let publisher = self.publisher_name.trim();
        let author = self
            .author_names
            .first()
            .map(|name| name.trim())
            .unwrap_or_default();

        match (publisher.is_empty(), author.is_empty()) {
            (false, false) => Some(format!("{publisher} - {author}")),
            (false, true) => Some(publisher.to_owned()),
            (true, false) => Some(author.to_owned()),
            (true, true) => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        let title = self.title.trim();
        (!title.is_empty()).then_some(title)
    }

    pub fn canonical_url(&self) -> Option<&str> {
        let url = self.canonical_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Collects metadata from every JSON-LD block seen during a page walk. The
/// last block that parses wins.
#[derive(Debug, Default)]
pub struct MetadataExtractor {
    metadata: Option<ArticleMetadata>,
    blocks_seen: usize,
    skipped: Vec<SkippedElement>,
}

impl MetadataExtractor {
    pub fn on_element(&mut self, element: ElementRef<'_>) {
        self.blocks_seen += 1;
        let text = element.text().collect::<String>();
        match ArticleMetadata::from_json(&text) {
            Ok(metadata) => {
                tracing::debug!(title = %metadata.title, "found ld+json metadata");
                self.metadata = Some(metadata);
            }
            Err(err) => {
                let key = format!("{METADATA_SELECTOR}#{}", self.blocks_seen);
                self.skipped
                    .push(SkippedElement::new(key, format!("parse ld+json: {err}")));
            }
        }
    }

    pub fn finish(self) -> (Option<ArticleMetadata>, Vec<SkippedElement>) {
        (self.metadata, self.skipped)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArticleSchema {
    headline: String,
    url: String,
    description: String,
    #[serde(rename = "datePublished")]
    date_published: String,
    #[serde(rename = "isAccessibleForFree", deserialize_with = "lenient_bool")]
    is_accessible_for_free: bool,
    #[serde(deserialize_with = "one_or_many")]
    author: Vec<SchemaPerson>,
    publisher: Option<SchemaPerson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SchemaPerson {
    name: String,
}

impl From<ArticleSchema> for ArticleMetadata {
    fn from(schema: ArticleSchema) -> Self {
        let published_at = match DateTime::parse_from_rfc3339(schema.date_published.trim()) {
            Ok(date) => Some(date),
            Err(err) => {
                if !schema.date_published.is_empty() {
                    tracing::debug!(
                        value = %schema.date_published,
                        %err,
                        "datePublished is not RFC 3339; date line disabled"
                    );
                }
                None
            }
        };

        Self {
            title: schema.headline,
            canonical_url: schema.url,
            description: schema.description,
            published_at,
            is_free_access: schema.is_accessible_for_free,
            author_names: schema
                .author
                .into_iter()
                .map(|a| a.name)
                .filter(|name| !name.trim().is_empty())
                .collect(),
            publisher_name: schema.publisher.map(|p| p.name).unwrap_or_default(),
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
        OneOrMany::Null(()) => Vec::new(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => Ok(value),
        Some(Flag::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "isAccessibleForFree must be a boolean, got {other:?}"
            ))),
        },
        None => Ok(false),
    }
}
