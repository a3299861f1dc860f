use chrono::{DateTime, FixedOffset};
use scraper::ElementRef;
use scraper::node::Node;
use url::Url;

use crate::epub::xml_escape;
use crate::page::SkippedElement;

/// Container holding the readable part of an article.
pub const CONTENT_SELECTOR: &str = ".available-content";

/// Class the platform puts on buttons, share widgets and other decoration.
pub const DECORATION_CLASS: &str = "pencraft";

const IMAGE_ALT: &str = "placeholder";

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// An `<img>` found in the article body.
#[derive(Debug, Clone)]
pub struct ImageSlot {
    /// `src` as written in the page.
    pub source: String,
    /// `src` resolved against the page URL, if it is a fetchable http(s) URL.
    pub resolved: Option<Url>,
    original_markup: String,
}

#[derive(Debug, Clone)]
enum Fragment {
    Markup(String),
    Image(usize),
}

/// Rewritten article body whose images are still waiting for package
/// references.
#[derive(Debug, Clone, Default)]
pub struct ArticleBody {
    fragments: Vec<Fragment>,
    images: Vec<ImageSlot>,
}

impl ArticleBody {
    pub fn images(&self) -> &[ImageSlot] {
        &self.images
    }

    /// Serializes the body. Slots for which `reference_for` yields a package
    /// reference become a minimal `<img>`; the rest keep their original markup.
    pub fn render(&self, reference_for: impl Fn(&ImageSlot) -> Option<String>) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Markup(markup) => out.push_str(markup),
                Fragment::Image(idx) => {
                    let slot = &self.images[*idx];
                    match reference_for(slot) {
                        Some(reference) => out.push_str(&format!(
                            "<img src=\"{}\" alt=\"{IMAGE_ALT}\" />",
                            xml_escape(&reference)
                        )),
                        None => out.push_str(&slot.original_markup),
                    }
                }
            }
        }
        out
    }

    fn push_markup(&mut self, markup: &str) {
        if let Some(Fragment::Markup(last)) = self.fragments.last_mut() {
            last.push_str(markup);
        } else {
            self.fragments.push(Fragment::Markup(markup.to_owned()));
        }
    }

    fn push_image(&mut self, slot: ImageSlot) {
        self.fragments.push(Fragment::Image(self.images.len()));
        self.images.push(slot);
    }
}

/// Rewrites the first article container of a page into an [`ArticleBody`].
#[derive(Debug)]
pub struct ContentTransformer {
    base_url: Url,
    body: Option<ArticleBody>,
    skipped: Vec<SkippedElement>,
}

impl ContentTransformer {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            body: None,
            skipped: Vec::new(),
        }
    }

    pub fn on_element(&mut self, element: ElementRef<'_>) {
        if self.body.is_some() {
            self.skipped.push(SkippedElement::new(
                CONTENT_SELECTOR,
                "article body already captured; ignoring additional container",
            ));
            return;
        }

        let mut body = ArticleBody::default();
        self.write_children(element, &mut body);
        tracing::debug!(images = body.images.len(), "captured article body");
        self.body = Some(body);
    }

    pub fn finish(self) -> (Option<ArticleBody>, Vec<SkippedElement>) {
        (self.body, self.skipped)
    }

    fn write_children(&mut self, parent: ElementRef<'_>, body: &mut ArticleBody) {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) => body.push_markup(&xml_escape(&text.text)),
                Node::Element(_) => {
                    if let Some(element) = ElementRef::wrap(child) {
                        self.write_element(element, body);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(&mut self, element: ElementRef<'_>, body: &mut ArticleBody) {
        let value = element.value();
        if value.classes().any(|class| class == DECORATION_CLASS) {
            return;
        }

        match value.name() {
            "source" => {
                let text = element.text().collect::<String>();
                body.push_markup(&xml_escape(&text));
            }
            "script" => {}
            "img" => {
                let slot = self.image_slot(element);
                body.push_image(slot);
            }
            name => {
                body.push_markup(&start_tag(element));
                if VOID_TAGS.contains(&name) {
                    return;
                }
                self.write_children(element, body);
                body.push_markup(&format!("</{name}>"));
            }
        }
    }

    fn image_slot(&mut self, element: ElementRef<'_>) -> ImageSlot {
        let source = element.value().attr("src").unwrap_or_default().trim();
        let resolved = if source.is_empty() {
            self.skipped
                .push(SkippedElement::new("img", "image has no src attribute"));
            None
        } else {
            match self.base_url.join(source) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                Ok(url) => {
                    self.skipped.push(SkippedElement::new(
                        source_key(source),
                        format!("unsupported image scheme: {}", url.scheme()),
                    ));
                    None
                }
                Err(err) => {
                    self.skipped.push(SkippedElement::new(
                        source_key(source),
                        format!("resolve image src: {err}"),
                    ));
                    None
                }
            }
        };

        ImageSlot {
            source: source.to_owned(),
            resolved,
            original_markup: start_tag(element),
        }
    }
}

/// Byline block placed above the article body. The date line only appears
/// when the publish date parsed.
pub fn render_header(
    title: &str,
    author: &str,
    published: Option<DateTime<FixedOffset>>,
) -> String {
    let mut out = format!(
        "<h1>{}</h1><p>By {}",
        xml_escape(title),
        xml_escape(author)
    );
    if let Some(date) = published {
        out.push_str(&format!(
            "<em><br/>Published at {}</em>",
            format_publish_date(date)
        ));
    }
    out.push_str("</p><hr/>");
    out
}

/// `Feb 25, 2025`
pub fn format_publish_date(date: DateTime<FixedOffset>) -> String {
    date.format("%b %d, %Y").to_string()
}

fn start_tag(element: ElementRef<'_>) -> String {
    let value = element.value();
    let name = value.name();
    let mut attrs = value
        .attrs()
        .filter(|(attr, _)| is_xml_name(attr))
        .collect::<Vec<_>>();
    attrs.sort_by_key(|(attr, _)| *attr);

    let mut out = format!("<{name}");
    for (attr, attr_value) in attrs {
        out.push_str(&format!(" {attr}=\"{}\"", xml_escape(attr_value)));
    }
    if VOID_TAGS.contains(&name) {
        out.push_str(" />");
    } else {
        out.push('>');
    }
    out
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn source_key(source: &str) -> String {
    if source.len() > 120 {
        let cut = source
            .char_indices()
            .nth(120)
            .map_or(source.len(), |(idx, _)| idx);
        format!("img[src={}…]", &source[..cut])
    } else {
        format!("img[src={source}]")
    }
}
