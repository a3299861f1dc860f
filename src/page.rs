use scraper::{ElementRef, Html, Selector};

/// A page element that a handler could not use. The scrape carries on
/// without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedElement {
    /// Selector or source URL identifying the element.
    pub element: String,
    pub reason: String,
}

impl SkippedElement {
    pub fn new(element: impl Into<String>, reason: impl Into<String>) -> Self {
        let skipped = Self {
            element: element.into(),
            reason: reason.into(),
        };
        tracing::warn!(element = %skipped.element, reason = %skipped.reason, "skipping element");
        skipped
    }
}

struct Matcher<'a> {
    name: &'static str,
    selector: Selector,
    handler: Box<dyn FnMut(ElementRef<'_>) + 'a>,
}

/// Ordered list of selector/handler pairs evaluated in a single synchronous
/// walk over the document.
///
/// Elements are visited in document order. When several matchers accept the
/// same element they run in registration order.
#[derive(Default)]
pub struct PageWalker<'a> {
    matchers: Vec<Matcher<'a>>,
}

impl<'a> PageWalker<'a> {
    pub fn new() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    pub fn on(
        mut self,
        name: &'static str,
        selector: &str,
        handler: impl FnMut(ElementRef<'_>) + 'a,
    ) -> anyhow::Result<Self> {
        let selector = Selector::parse(selector)
            .map_err(|err| anyhow::anyhow!("parse selector for {name} ({selector}): {err:?}"))?;
        self.matchers.push(Matcher {
            name,
            selector,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    /// Parses `html` and feeds every matching element to its handlers.
    /// Returns how many times handlers fired.
    pub fn walk(mut self, html: &str) -> usize {
        let document = Html::parse_document(html);
        let mut fired = 0_usize;

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            for matcher in &mut self.matchers {
                if matcher.selector.matches(&element) {
                    tracing::trace!(
                        handler = matcher.name,
                        tag = element.value().name(),
                        "matched"
                    );
                    (matcher.handler)(element);
                    fired += 1;
                }
            }
        }

        fired
    }
}
