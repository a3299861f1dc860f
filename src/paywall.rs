use scraper::ElementRef;

use crate::page::PageWalker;

/// Element the platform renders in place of truncated paid content.
pub const PAYWALL_SELECTOR: &str = ".paywall-title";

/// Text of the paywall notice when the reader lacks access.
pub const PAYWALL_NOTICE: &str = "This post is for paid subscribers";

/// Tracks whether a paywall notice was seen. Optimistic: a page is
/// accessible until an element's text is exactly the notice.
#[derive(Debug, Clone, Copy)]
pub struct PaywallEvaluator {
    accessible: bool,
}

impl Default for PaywallEvaluator {
    fn default() -> Self {
        Self { accessible: true }
    }
}

impl PaywallEvaluator {
    pub fn on_element(&mut self, element: ElementRef<'_>) {
        let text = element.text().collect::<String>();
        if is_paywall_notice(&text) {
            tracing::debug!("found paywall notice");
            self.accessible = false;
        }
    }

    pub fn accessible(&self) -> bool {
        self.accessible
    }
}

pub fn is_paywall_notice(text: &str) -> bool {
    text == PAYWALL_NOTICE
}

/// Runs the evaluator alone over `html`.
pub fn evaluate(html: &str) -> anyhow::Result<bool> {
    let mut evaluator = PaywallEvaluator::default();
    PageWalker::new()
        .on("paywall", PAYWALL_SELECTOR, |el| evaluator.on_element(el))?
        .walk(html);
    Ok(evaluator.accessible())
}
