use std::sync::Arc;

use reqwest::ClientBuilder;
use reqwest::cookie::Jar;
use url::Url;

/// Cookie the platform uses to identify a logged-in reader.
pub const SESSION_COOKIE_NAME: &str = "connect.sid";

/// Installs the session cookie on a per-scrape client, scoped to the origin of
/// `target_url`. Without a token the builder is returned unchanged.
pub fn attach(builder: ClientBuilder, target_url: &Url, token: Option<&str>) -> ClientBuilder {
    match session_jar(target_url, token) {
        Some(jar) => builder.cookie_provider(jar),
        None => builder,
    }
}

/// Builds a jar holding only the session cookie for the origin of `target_url`.
pub fn session_jar(target_url: &Url, token: Option<&str>) -> Option<Arc<Jar>> {
    let token = token.map(str::trim).filter(|t| !t.is_empty())?;
    let origin = origin_url(target_url)?;

    let jar = Jar::default();
    jar.add_cookie_str(&format!("{SESSION_COOKIE_NAME}={token}; Path=/"), &origin);
    tracing::debug!(origin = %origin, "attached session cookie");
    Some(Arc::new(jar))
}

fn origin_url(url: &Url) -> Option<Url> {
    let origin = url.origin();
    if !origin.is_tuple() {
        tracing::debug!(url = %url, "url has an opaque origin; session cookie not attached");
        return None;
    }
    Url::parse(&origin.ascii_serialization()).ok()
}
