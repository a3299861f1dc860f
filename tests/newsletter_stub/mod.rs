#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub static LOGO_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

pub static PHOTO_JPG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F', 0, 0xFF, 0xD9];

pub const SESSION_TOKEN: &str = "s%3Astub-session";

/// Newsletter-like site serving a handful of article layouts.
///
/// - `/p/my-article`: free article with one image.
/// - `/p/gallery`: free article with two images, a repeated one and one that 404s.
/// - `/p/share-link`: free article whose canonical URL is `/p/shared`.
/// - `/p/paid`: paid article; shows the paywall notice unless the
///   `connect.sid` cookie is sent.
/// - `/p/no-metadata`: article body without a JSON-LD block.
/// - `/p/no-permalink`: JSON-LD block without a `url`.
/// - `/p/slow`: answers after two seconds.
pub struct NewsletterStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

enum Body {
    Text(String),
    Bytes(&'static [u8]),
}

impl NewsletterStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start newsletter stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = {
            let base_url = base_url.clone();
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    let request = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(req)) => req,
                        Ok(None) => continue,
                        Err(_) => break,
                    };

                    let url = request.url().to_string();
                    let path = url.split('?').next().unwrap_or(&url).to_owned();
                    requests.lock().expect("lock requests").push(path.clone());

                    let has_session = request.headers().iter().any(|header| {
                        header.field.equiv("Cookie")
                            && header
                                .value
                                .as_str()
                                .contains(&format!("connect.sid={SESSION_TOKEN}"))
                    });

                    let (status, content_type, body) = route(&base_url, &path, has_session);
                    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type)
                        .expect("content-type header");
                    let _ = match body {
                        Body::Text(text) => request.respond(
                            tiny_http::Response::from_string(text)
                                .with_status_code(status)
                                .with_header(header),
                        ),
                        Body::Bytes(bytes) => request.respond(
                            tiny_http::Response::from_data(bytes)
                                .with_status_code(status)
                                .with_header(header),
                        ),
                    };
                }
            })
        };

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .expect("lock requests")
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

impl Drop for NewsletterStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const HTML: &str = "text/html; charset=utf-8";

fn route(base_url: &str, path: &str, has_session: bool) -> (u16, &'static str, Body) {
    match path {
        "/p/my-article" => (
            200,
            HTML,
            Body::Text(article_page(
                &ld_json(&format!(
                    r#""url": "{base_url}/p/my-article",
                    "headline": "My Article",
                    "description": "A short article",
                    "datePublished": "2025-02-25T15:01:33+00:00",
                    "isAccessibleForFree": true,
                    "author": [{{"@type": "Person", "name": "Jane Doe"}}]"#
                )),
                "",
                r#"<p>Hello <strong>world</strong>.</p>
                <div class="pencraft">Share this post</div>
                <figure><img src="/img/logo.png" alt="logo" /></figure>
                <p>Bye.</p>"#,
            )),
        ),
        "/p/gallery" => (
            200,
            HTML,
            Body::Text(article_page(
                &ld_json(&format!(
                    r#""url": "{base_url}/p/gallery",
                    "headline": "Gallery",
                    "datePublished": "not a date",
                    "isAccessibleForFree": "true",
                    "author": {{"name": "Jane Doe"}},
                    "publisher": {{"name": "Stub Weekly"}}"#
                )),
                "",
                r#"<p>Pictures.</p>
                <img src="/img/logo.png" />
                <img src="/img/photo" />
                <img src="/img/logo.png" />
                <img src="/img/missing.png" />"#,
            )),
        ),
        "/p/share-link" | "/p/shared" => (
            200,
            HTML,
            Body::Text(article_page(
                &ld_json(&format!(
                    r#""url": "{base_url}/p/shared",
                    "headline": "Shared Article",
                    "isAccessibleForFree": true,
                    "author": [{{"name": "Jane Doe"}}]"#
                )),
                "",
                "<p>Passed around.</p>",
            )),
        ),
        "/p/paid" => {
            let notice = if has_session {
                ""
            } else {
                r#"<div class="paywall"><h2 class="paywall-title">This post is for paid subscribers</h2></div>"#
            };
            (
                200,
                HTML,
                Body::Text(article_page(
                    &ld_json(&format!(
                        r#""url": "{base_url}/p/paid",
                        "headline": "Paid Post",
                        "isAccessibleForFree": false,
                        "author": [{{"name": "Jane Doe"}}],
                        "publisher": {{"name": "Stub Weekly"}}"#
                    )),
                    notice,
                    "<p>Members only.</p>",
                )),
            )
        }
        "/p/no-metadata" => (
            200,
            HTML,
            Body::Text(article_page("", "", "<p>No structured data here.</p>")),
        ),
        "/p/no-permalink" => (
            200,
            HTML,
            Body::Text(article_page(
                &ld_json(
                    r#""headline": "No Permalink",
                    "isAccessibleForFree": true,
                    "author": [{"name": "Jane Doe"}]"#,
                ),
                "",
                "<p>Body.</p>",
            )),
        ),
        "/p/slow" => {
            thread::sleep(Duration::from_secs(2));
            (200, HTML, Body::Text(article_page("", "", "<p>Late.</p>")))
        }
        "/img/logo.png" => (200, "image/png", Body::Bytes(LOGO_PNG)),
        "/img/photo" => (200, "image/jpeg", Body::Bytes(PHOTO_JPG)),
        _ => (404, "text/plain", Body::Text("not found".to_owned())),
    }
}

fn ld_json(fields: &str) -> String {
    format!(
        r#"<script type="application/ld+json">{{"@context": "https://schema.org", "@type": "NewsArticle", {fields}}}</script>"#
    )
}

fn article_page(ld_json: &str, notice: &str, content: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <title>Stub Weekly</title>
    {ld_json}
  </head>
  <body>
    <div class="post">
      <div class="available-content">{content}</div>
      {notice}
    </div>
  </body>
</html>
"#
    )
}
