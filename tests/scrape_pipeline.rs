mod newsletter_stub;

use std::fs;
use std::io::Read as _;
use std::path::Path;
use std::time::Duration;

use kindexport::{ScrapeError, ScrapeOptions, Scraper};
use newsletter_stub::{LOGO_PNG, NewsletterStub, SESSION_TOKEN};

fn scraper(output_dir: &Path) -> Scraper {
    Scraper::new(ScrapeOptions {
        output_dir: output_dir.to_path_buf(),
        request_timeout: Duration::from_secs(10),
        deadline: Duration::from_secs(20),
        ..ScrapeOptions::default()
    })
}

fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let file = fs::File::open(path).expect("open epub");
    let mut archive = zip::ZipArchive::new(file).expect("read epub zip");
    let mut entry = archive.by_name(name).expect("epub entry");
    let mut out = Vec::new();
    entry.read_to_end(&mut out).expect("read epub entry");
    out
}

fn first_entry_name(path: &Path) -> String {
    let file = fs::File::open(path).expect("open epub");
    let mut archive = zip::ZipArchive::new(file).expect("read epub zip");
    let first = archive.by_index(0).expect("first epub entry");
    first.name().to_owned()
}

#[tokio::test]
async fn scrape_free_article_writes_complete_package() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let output_dir = temp.path().join("output");

    let url = stub.url("/p/my-article");
    let result = scraper(&output_dir)
        .scrape(&url, None)
        .await
        .expect("scrape free article");

    assert_eq!(result.file_path, output_dir.join("My Article.epub"));
    assert!(result.file_path.is_file());
    assert_eq!(result.canonical_url, url);
    assert!(!result.is_paid_content);
    assert_eq!(result.package.title(), "My Article");
    assert_eq!(result.package.author(), "Jane Doe");
    assert_eq!(result.package.images().len(), 1);
    assert!(result.skipped.is_empty(), "{:?}", result.skipped);

    assert_eq!(first_entry_name(&result.file_path), "mimetype");

    let section = String::from_utf8(read_entry(&result.file_path, "OEBPS/text/my-article.xhtml"))
        .expect("utf-8 section");
    assert!(section.contains("<h1>My Article</h1>"), "{section}");
    assert!(section.contains("By Jane Doe"), "{section}");
    assert!(section.contains("Published at Feb 25, 2025"), "{section}");
    assert!(section.contains("<strong>world</strong>"), "{section}");
    assert!(!section.contains("Share this post"), "{section}");

    let image = &result.package.images()[0];
    assert!(image.generated_name.ends_with(".png"));
    let reference = format!("../images/{}", image.generated_name);
    assert!(section.contains(&format!("src=\"{reference}\"")), "{section}");
    assert_eq!(
        read_entry(
            &result.file_path,
            &format!("OEBPS/images/{}", image.generated_name)
        ),
        LOGO_PNG
    );

    let opf = String::from_utf8(read_entry(&result.file_path, "OEBPS/content.opf"))
        .expect("utf-8 opf");
    assert!(opf.contains(&url), "{opf}");
    assert!(opf.contains("Jane Doe"), "{opf}");
}

#[tokio::test]
async fn distinct_images_get_distinct_names_and_are_fetched_once() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");

    let result = scraper(temp.path())
        .scrape(&stub.url("/p/gallery"), None)
        .await
        .expect("scrape gallery");

    assert_eq!(result.package.author(), "Stub Weekly - Jane Doe");
    assert_eq!(result.metadata.published_at, None);

    let names = result
        .package
        .images()
        .iter()
        .map(|image| image.generated_name.clone())
        .collect::<Vec<_>>();
    assert_eq!(names.len(), 2, "{names:?}");
    assert_ne!(names[0], names[1]);
    assert!(names[0].ends_with(".png"), "{names:?}");
    assert!(names[1].ends_with(".jpg"), "{names:?}");

    assert_eq!(stub.hits("/img/logo.png"), 1);
    assert_eq!(stub.hits("/img/photo"), 1);
    assert_eq!(stub.hits("/img/missing.png"), 1);

    assert_eq!(result.skipped.len(), 1, "{:?}", result.skipped);
    assert!(result.skipped[0].element.contains("/img/missing.png"));

    let section = String::from_utf8(read_entry(&result.file_path, "OEBPS/text/gallery.xhtml"))
        .expect("utf-8 section");
    assert!(section.contains("<img src=\"/img/missing.png\" />"), "{section}");
    assert!(!section.contains("Published at"), "{section}");
    assert_eq!(section.matches("<img ").count(), 4, "{section}");
    assert_eq!(section.matches("src=\"../images/").count(), 3, "{section}");
}

#[tokio::test]
async fn missing_structured_data_is_incomplete_extraction() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");

    let err = scraper(temp.path())
        .scrape(&stub.url("/p/no-metadata"), None)
        .await
        .expect_err("page without metadata must fail");

    match err {
        ScrapeError::IncompleteExtraction { missing, .. } => {
            assert_eq!(missing, vec!["title", "author"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(fs::read_dir(temp.path()).expect("read output").next().is_none());
}

#[tokio::test]
async fn paid_article_with_paywall_notice_is_blocked_and_writes_nothing() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let output_dir = temp.path().join("output");

    let err = scraper(&output_dir)
        .scrape(&stub.url("/p/paid"), None)
        .await
        .expect_err("paid article without session must fail");

    assert!(matches!(err, ScrapeError::PaywallBlocked { .. }), "{err:?}");
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn paid_article_with_session_succeeds_as_paid_content() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");

    let result = scraper(temp.path())
        .scrape(&stub.url("/p/paid"), Some(SESSION_TOKEN))
        .await
        .expect("scrape paid article with session");

    assert!(result.is_paid_content);
    assert_eq!(result.package.title(), "Paid Post");
    assert!(result.file_path.is_file());
}

#[tokio::test]
async fn missing_permalink_falls_back_to_requested_url() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");

    let url = format!("{}?utm_source=mail", stub.url("/p/no-permalink"));
    let result = scraper(temp.path())
        .scrape(&url, None)
        .await
        .expect("scrape article without permalink");

    assert_eq!(result.canonical_url, url);
    assert_eq!(result.package.identifier(), url);
}

#[tokio::test]
async fn http_errors_and_bad_urls_fail_fast() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let scraper = scraper(temp.path());

    let err = scraper
        .scrape(&stub.url("/p/does-not-exist"), None)
        .await
        .expect_err("404 must fail");
    assert!(matches!(err, ScrapeError::HttpStatus { status: 404, .. }), "{err:?}");
    assert!(err.is_transport());

    let err = scraper
        .scrape("file:///etc/passwd", None)
        .await
        .expect_err("non-http url must fail");
    assert!(matches!(err, ScrapeError::InvalidUrl { .. }), "{err:?}");
}

#[tokio::test]
async fn scrape_gives_up_after_deadline() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");

    let err = scraper(temp.path())
        .scrape_with_deadline(&stub.url("/p/slow"), None, Duration::from_millis(300))
        .await
        .expect_err("slow page must time out");

    assert!(matches!(err, ScrapeError::Timeout { .. }), "{err:?}");
}

#[tokio::test]
async fn check_paywall_reports_access_per_session() {
    let stub = NewsletterStub::spawn();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let scraper = scraper(temp.path());

    let paid = stub.url("/p/paid");
    assert!(!scraper.check_paywall_accessible(&paid, None).await.expect("check"));
    assert!(
        scraper
            .check_paywall_accessible(&paid, Some(SESSION_TOKEN))
            .await
            .expect("check with session")
    );
    assert!(
        scraper
            .check_paywall_accessible(&stub.url("/p/my-article"), None)
            .await
            .expect("check free")
    );
    assert!(fs::read_dir(temp.path()).expect("read output").next().is_none());
}
