use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, FixedOffset, Utc};
use zip::write::SimpleFileOptions;

/// Directory (inside `OEBPS/`) holding content documents.
const TEXT_DIR: &str = "text";
/// Directory (inside `OEBPS/`) holding image assets.
const IMAGE_DIR: &str = "images";

/// Metadata written to the package document.
#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    pub title: String,
    pub author: String,
    /// Canonical URL of the article; used as `dc:identifier`.
    pub identifier: String,
    pub description: String,
    pub published_at: Option<DateTime<FixedOffset>>,
}

/// An image relocated into the package.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub original_source: String,
    pub generated_name: String,
    bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn media_type(&self) -> &'static str {
        media_type_for_asset(&self.generated_name)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Section {
    title: String,
    file_stem: String,
    html: String,
}

/// An e-book being assembled from one scraped article.
#[derive(Debug, Clone)]
pub struct DocumentPackage {
    metadata: PackageMetadata,
    lang: String,
    sections: Vec<Section>,
    images: Vec<ImageAsset>,
    image_by_source: HashMap<String, usize>,
}

impl Default for DocumentPackage {
    fn default() -> Self {
        Self::new("en")
    }
}

impl DocumentPackage {
    /// `lang` is the BCP-47 tag used for package metadata and XHTML documents.
    pub fn new(lang: &str) -> Self {
        let lang = lang.trim();
        Self {
            metadata: PackageMetadata::default(),
            lang: if lang.is_empty() { "und" } else { lang }.to_owned(),
            sections: Vec::new(),
            images: Vec::new(),
            image_by_source: HashMap::new(),
        }
    }

    pub fn set_metadata(&mut self, metadata: PackageMetadata) {
        self.metadata = metadata;
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn author(&self) -> &str {
        &self.metadata.author
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }

    /// Reference to use from a content section for an already added image.
    pub fn image_reference(&self, source: &str) -> Option<String> {
        self.image_by_source
            .get(source)
            .map(|idx| image_reference(&self.images[*idx].generated_name))
    }

    /// Stores `bytes` as the asset for `source` and returns the reference a
    /// content section uses to point at it. Adding the same source twice keeps
    /// the first asset.
    pub fn add_image(&mut self, source: &str, bytes: Vec<u8>) -> String {
        if let Some(reference) = self.image_reference(source) {
            return reference;
        }

        let generated_name = generated_image_name(source);
        tracing::debug!(%source, %generated_name, bytes = bytes.len(), "added image");
        self.image_by_source
            .insert(source.to_owned(), self.images.len());
        self.images.push(ImageAsset {
            original_source: source.to_owned(),
            generated_name: generated_name.clone(),
            bytes,
        });
        image_reference(&generated_name)
    }

    /// Adds a content section. `html` is an XHTML fragment for the body.
    pub fn add_section(&mut self, html: &str, title: &str, file_stem: &str) {
        let file_stem = if file_stem.is_empty() {
            format!("section-{}", self.sections.len() + 1)
        } else {
            file_stem.to_owned()
        };
        self.sections.push(Section {
            title: title.to_owned(),
            file_stem,
            html: html.to_owned(),
        });
    }

    /// Writes `<output_dir>/<title>.epub`, replacing any previous file there.
    pub fn serialize(&self, output_dir: &Path) -> anyhow::Result<PathBuf> {
        let out_path = output_dir.join(format!("{}.epub", file_name_for_title(self.title())));
        self.write_to(&out_path)?;
        Ok(out_path)
    }

    pub fn write_to(&self, out_path: &Path) -> anyhow::Result<()> {
        if self.metadata.title.trim().is_empty() {
            anyhow::bail!("epub package has no title");
        }
        if self.metadata.author.trim().is_empty() {
            anyhow::bail!("epub package has no author");
        }
        if self.sections.is_empty() {
            anyhow::bail!("epub package has no content section");
        }

        if let Some(parent) = out_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create epub parent dir: {}", parent.display()))?;
        }

        let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        let out_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(out_path)
            .with_context(|| format!("open epub output: {}", out_path.display()))?;

        let mut zip = zip::ZipWriter::new(out_file);

        // `mimetype` must be the first entry and must be stored uncompressed.
        let mimetype_options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        zip.start_file("mimetype", mimetype_options)
            .context("epub start_file mimetype")?;
        zip.write_all(b"application/epub+zip")
            .context("epub write mimetype")?;

        let deflated_options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let documents = [
            ("META-INF/container.xml", render_container_xml()),
            ("OEBPS/content.opf", self.render_content_opf(&modified)),
            ("OEBPS/nav.xhtml", self.render_nav_xhtml()),
            ("OEBPS/toc.ncx", self.render_toc_ncx()),
            ("OEBPS/style.css", default_style_css().to_owned()),
        ];
        for (name, contents) in &documents {
            zip.start_file(*name, deflated_options)
                .with_context(|| format!("epub start_file {name}"))?;
            zip.write_all(contents.as_bytes())
                .with_context(|| format!("epub write {name}"))?;
        }

        for section in &self.sections {
            let xhtml = wrap_xhtml_document(&section.title, &self.lang, &section.html);
            let name = format!("OEBPS/{TEXT_DIR}/{}.xhtml", section.file_stem);
            zip.start_file(name.as_str(), deflated_options)
                .with_context(|| format!("epub start_file section: {}", section.file_stem))?;
            zip.write_all(xhtml.as_bytes())
                .with_context(|| format!("epub write section: {}", section.file_stem))?;
        }

        for image in &self.images {
            let name = format!("OEBPS/{IMAGE_DIR}/{}", image.generated_name);
            zip.start_file(name.as_str(), deflated_options)
                .with_context(|| format!("epub start_file image: {}", image.generated_name))?;
            zip.write_all(&image.bytes)
                .with_context(|| format!("epub write image: {}", image.generated_name))?;
        }

        zip.finish().context("epub finish zip")?;
        tracing::info!(path = %out_path.display(), images = self.images.len(), "wrote epub");
        Ok(())
    }

    fn render_nav_xhtml(&self) -> String {
        let lang = xml_escape(&self.lang);
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<!DOCTYPE html>\n");
        out.push_str(&format!(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{lang}\" xml:lang=\"{lang}\">\n"
        ));
        out.push_str("<head>\n");
        out.push_str(&format!(
            "  <title>{}</title>\n",
            xml_escape(&self.metadata.title)
        ));
        out.push_str("  <meta charset=\"utf-8\" />\n");
        out.push_str("</head>\n");
        out.push_str("<body>\n");
        out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
        out.push_str("    <ol>\n");
        for section in &self.sections {
            out.push_str(&format!(
                "      <li><a href=\"{TEXT_DIR}/{}.xhtml\">{}</a></li>\n",
                xml_escape(&section.file_stem),
                xml_escape(&section.title)
            ));
        }
        out.push_str("    </ol>\n");
        out.push_str("  </nav>\n");
        out.push_str("</body>\n");
        out.push_str("</html>\n");
        out
    }

    fn render_toc_ncx(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
        out.push_str("  <head>\n");
        out.push_str(&format!(
            "    <meta name=\"dtb:uid\" content=\"{}\" />\n",
            xml_escape(&self.metadata.identifier)
        ));
        out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
        out.push_str("  </head>\n");
        out.push_str(&format!(
            "  <docTitle><text>{}</text></docTitle>\n",
            xml_escape(&self.metadata.title)
        ));
        out.push_str("  <navMap>\n");
        for (idx, section) in self.sections.iter().enumerate() {
            let play = idx + 1;
            out.push_str(&format!(
                "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
            ));
            out.push_str(&format!(
                "      <navLabel><text>{}</text></navLabel>\n",
                xml_escape(&section.title)
            ));
            out.push_str(&format!(
                "      <content src=\"{TEXT_DIR}/{}.xhtml\" />\n",
                xml_escape(&section.file_stem)
            ));
            out.push_str("    </navPoint>\n");
        }
        out.push_str("  </navMap>\n");
        out.push_str("</ncx>\n");
        out
    }

    fn render_content_opf(&self, modified: &str) -> String {
        let meta = &self.metadata;
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str(&format!(
            "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
            xml_escape(&self.lang)
        ));
        out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
        out.push_str(&format!(
            "    <dc:identifier id=\"bookid\">{}</dc:identifier>\n",
            xml_escape(&meta.identifier)
        ));
        out.push_str(&format!("    <dc:title>{}</dc:title>\n", xml_escape(&meta.title)));
        out.push_str(&format!(
            "    <dc:creator>{}</dc:creator>\n",
            xml_escape(&meta.author)
        ));
        out.push_str(&format!(
            "    <dc:language>{}</dc:language>\n",
            xml_escape(&self.lang)
        ));
        if !meta.description.trim().is_empty() {
            out.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                xml_escape(&meta.description)
            ));
        }
        if let Some(published) = meta.published_at {
            out.push_str(&format!(
                "    <dc:date>{}</dc:date>\n",
                published.format("%Y-%m-%d")
            ));
        }
        out.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            xml_escape(modified)
        ));
        out.push_str("  </metadata>\n");
        out.push_str("  <manifest>\n");
        out.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
        );
        out.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
        );
        out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");

        for (idx, section) in self.sections.iter().enumerate() {
            out.push_str(&format!(
                "    <item id=\"section-{}\" href=\"{TEXT_DIR}/{}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
                idx + 1,
                xml_escape(&section.file_stem)
            ));
        }

        for (idx, image) in self.images.iter().enumerate() {
            out.push_str(&format!(
                "    <item id=\"image-{}\" href=\"{IMAGE_DIR}/{}\" media-type=\"{}\" />\n",
                idx + 1,
                xml_escape(&image.generated_name),
                image.media_type()
            ));
        }

        out.push_str("  </manifest>\n");
        out.push_str("  <spine toc=\"ncx\">\n");
        for idx in 0..self.sections.len() {
            out.push_str(&format!("    <itemref idref=\"section-{}\" />\n", idx + 1));
        }
        out.push_str("  </spine>\n");
        out.push_str("</package>\n");
        out
    }
}

/// Stable asset name for an image source: a UUIDv5 of the source plus the
/// source's extension (`jpg` when it has none).
pub fn generated_image_name(source: &str) -> String {
    let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, source.as_bytes());
    format!("{id}.{}", image_extension(source))
}

fn image_extension(source: &str) -> String {
    let path = match url::Url::parse(source) {
        Ok(url) => url.path().to_owned(),
        Err(_) => source
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    };
    let last_segment = path.rsplit('/').next().unwrap_or_default();

    match last_segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "jpg".to_owned(),
    }
}

fn image_reference(generated_name: &str) -> String {
    format!("../{IMAGE_DIR}/{generated_name}")
}

/// File name for the package. Path separators would escape the output
/// directory, so they are replaced.
fn file_name_for_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '-' } else { c })
        .collect()
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> &'static str {
    r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
h1 { line-height: 1.2; }
img { max-width: 100%; height: auto; }
hr { border: 0; border-top: 1px solid #ccc; }
blockquote { margin: 1em 0; padding: 0 1em; border-left: 4px solid #ddd; color: #333; }
"#
}

fn media_type_for_asset(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let lang = xml_escape(lang);
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{lang}\" xml:lang=\"{lang}\">\n"
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"../style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

pub(crate) fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
