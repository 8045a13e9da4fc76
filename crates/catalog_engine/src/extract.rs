//! Link extraction from catalog pages.
//!
//! Pages are static HTML here, so the carousel and pagination walking a live
//! browser would do collapses into one pass over the document.

use catalog_core::SubcategoryRecord;
use catalog_logging::catalog_debug;
use scraper::{Html, Selector};
use url::Url;

const SUBCATEGORY_LINKS: &str = ".element-nav-list-item a";
const SUBCATEGORY_LABEL: &str = "span.header__label";
const PRODUCT_CARD_LINKS: &str = "div.card.element-card.product a";
const PRODUCT_LINKS: &str = r#"a[href*="/produto/"], a[href*="/produtos/"]"#;
const ANY_LINK: &str = "a[href]";

const IGNORED_SUBCATEGORY_HREFS: &[&str] = &[
    "/pt-br/onde-encontrar/comprar/",
    "/pt-br/contato/suporte-tecnico/",
];
const EXCLUDED_PRODUCT_SEGMENTS: &[&str] = &["/comprar/", "/suporte-tecnico/"];
const FILE_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "rar", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "csv", "xml", "bin", "exe",
    "msi", "img", "iso", "txt", "tar", "gz", "7z",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFiles {
    /// Absolute file URLs in document order, without duplicates.
    pub files: Vec<String>,
    /// Path of the product page the files were found on.
    pub product_path: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PageExtractor;

impl PageExtractor {
    /// Subcategory navigation entries of a category page.
    pub fn subcategories(&self, html: &str, page_url: &Url) -> Vec<SubcategoryRecord> {
        let doc = Html::parse_document(html);
        let (Some(links), Some(label_sel)) = (selector(SUBCATEGORY_LINKS), selector(SUBCATEGORY_LABEL))
        else {
            return Vec::new();
        };
        let prefix = category_prefix(page_url.path());

        let mut records: Vec<SubcategoryRecord> = Vec::new();
        for anchor in doc.select(&links) {
            let Some(raw) = anchor.value().attr("href") else {
                continue;
            };
            let label = anchor
                .select(&label_sel)
                .next()
                .map(|node| node.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let href = normalize_href(raw, page_url);

            if IGNORED_SUBCATEGORY_HREFS.contains(&href.as_str()) {
                catalog_debug!("Ignoring navigation link '{}' -> {}", label, href);
                continue;
            }
            let in_scope = href.starts_with(&format!("{prefix}/")) || href.starts_with("/pt-br/");
            if href.is_empty()
                || label.is_empty()
                || !in_scope
                || records.iter().any(|record| record.href == href)
            {
                continue;
            }
            records.push(SubcategoryRecord::new(label, href));
        }
        records
    }

    /// Product page paths of a listing page, in document order.
    ///
    /// A page without product cards yields nothing, even when stray product
    /// links exist elsewhere.
    pub fn products(&self, html: &str, page_url: &Url) -> Vec<String> {
        let doc = Html::parse_document(html);
        let (Some(cards), Some(links)) = (selector(PRODUCT_CARD_LINKS), selector(PRODUCT_LINKS))
        else {
            return Vec::new();
        };
        if doc.select(&cards).next().is_none() {
            return Vec::new();
        }

        let mut products = Vec::new();
        for anchor in doc.select(&cards).chain(doc.select(&links)) {
            let Some(raw) = anchor.value().attr("href") else {
                continue;
            };
            if EXCLUDED_PRODUCT_SEGMENTS
                .iter()
                .any(|segment| raw.contains(segment))
            {
                continue;
            }
            let path = resolve(raw, page_url)
                .map(|url| url.path().to_string())
                .unwrap_or_else(|| raw.to_string());
            if !products.contains(&path) {
                products.push(path);
            }
        }
        products
    }

    /// Downloadable file links of a product page.
    pub fn files(&self, html: &str, page_url: &Url) -> ExtractedFiles {
        let doc = Html::parse_document(html);
        let mut files = Vec::new();
        if let Some(links) = selector(ANY_LINK) {
            for anchor in doc.select(&links) {
                let Some(raw) = anchor.value().attr("href") else {
                    continue;
                };
                if !has_file_extension(raw) {
                    continue;
                }
                let Some(url) = resolve(raw, page_url) else {
                    continue;
                };
                let url = url.to_string();
                if !files.contains(&url) {
                    files.push(url);
                }
            }
        }
        ExtractedFiles {
            files,
            product_path: page_url.path().to_string(),
        }
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// `/pt-br/{segment}` of a category path, or empty.
fn category_prefix(path: &str) -> String {
    let Some(rest) = path.strip_prefix("/pt-br/") else {
        return String::new();
    };
    let segment: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if segment.is_empty() {
        String::new()
    } else {
        format!("/pt-br/{segment}")
    }
}

/// Resolves `href` against the page origin.
fn resolve(href: &str, page_url: &Url) -> Option<Url> {
    let mut base = page_url.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base.join(href).ok()
}

/// Same-origin links become bare paths; others keep their full URL. Query and
/// fragment are dropped either way.
fn normalize_href(href: &str, page_url: &Url) -> String {
    let Some(mut url) = resolve(href, page_url) else {
        return href.to_string();
    };
    url.set_query(None);
    url.set_fragment(None);
    if url.origin() == page_url.origin() {
        url.path().to_string()
    } else {
        url.to_string()
    }
}

fn has_file_extension(href: &str) -> bool {
    href.rsplit_once('.')
        .map(|(_, ext)| {
            FILE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_prefix_takes_first_segment_after_locale() {
        assert_eq!(category_prefix("/pt-br/cameras/dome"), "/pt-br/cameras");
        assert_eq!(category_prefix("/pt-br/"), "");
        assert_eq!(category_prefix("/en/cameras"), "");
    }

    #[test]
    fn file_extension_match_is_case_insensitive_and_anchored() {
        assert!(has_file_extension("/docs/manual.PDF"));
        assert!(has_file_extension("firmware.tar.gz"));
        assert!(!has_file_extension("/docs/manual.pdf?download=1"));
        assert!(!has_file_extension("/produto/vip.1230/detalhes"));
    }
}
