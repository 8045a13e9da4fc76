//! Plain-text manifests written during a crawl. Lines are CRLF-joined.

use std::collections::HashMap;

use crate::SubcategoryRecord;

pub const LINE_SEPARATOR: &str = "\r\n";

pub const SUBCATEGORY_MANIFEST_NAME: &str = "subcategories.txt";

pub const PRODUCT_PLACEHOLDER: &str =
    "Folder created automatically for this product. Files will be listed here if found.";

pub const NO_NEW_FILES: &str =
    "No new files for this product (only URLs already downloaded by other products).";

pub fn product_manifest_name(product: &str) -> String {
    format!("files_{product}.txt")
}

pub fn summary_name(subcategory: &str) -> String {
    format!("summary_{subcategory}.txt")
}

/// `label -> href`, one per line, in crawl order.
pub fn render_subcategory_manifest(records: &[SubcategoryRecord]) -> String {
    records
        .iter()
        .map(|record| format!("{} -> {}", record.label, record.href))
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR)
}

/// Body of a per-product manifest; `lines` are `filename -> url` entries.
pub fn render_product_manifest(lines: &[String]) -> String {
    if lines.is_empty() {
        NO_NEW_FILES.to_string()
    } else {
        lines.join(LINE_SEPARATOR)
    }
}

/// Product accounting of one subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubcategorySummary {
    pub total_products: usize,
    /// Products whose manifest was written, whether or not it lists files.
    pub products_with_files: usize,
    pub products_without_files: Vec<String>,
}

impl SubcategorySummary {
    /// Recomputes the counts from the frozen product list and the processed map.
    pub fn compute(all_products: &[String], processed: &HashMap<String, bool>) -> Self {
        let mut summary = Self {
            total_products: all_products.len(),
            ..Self::default()
        };
        for product in all_products {
            if processed.get(product).copied().unwrap_or(false) {
                summary.products_with_files += 1;
            } else {
                summary.products_without_files.push(product.clone());
            }
        }
        summary
    }

    pub fn render(&self, category: &str, subcategory: &str, origin: &str) -> String {
        let mut lines = vec![
            format!("Category: {category}"),
            format!("Subcategory: {subcategory}"),
            format!("Total products found: {}", self.total_products),
            format!("Products with manifest: {}", self.products_with_files),
            format!(
                "Products without manifest: {}",
                self.products_without_files.len()
            ),
        ];
        if !self.products_without_files.is_empty() {
            lines.push("Products without manifest:".to_string());
            for (idx, product) in self.products_without_files.iter().enumerate() {
                lines.push(format!("{}. {origin}{product}", idx + 1));
            }
        }
        lines.join(LINE_SEPARATOR)
    }
}
