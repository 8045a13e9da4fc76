use std::fs;
use std::path::{Path, PathBuf};

use catalog_core::OutputPath;
use catalog_engine::{ensure_output_dir, AtomicFileWriter};
use catalog_logging::{catalog_error, catalog_info, catalog_warn};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const STATE_FILENAME: &str = ".catalog_state.ron";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    saved_utc: Option<String>,
    processed_products: Vec<String>,
}

/// Product paths manifested by earlier runs into `output_dir`.
pub(crate) fn load_processed_products(output_dir: &Path) -> Vec<String> {
    let path = output_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Vec::new();
        }
        Err(err) => {
            catalog_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    let state: PersistedState = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            catalog_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    catalog_info!(
        "Loaded {} processed product(s) from {:?}",
        state.processed_products.len(),
        path
    );
    state.processed_products
}

pub(crate) fn save_processed_products(output_dir: &Path, processed: &[String]) {
    if let Err(err) = ensure_output_dir(output_dir) {
        catalog_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let state = PersistedState {
        saved_utc: Some(Utc::now().to_rfc3339()),
        processed_products: processed.to_vec(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            catalog_error!("Failed to serialize persisted state: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(PathBuf::from(output_dir));
    if let Err(err) = writer.write(&OutputPath::new([STATE_FILENAME]), &content, true) {
        catalog_error!(
            "Failed to write persisted state to {:?}: {}",
            output_dir,
            err
        );
    }
}
