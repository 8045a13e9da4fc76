//! Catalog crawler core: pure session state machine and manifest helpers.
mod config;
mod effect;
mod manifest;
mod msg;
mod sanitize;
mod state;
mod update;
mod view_model;
mod watchdog;

pub use config::CrawlConfig;
pub use effect::{Effect, PersistKind, Wake};
pub use manifest::{
    product_manifest_name, render_product_manifest, render_subcategory_manifest, summary_name,
    SubcategorySummary, LINE_SEPARATOR, NO_NEW_FILES, PRODUCT_PLACEHOLDER,
    SUBCATEGORY_MANIFEST_NAME,
};
pub use msg::Msg;
pub use sanitize::{file_name, product_name, root_category_name, sanitize};
pub use state::{
    CrawlState, OutputPath, SessionId, Stage, StagePhase, SubcategoryRecord, TabId, TabRole,
};
pub use update::{update, FINISHED_TITLE};
pub use view_model::{SessionPhase, SessionView};
pub use watchdog::{Expiry, WatchdogSet};
