use std::time::Duration;

use crate::{OutputPath, SessionId, Stage, TabId, TabRole};

/// Delayed continuations of the crawl loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wake {
    NextSubcategory,
    NextProduct,
}

/// What a persisted text file is, so its completion can be accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistKind {
    SubcategoryManifest,
    ProductPlaceholder { product: String },
    ProductManifest {
        product: Option<String>,
        had_files: bool,
    },
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTab {
        role: TabRole,
        url: String,
    },
    UpdateTab {
        role: TabRole,
        tab_id: TabId,
        url: String,
    },
    CloseTab {
        tab_id: TabId,
    },
    RequestExtraction {
        tab_id: TabId,
        stage: Stage,
    },
    ArmWatchdog {
        session: SessionId,
        stage: Stage,
        generation: u64,
        after: Duration,
    },
    CancelWatchdog {
        stage: Stage,
    },
    Schedule {
        session: SessionId,
        wake: Wake,
        after: Duration,
    },
    Persist {
        path: OutputPath,
        content: String,
        overwrite: bool,
        kind: PersistKind,
    },
    Download {
        url: String,
        path: OutputPath,
    },
    Notify {
        title: String,
        message: String,
    },
}
