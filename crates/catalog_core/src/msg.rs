use crate::{SessionId, Stage, SubcategoryRecord, TabId, TabRole, Wake};
use crate::effect::PersistKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User asked for a crawl of a root category URL.
    StartCrawl { url: String },
    /// Product paths manifested by an earlier run of the same crawl.
    RestoreProcessedProducts(Vec<String>),
    /// Host created a tab requested by `Effect::OpenTab`.
    TabOpened { role: TabRole, tab_id: TabId },
    /// Host could not create a tab.
    TabOpenFailed { role: TabRole, reason: String },
    /// Host could not navigate an existing tab.
    TabUpdateFailed {
        role: TabRole,
        url: String,
        reason: String,
    },
    /// A tab finished a navigation.
    TabLoadComplete { tab_id: TabId },
    /// A tab disappeared, whoever closed it.
    TabClosed { tab_id: TabId },
    /// Page reply of the subcategory stage.
    SubcategoriesExtracted {
        tab_id: TabId,
        records: Vec<SubcategoryRecord>,
    },
    /// Page reply of the product stage: relative product paths.
    ProductsExtracted { tab_id: TabId, products: Vec<String> },
    /// Page reply of the file stage: absolute file URLs.
    FilesExtracted {
        tab_id: TabId,
        files: Vec<String>,
        product_path: Option<String>,
    },
    /// A watchdog timer ran out.
    WatchdogExpired {
        session: SessionId,
        stage: Stage,
        generation: u64,
    },
    /// A delayed continuation is due.
    Wake { session: SessionId, wake: Wake },
    /// Completion of an `Effect::Persist`.
    Persisted { kind: PersistKind, ok: bool },
    /// Completion of an `Effect::Download`.
    Downloaded { url: String, ok: bool },
}
