use std::collections::{HashMap, HashSet};

use crate::manifest::SubcategorySummary;
use crate::view_model::{SessionPhase, SessionView};
use crate::watchdog::WatchdogSet;
use crate::CrawlConfig;

/// Host-assigned tab handle.
pub type TabId = u64;

/// Monotonic id of a crawl session; `0` means no session was ever started.
pub type SessionId = u64;

/// The three tab roles owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabRole {
    Category,
    Subcategory,
    Product,
}

impl TabRole {
    pub const ALL: [TabRole; 3] = [TabRole::Category, TabRole::Subcategory, TabRole::Product];

    /// The extraction stage whose requests go into a tab of this role.
    pub fn stage(self) -> Stage {
        match self {
            TabRole::Category => Stage::Subcategories,
            TabRole::Subcategory => Stage::Products,
            TabRole::Product => Stage::Files,
        }
    }
}

/// A watchdog-guarded unit of request/response work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Subcategories,
    Products,
    Files,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Subcategories, Stage::Products, Stage::Files];

    pub fn role(self) -> TabRole {
        match self {
            Stage::Subcategories => TabRole::Category,
            Stage::Products => TabRole::Subcategory,
            Stage::Files => TabRole::Product,
        }
    }
}

/// Lifecycle of one stage.
///
/// `Loading` means the stage's tab is navigating and the next load-complete
/// event dispatches the extraction; `AwaitingResponse` means a request is in
/// flight. Anything but `Idle` holds the stage's reentrancy lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagePhase {
    #[default]
    Idle,
    Loading,
    AwaitingResponse,
}

/// One entry of the category's subcategory list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcategoryRecord {
    pub label: String,
    pub href: String,
}

impl SubcategoryRecord {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }
}

/// Destination of a persisted file, relative to the output root.
///
/// Segments are already sanitised.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputPath {
    segments: Vec<String>,
}

impl OutputPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl std::fmt::Display for OutputPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Tabs {
    pub(crate) category: Option<TabId>,
    pub(crate) subcategory: Option<TabId>,
    pub(crate) product: Option<TabId>,
}

impl Tabs {
    pub(crate) fn get(&self, role: TabRole) -> Option<TabId> {
        match role {
            TabRole::Category => self.category,
            TabRole::Subcategory => self.subcategory,
            TabRole::Product => self.product,
        }
    }

    pub(crate) fn slot(&mut self, role: TabRole) -> &mut Option<TabId> {
        match role {
            TabRole::Category => &mut self.category,
            TabRole::Subcategory => &mut self.subcategory,
            TabRole::Product => &mut self.product,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Phases {
    subcategories: StagePhase,
    products: StagePhase,
    files: StagePhase,
}

impl Phases {
    pub(crate) fn get(&self, stage: Stage) -> StagePhase {
        match stage {
            Stage::Subcategories => self.subcategories,
            Stage::Products => self.products,
            Stage::Files => self.files,
        }
    }

    pub(crate) fn set(&mut self, stage: Stage, phase: StagePhase) {
        match stage {
            Stage::Subcategories => self.subcategories = phase,
            Stage::Products => self.products = phase,
            Stage::Files => self.files = phase,
        }
    }
}

/// The whole mutable record of the current crawl session.
///
/// A session is replaced wholesale by `Msg::StartCrawl`; only the
/// configuration and the session counter survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    pub(crate) config: CrawlConfig,
    pub(crate) session: SessionId,
    pub(crate) root_url: String,
    pub(crate) origin: String,
    pub(crate) root_category_name: String,
    pub(crate) subcategories: Vec<SubcategoryRecord>,
    pub(crate) subcategory_index: usize,
    pub(crate) subcategory_label: String,
    pub(crate) products: Vec<String>,
    pub(crate) all_products: Vec<String>,
    pub(crate) product_index: usize,
    pub(crate) product_loop_active: bool,
    pub(crate) downloaded_urls: HashSet<String>,
    pub(crate) downloaded_files: u64,
    pub(crate) resume_set: HashSet<String>,
    pub(crate) processed_this_subcategory: HashMap<String, bool>,
    pub(crate) summary: Option<SubcategorySummary>,
    pub(crate) tabs: Tabs,
    pub(crate) phases: Phases,
    pub(crate) watchdogs: WatchdogSet,
    pub(crate) finished: bool,
    pub(crate) final_message: Option<String>,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new(CrawlConfig::default())
    }
}

impl CrawlState {
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            config,
            session: 0,
            root_url: String::new(),
            origin: String::new(),
            root_category_name: String::new(),
            subcategories: Vec::new(),
            subcategory_index: 0,
            subcategory_label: String::new(),
            products: Vec::new(),
            all_products: Vec::new(),
            product_index: 0,
            product_loop_active: false,
            downloaded_urls: HashSet::new(),
            downloaded_files: 0,
            resume_set: HashSet::new(),
            processed_this_subcategory: HashMap::new(),
            summary: None,
            tabs: Tabs::default(),
            phases: Phases::default(),
            watchdogs: WatchdogSet::default(),
            finished: false,
            final_message: None,
        }
    }

    /// Fresh record for a new session; everything but the config is reset.
    pub(crate) fn reset_for_session(&mut self, root_url: String, origin: String, name: String) {
        let config = std::mem::take(&mut self.config);
        let session = self.session + 1;
        *self = Self::new(config);
        self.session = session;
        self.root_url = root_url;
        self.origin = origin;
        self.root_category_name = name;
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_active(&self) -> bool {
        self.session != 0 && !self.finished
    }

    pub fn final_message(&self) -> Option<&str> {
        self.final_message.as_deref()
    }

    pub fn root_category_name(&self) -> &str {
        &self.root_category_name
    }

    pub fn subcategories(&self) -> &[SubcategoryRecord] {
        &self.subcategories
    }

    pub fn subcategory_index(&self) -> usize {
        self.subcategory_index
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn product_index(&self) -> usize {
        self.product_index
    }

    pub fn downloaded_files(&self) -> u64 {
        self.downloaded_files
    }

    pub fn is_downloaded(&self, url: &str) -> bool {
        self.downloaded_urls.contains(url)
    }

    /// Product paths already manifested in this session.
    pub fn resume_set(&self) -> &HashSet<String> {
        &self.resume_set
    }

    pub fn subcategory_summary(&self) -> Option<&SubcategorySummary> {
        self.summary.as_ref()
    }

    pub fn stage_phase(&self, stage: Stage) -> StagePhase {
        self.phases.get(stage)
    }

    pub fn tab(&self, role: TabRole) -> Option<TabId> {
        self.tabs.get(role)
    }

    pub fn watchdog_retries(&self, stage: Stage) -> u32 {
        self.watchdogs.retries(stage)
    }

    pub fn view(&self) -> SessionView {
        let phase = if self.session == 0 {
            SessionPhase::Idle
        } else if self.finished {
            SessionPhase::Finished
        } else if self.phases.get(Stage::Subcategories) != StagePhase::Idle {
            SessionPhase::CategoryLoading
        } else if self.phases.get(Stage::Files) != StagePhase::Idle {
            SessionPhase::FileExtraction
        } else if self.product_loop_active {
            SessionPhase::ProductLoop
        } else {
            SessionPhase::SubcategoryLoop
        };

        SessionView {
            phase,
            root_category: self.root_category_name.clone(),
            subcategory_index: self.subcategory_index,
            subcategory_count: self.subcategories.len(),
            current_subcategory: (!self.subcategory_label.is_empty())
                .then(|| self.subcategory_label.clone()),
            product_index: self.product_index,
            product_count: self.products.len(),
            downloaded_files: self.downloaded_files,
            final_message: self.final_message.clone(),
        }
    }
}
