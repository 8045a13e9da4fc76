use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use catalog_core::{Msg, Stage, TabId};
use catalog_logging::{catalog_debug, catalog_warn};
use url::Url;

use crate::{decode_lossy, EventSink, HostError, PageExtractor, PageFetcher, TabHost};

#[derive(Debug)]
struct Tab {
    url: String,
    /// Bumped on every navigation so a superseded load cannot land.
    navigation: u64,
    page: Option<LoadedPage>,
}

#[derive(Debug, Clone)]
struct LoadedPage {
    /// `None` when the address never parsed; such a page has no links.
    url: Option<Url>,
    html: String,
}

type TabTable = Arc<Mutex<HashMap<TabId, Tab>>>;

/// Headless tab host: a tab is a fetched page kept in memory.
///
/// A load that fails still completes with an empty page, the way a browser
/// shows an error page, and the extraction then finds nothing.
pub struct HttpTabHost {
    fetcher: PageFetcher,
    extractor: PageExtractor,
    events: EventSink,
    tabs: TabTable,
    next_id: AtomicU64,
}

impl HttpTabHost {
    pub fn new(fetcher: PageFetcher, events: EventSink) -> Self {
        Self {
            fetcher,
            extractor: PageExtractor,
            events,
            tabs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn open_tab_count(&self) -> usize {
        lock(&self.tabs).len()
    }

    fn navigate(&self, tab_id: TabId, navigation: u64, url: String) {
        let fetcher = self.fetcher.clone();
        let tabs = Arc::clone(&self.tabs);
        let events = self.events.clone();
        tokio::spawn(async move {
            let page = load_page(&fetcher, &url).await;
            {
                let mut table = lock(&tabs);
                match table.get_mut(&tab_id) {
                    Some(tab) if tab.navigation == navigation => tab.page = Some(page),
                    _ => {
                        catalog_debug!("Dropping superseded load of {} in tab {}", url, tab_id);
                        return;
                    }
                }
            }
            events.send(Msg::TabLoadComplete { tab_id });
        });
    }

    fn extract(&self, tab_id: TabId, stage: Stage, page: &LoadedPage) -> Msg {
        let Some(url) = page.url.as_ref() else {
            return empty_reply(tab_id, stage);
        };
        match stage {
            Stage::Subcategories => Msg::SubcategoriesExtracted {
                tab_id,
                records: self.extractor.subcategories(&page.html, url),
            },
            Stage::Products => Msg::ProductsExtracted {
                tab_id,
                products: self.extractor.products(&page.html, url),
            },
            Stage::Files => {
                let found = self.extractor.files(&page.html, url);
                Msg::FilesExtracted {
                    tab_id,
                    files: found.files,
                    product_path: Some(found.product_path),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl TabHost for HttpTabHost {
    async fn open_tab(&self, url: &str) -> Result<TabId, HostError> {
        let tab_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.tabs).insert(
            tab_id,
            Tab {
                url: url.to_string(),
                navigation: 0,
                page: None,
            },
        );
        catalog_debug!("Opened tab {} at {}", tab_id, url);
        self.navigate(tab_id, 0, url.to_string());
        Ok(tab_id)
    }

    async fn update_tab(&self, tab_id: TabId, url: &str) -> Result<(), HostError> {
        let navigation = {
            let mut table = lock(&self.tabs);
            let tab = table
                .get_mut(&tab_id)
                .ok_or(HostError::TabNotFound(tab_id))?;
            tab.url = url.to_string();
            tab.navigation += 1;
            tab.page = None;
            tab.navigation
        };
        catalog_debug!("Tab {} navigating to {}", tab_id, url);
        self.navigate(tab_id, navigation, url.to_string());
        Ok(())
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let removed = lock(&self.tabs).remove(&tab_id);
        match removed {
            Some(tab) => {
                catalog_debug!("Closed tab {} ({})", tab_id, tab.url);
                self.events.send(Msg::TabClosed { tab_id });
                Ok(())
            }
            None => Err(HostError::TabNotFound(tab_id)),
        }
    }

    async fn request_extraction(&self, tab_id: TabId, stage: Stage) -> Result<(), HostError> {
        let page = {
            let table = lock(&self.tabs);
            let tab = table.get(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
            tab.page.clone().ok_or(HostError::NotReady(tab_id))?
        };
        let reply = self.extract(tab_id, stage, &page);
        self.events.send(reply);
        Ok(())
    }
}

async fn load_page(fetcher: &PageFetcher, url: &str) -> LoadedPage {
    match fetcher.fetch(url).await {
        Ok(fetched) => {
            let decoded = decode_lossy(&fetched.bytes, fetched.content_type.as_deref());
            LoadedPage {
                url: Url::parse(&fetched.final_url).or_else(|_| Url::parse(url)).ok(),
                html: decoded.html,
            }
        }
        Err(err) => {
            catalog_warn!("Failed to load {}: {}", url, err);
            LoadedPage {
                url: Url::parse(url).ok(),
                html: String::new(),
            }
        }
    }
}

fn empty_reply(tab_id: TabId, stage: Stage) -> Msg {
    match stage {
        Stage::Subcategories => Msg::SubcategoriesExtracted {
            tab_id,
            records: Vec::new(),
        },
        Stage::Products => Msg::ProductsExtracted {
            tab_id,
            products: Vec::new(),
        },
        Stage::Files => Msg::FilesExtracted {
            tab_id,
            files: Vec::new(),
            product_path: None,
        },
    }
}

fn lock(tabs: &Mutex<HashMap<TabId, Tab>>) -> MutexGuard<'_, HashMap<TabId, Tab>> {
    tabs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
