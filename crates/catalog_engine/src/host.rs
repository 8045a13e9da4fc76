use catalog_core::{Msg, Stage, TabId};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::FetchError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("no tab with id {0}")]
    TabNotFound(TabId),
    /// The tab exists but its page cannot answer yet.
    #[error("tab {0} is not ready for extraction")]
    NotReady(TabId),
    #[error("page fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Clonable handle that hosts and timers use to post messages to the driver.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Msg>,
}

impl EventSink {
    /// Posts `msg`; a driver that already returned simply drops it.
    pub fn send(&self, msg: Msg) {
        let _ = self.tx.send(msg);
    }
}

pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<Msg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

/// Browser-like tab capability.
///
/// Calls return once the host accepted the command. Load completion, tab
/// closure and extraction replies are reported asynchronously through the
/// host's [`EventSink`].
#[async_trait::async_trait]
pub trait TabHost: Send + Sync + 'static {
    async fn open_tab(&self, url: &str) -> Result<TabId, HostError>;

    async fn update_tab(&self, tab_id: TabId, url: &str) -> Result<(), HostError>;

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Asks the page in `tab_id` to run the extraction of `stage`.
    async fn request_extraction(&self, tab_id: TabId, stage: Stage) -> Result<(), HostError>;
}
