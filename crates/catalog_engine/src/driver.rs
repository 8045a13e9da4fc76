use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use catalog_core::{
    update, CrawlConfig, CrawlState, Effect, Msg, OutputPath, SessionView, Stage, TabId,
};
use catalog_logging::{catalog_debug, catalog_error, catalog_info, catalog_warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    DownloadError, EventSink, FailureKind, HostError, Notifier, PersistError, Storage, TabHost,
};

/// Local retry policies of the driver, independent of the watchdog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Extra attempts for an extraction request to a page that is not listening yet.
    pub message_retry_attempts: u32,
    pub message_retry_delay: Duration,
    /// Extra attempts for a download that could not reach the server.
    pub download_retry_attempts: u32,
    pub download_retry_delay: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            message_retry_attempts: 5,
            message_retry_delay: Duration::from_millis(300),
            download_retry_attempts: 2,
            download_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of one crawl session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub final_message: String,
    pub downloaded_files: u64,
    /// Resume set at the end of the session, sorted.
    pub processed_products: Vec<String>,
    pub view: SessionView,
}

/// Runs the core state machine against real capabilities.
///
/// Everything runs on the calling task: messages produced while executing
/// effects are queued locally and handled before the next inbound event, so a
/// tab id is always recorded before the first load event for it is handled.
pub struct CrawlDriver<H, S, N> {
    host: Arc<H>,
    storage: Arc<S>,
    notifier: N,
    config: CrawlConfig,
    dispatch: DispatchSettings,
    sink: EventSink,
    events: mpsc::UnboundedReceiver<Msg>,
}

/// Timers and background work owned by a running session.
struct Runtime {
    pending: VecDeque<Msg>,
    watchdogs: HashMap<Stage, CancellationToken>,
    timers: JoinSet<()>,
    downloads: JoinSet<()>,
}

impl<H, S, N> CrawlDriver<H, S, N>
where
    H: TabHost,
    S: Storage,
    N: Notifier,
{
    /// `sink` and `events` must be the two ends of the channel the host reports to.
    pub fn new(
        host: H,
        storage: S,
        notifier: N,
        sink: EventSink,
        events: mpsc::UnboundedReceiver<Msg>,
    ) -> Self {
        Self {
            host: Arc::new(host),
            storage: Arc::new(storage),
            notifier,
            config: CrawlConfig::default(),
            dispatch: DispatchSettings::default(),
            sink,
            events,
        }
    }

    pub fn with_config(mut self, config: CrawlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Crawls `url` to completion. `processed` seeds the resume set.
    pub async fn run(&mut self, url: &str, processed: Vec<String>) -> SessionReport {
        let mut runtime = Runtime {
            pending: VecDeque::new(),
            watchdogs: HashMap::new(),
            timers: JoinSet::new(),
            downloads: JoinSet::new(),
        };
        runtime.pending.push_back(Msg::StartCrawl {
            url: url.to_string(),
        });
        if !processed.is_empty() {
            runtime
                .pending
                .push_back(Msg::RestoreProcessedProducts(processed));
        }

        let mut state = CrawlState::new(self.config.clone());
        while !state.is_finished() {
            let msg = match runtime.pending.pop_front() {
                Some(msg) => msg,
                None => match self.events.recv().await {
                    Some(msg) => msg,
                    None => {
                        catalog_error!("Event channel closed before the session finished");
                        break;
                    }
                },
            };
            while runtime.timers.try_join_next().is_some() {}
            while runtime.downloads.try_join_next().is_some() {}
            catalog_debug!("Handling {:?}", msg);
            let (next, effects) = update(state, msg);
            state = next;
            for effect in effects {
                self.execute(effect, &mut runtime).await;
            }
        }

        for (_, token) in runtime.watchdogs.drain() {
            token.cancel();
        }
        runtime.timers.abort_all();
        let outstanding = runtime.downloads.len();
        if outstanding > 0 {
            catalog_info!("Waiting for {} download(s) to finish", outstanding);
        }
        while runtime.downloads.join_next().await.is_some() {}
        let late_downloads = self.count_late_downloads();
        if late_downloads > 0 {
            catalog_info!("{} download(s) completed after the session finished", late_downloads);
        }

        let mut processed_products: Vec<String> = state.resume_set().iter().cloned().collect();
        processed_products.sort();
        SessionReport {
            final_message: state.final_message().unwrap_or_default().to_string(),
            downloaded_files: state.downloaded_files() + late_downloads,
            processed_products,
            view: state.view(),
        }
    }

    /// Drains queued events after the loop ended, counting successful downloads.
    fn count_late_downloads(&mut self) -> u64 {
        let mut count = 0;
        while let Ok(msg) = self.events.try_recv() {
            if let Msg::Downloaded { ok: true, .. } = msg {
                count += 1;
            }
        }
        count
    }

    async fn execute(&self, effect: Effect, runtime: &mut Runtime) {
        match effect {
            Effect::OpenTab { role, url } => match self.host.open_tab(&url).await {
                Ok(tab_id) => runtime.pending.push_back(Msg::TabOpened { role, tab_id }),
                Err(err) => {
                    catalog_warn!("Could not open {:?} tab for {}: {}", role, url, err);
                    runtime.pending.push_back(Msg::TabOpenFailed {
                        role,
                        reason: err.to_string(),
                    });
                }
            },
            Effect::UpdateTab { role, tab_id, url } => {
                if let Err(err) = self.host.update_tab(tab_id, &url).await {
                    runtime.pending.push_back(Msg::TabUpdateFailed {
                        role,
                        url,
                        reason: err.to_string(),
                    });
                }
            }
            Effect::CloseTab { tab_id } => {
                if let Err(err) = self.host.close_tab(tab_id).await {
                    catalog_debug!("Closing tab {}: {}", tab_id, err);
                }
            }
            Effect::RequestExtraction { tab_id, stage } => {
                let host = Arc::clone(&self.host);
                let dispatch = self.dispatch.clone();
                runtime
                    .timers
                    .spawn(dispatch_extraction(host, dispatch, tab_id, stage));
            }
            Effect::ArmWatchdog {
                session,
                stage,
                generation,
                after,
            } => {
                let token = CancellationToken::new();
                if let Some(previous) = runtime.watchdogs.insert(stage, token.clone()) {
                    previous.cancel();
                }
                let sink = self.sink.clone();
                runtime.timers.spawn(async move {
                    if token
                        .run_until_cancelled(tokio::time::sleep(after))
                        .await
                        .is_some()
                    {
                        sink.send(Msg::WatchdogExpired {
                            session,
                            stage,
                            generation,
                        });
                    }
                });
            }
            Effect::CancelWatchdog { stage } => {
                if let Some(token) = runtime.watchdogs.remove(&stage) {
                    token.cancel();
                }
            }
            Effect::Schedule {
                session,
                wake,
                after,
            } => {
                let sink = self.sink.clone();
                runtime.timers.spawn(async move {
                    tokio::time::sleep(after).await;
                    sink.send(Msg::Wake { session, wake });
                });
            }
            Effect::Persist {
                path,
                content,
                overwrite,
                kind,
            } => {
                let ok = match self.storage.save_text(&path, &content, overwrite).await {
                    Ok(written) => {
                        catalog_debug!("Wrote {:?}", written);
                        true
                    }
                    Err(PersistError::AlreadyExists(existing)) if !overwrite => {
                        catalog_debug!("Left {} untouched", existing);
                        false
                    }
                    Err(err) => {
                        catalog_error!("Failed to write {}: {}", path, err);
                        false
                    }
                };
                runtime.pending.push_back(Msg::Persisted { kind, ok });
            }
            Effect::Download { url, path } => {
                let storage = Arc::clone(&self.storage);
                let sink = self.sink.clone();
                let dispatch = self.dispatch.clone();
                runtime.downloads.spawn(async move {
                    let ok = download_with_retry(storage.as_ref(), &dispatch, &url, &path).await;
                    sink.send(Msg::Downloaded { url, ok });
                });
            }
            Effect::Notify { title, message } => self.notifier.notify(&title, &message),
        }
    }
}

/// Sends one extraction request, retrying while the page is not ready.
///
/// Replies come back through the host's sink; a request that never gets one
/// is the watchdog's business.
async fn dispatch_extraction<H: TabHost>(
    host: Arc<H>,
    dispatch: DispatchSettings,
    tab_id: TabId,
    stage: Stage,
) {
    let mut attempt = 0;
    loop {
        match host.request_extraction(tab_id, stage).await {
            Ok(()) => return,
            Err(HostError::NotReady(_)) if attempt < dispatch.message_retry_attempts => {
                attempt += 1;
                catalog_debug!(
                    "Tab {} not ready for {:?}; retry {}/{}",
                    tab_id,
                    stage,
                    attempt,
                    dispatch.message_retry_attempts
                );
                tokio::time::sleep(dispatch.message_retry_delay).await;
            }
            Err(err) => {
                catalog_warn!("Extraction request {:?} to tab {} failed: {}", stage, tab_id, err);
                return;
            }
        }
    }
}

/// Downloads `url`, retrying only failures that never reached the server.
async fn download_with_retry<S: Storage>(
    storage: &S,
    dispatch: &DispatchSettings,
    url: &str,
    path: &OutputPath,
) -> bool {
    let mut attempt = 0;
    loop {
        match storage.download(url, path).await {
            Ok(saved) => {
                catalog_debug!("Downloaded {} to {:?}", url, saved);
                return true;
            }
            Err(DownloadError::Fetch(err))
                if matches!(err.kind, FailureKind::Network | FailureKind::Timeout)
                    && attempt < dispatch.download_retry_attempts =>
            {
                attempt += 1;
                catalog_warn!(
                    "Download of {} did not start ({}); retry {}/{}",
                    url,
                    err,
                    attempt,
                    dispatch.download_retry_attempts
                );
                tokio::time::sleep(dispatch.download_retry_delay).await;
            }
            Err(err) => {
                catalog_error!("Download of {} to {} failed: {}", url, path, err);
                return false;
            }
        }
    }
}
