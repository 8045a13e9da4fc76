//! Catalog engine: host capabilities and the effect-executing crawl driver.
mod decode;
mod driver;
mod extract;
mod fetch;
mod host;
mod http_host;
mod notify;
mod persist;
mod storage;

pub use decode::{decode_html, decode_lossy, DecodeError, DecodedHtml};
pub use driver::{CrawlDriver, DispatchSettings, SessionReport};
pub use extract::{ExtractedFiles, PageExtractor};
pub use fetch::{FailureKind, FetchError, FetchSettings, FetchedPage, PageFetcher};
pub use host::{event_channel, EventSink, HostError, TabHost};
pub use http_host::HttpTabHost;
pub use notify::{LogNotifier, Notifier};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use storage::{unique_target, DownloadError, FsStorage, Storage};
