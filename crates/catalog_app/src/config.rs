//! Optional RON configuration file.
//!
//! Every field is optional; missing ones keep the built-in defaults. Durations
//! are in milliseconds:
//!
//! ```ron
//! (
//!     watchdog_timeout_ms: 60000,
//!     next_product_delay_ms: 1000,
//!     max_download_bytes: 1073741824,
//! )
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use catalog_core::CrawlConfig;
use catalog_engine::{DispatchSettings, FetchSettings};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub watchdog_timeout_ms: u64,
    pub max_retries: u32,
    pub settle_delay_ms: u64,
    pub advance_delay_ms: u64,
    pub next_product_delay_ms: u64,
    pub tab_retry_delay_ms: u64,
    pub listing_suffix: String,

    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_page_bytes: u64,
    pub max_download_bytes: u64,

    pub message_retry_attempts: u32,
    pub message_retry_delay_ms: u64,
    pub download_retry_attempts: u32,
    pub download_retry_delay_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        let crawl = CrawlConfig::default();
        let fetch = FetchSettings::default();
        let dispatch = DispatchSettings::default();
        Self {
            watchdog_timeout_ms: millis(crawl.watchdog_timeout),
            max_retries: crawl.max_retries,
            settle_delay_ms: millis(crawl.settle_delay),
            advance_delay_ms: millis(crawl.advance_delay),
            next_product_delay_ms: millis(crawl.next_product_delay),
            tab_retry_delay_ms: millis(crawl.tab_retry_delay),
            listing_suffix: crawl.listing_suffix,
            connect_timeout_ms: millis(fetch.connect_timeout),
            request_timeout_ms: millis(fetch.request_timeout),
            redirect_limit: fetch.redirect_limit,
            max_page_bytes: fetch.max_bytes,
            max_download_bytes: fetch.max_download_bytes,
            message_retry_attempts: dispatch.message_retry_attempts,
            message_retry_delay_ms: millis(dispatch.message_retry_delay),
            download_retry_attempts: dispatch.download_retry_attempts,
            download_retry_delay_ms: millis(dispatch.download_retry_delay),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            watchdog_timeout: Duration::from_millis(self.watchdog_timeout_ms),
            max_retries: self.max_retries,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            advance_delay: Duration::from_millis(self.advance_delay_ms),
            next_product_delay: Duration::from_millis(self.next_product_delay_ms),
            tab_retry_delay: Duration::from_millis(self.tab_retry_delay_ms),
            listing_suffix: self.listing_suffix.clone(),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            redirect_limit: self.redirect_limit,
            max_bytes: self.max_page_bytes,
            max_download_bytes: self.max_download_bytes,
            ..FetchSettings::default()
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            message_retry_attempts: self.message_retry_attempts,
            message_retry_delay: Duration::from_millis(self.message_retry_delay_ms),
            download_retry_attempts: self.download_retry_attempts,
            download_retry_delay: Duration::from_millis(self.download_retry_delay_ms),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_keeps_defaults() {
        let parsed = FileConfig::parse("()").unwrap();
        assert_eq!(parsed, FileConfig::default());
        assert_eq!(parsed.crawl_config(), CrawlConfig::default());
        assert_eq!(parsed.dispatch_settings(), DispatchSettings::default());
    }

    #[test]
    fn fields_override_individually() {
        let parsed = FileConfig::parse(
            r#"(watchdog_timeout_ms: 5000, listing_suffix: "/todos", max_download_bytes: 1024)"#,
        )
        .unwrap();
        let crawl = parsed.crawl_config();
        assert_eq!(crawl.watchdog_timeout, Duration::from_secs(5));
        assert_eq!(crawl.listing_suffix, "/todos");
        assert_eq!(crawl.settle_delay, CrawlConfig::default().settle_delay);
        assert_eq!(parsed.fetch_settings().max_download_bytes, 1024);
        assert_eq!(
            parsed.fetch_settings().max_bytes,
            FetchSettings::default().max_bytes
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(FileConfig::parse("(watchdog_timeout: 5)").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(FileConfig::load(&temp.path().join("missing.ron")).is_err());
    }
}
