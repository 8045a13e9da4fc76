use std::time::Duration;

/// Timing and URL knobs of a crawl session.
///
/// The delays are empirical: they give the host time to settle after heavy
/// tab and download activity. The watchdog timeout is generous because
/// background tabs are throttled by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Time a stage may stay silent before the watchdog fires.
    pub watchdog_timeout: Duration,
    /// Resend attempts per stage before the stage is given up.
    pub max_retries: u32,
    /// Pause between receiving the subcategory list and entering the first one.
    pub settle_delay: Duration,
    /// Pause before entering the next subcategory.
    pub advance_delay: Duration,
    /// Pause before opening the next product tab.
    pub next_product_delay: Duration,
    /// Pause before retrying a product tab that could not be opened.
    pub tab_retry_delay: Duration,
    /// Appended to a subcategory href to reach its full product listing.
    pub listing_suffix: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_secs(40),
            max_retries: 1,
            settle_delay: Duration::from_millis(1500),
            advance_delay: Duration::from_millis(2000),
            next_product_delay: Duration::from_millis(500),
            tab_retry_delay: Duration::from_millis(1000),
            listing_suffix: "/allproducts".to_string(),
        }
    }
}
