mod config;
mod notifier;
mod persistence;

use std::path::PathBuf;

use anyhow::Context;
use catalog_engine::{
    ensure_output_dir, event_channel, CrawlDriver, FsStorage, HttpTabHost, PageFetcher,
};
use catalog_logging::{catalog_info, LogDestination};
use clap::{Parser, ValueEnum};
use log::LevelFilter;

use crate::config::FileConfig;
use crate::notifier::ConsoleNotifier;

#[derive(Debug, Parser)]
#[command(
    name = "catalog-crawl",
    version,
    about = "Walks a product catalog category and saves every product's files"
)]
struct Cli {
    /// Root category page, e.g. https://example.com/pt-br/cameras
    #[arg(value_name = "URL")]
    url: String,

    #[arg(short, long, value_name = "DIR", default_value = "catalog")]
    out: PathBuf,

    /// RON file overriding timing and fetch defaults.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogTarget::Terminal)]
    log: LogTarget,

    #[arg(long, value_name = "FILE", default_value = "catalog-crawl.log")]
    log_file: PathBuf,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Skip products a previous run already manifested into the same directory.
    #[arg(long, default_value_t = false)]
    resume: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogTarget {
    Terminal,
    File,
    Both,
}

impl Cli {
    fn log_destination(&self) -> LogDestination {
        match self.log {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File(self.log_file.clone()),
            LogTarget::Both => LogDestination::Both(self.log_file.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    catalog_logging::initialize(cli.log_destination(), level);

    let file_config = match cli.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    ensure_output_dir(&cli.out)
        .with_context(|| format!("cannot use output directory {}", cli.out.display()))?;

    let restored = if cli.resume {
        persistence::load_processed_products(&cli.out)
    } else {
        Vec::new()
    };

    let fetch = file_config.fetch_settings();
    let (sink, events) = event_channel();
    let host = HttpTabHost::new(PageFetcher::new(fetch.clone()), sink.clone());
    let storage =
        FsStorage::new(cli.out.clone(), &fetch).context("failed to build the HTTP client")?;
    let mut driver = CrawlDriver::new(host, storage, ConsoleNotifier::stdout(), sink, events)
        .with_config(file_config.crawl_config())
        .with_dispatch(file_config.dispatch_settings());

    catalog_info!("Crawling {} into {}", cli.url, cli.out.display());
    let report = driver.run(&cli.url, restored).await;
    persistence::save_processed_products(&cli.out, &report.processed_products);

    catalog_info!(
        "{} subcategories visited, {} products manifested, {} files downloaded",
        report.view.subcategory_index,
        report.processed_products.len(),
        report.downloaded_files
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["catalog-crawl", "https://example.com/pt-br/cameras"]);
        assert_eq!(cli.out, PathBuf::from("catalog"));
        assert_eq!(cli.log, LogTarget::Terminal);
        assert_eq!(cli.log_destination(), LogDestination::Terminal);
        assert!(!cli.resume);
    }

    #[test]
    fn log_file_follows_target() {
        let cli = Cli::parse_from([
            "catalog-crawl",
            "https://example.com/pt-br/cameras",
            "--log",
            "both",
            "--log-file",
            "run.log",
            "--resume",
        ]);
        assert_eq!(
            cli.log_destination(),
            LogDestination::Both(PathBuf::from("run.log"))
        );
        assert!(cli.resume);
    }
}
