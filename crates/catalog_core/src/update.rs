use std::collections::HashSet;

use catalog_logging::{catalog_debug, catalog_error, catalog_info, catalog_warn};
use url::Url;

use crate::manifest::{
    product_manifest_name, render_product_manifest, render_subcategory_manifest, summary_name,
    PRODUCT_PLACEHOLDER, SUBCATEGORY_MANIFEST_NAME,
};
use crate::watchdog::Expiry;
use crate::{
    file_name, product_name, root_category_name, sanitize, CrawlState, Effect, Msg, OutputPath,
    PersistKind, Stage, StagePhase, SubcategoryRecord, SubcategorySummary, TabId, TabRole, Wake,
};

pub const FINISHED_TITLE: &str = "Process finished";

const NO_SUBCATEGORIES: &str = "no subcategories found";
const SUBCATEGORY_TIMEOUT: &str = "failed to extract subcategories (timeout)";
const TAB_CLOSED: &str = "aborted because a session tab was closed";
const CATEGORY_TAB_FAILED: &str = "could not open the category tab";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: CrawlState, msg: Msg) -> (CrawlState, Vec<Effect>) {
    let mut fx = Vec::new();

    let msg = match msg {
        Msg::StartCrawl { url } => {
            start_session(&mut state, url, &mut fx);
            return (state, fx);
        }
        other => other,
    };
    if !state.is_active() {
        catalog_debug!("Ignoring {:?}: no active session", msg);
        return (state, fx);
    }

    match msg {
        Msg::StartCrawl { .. } => {}
        Msg::RestoreProcessedProducts(products) => {
            catalog_info!("Restored {} previously processed product(s)", products.len());
            state.resume_set.extend(products);
        }
        Msg::TabOpened { role, tab_id } => on_tab_opened(&mut state, role, tab_id, &mut fx),
        Msg::TabOpenFailed { role, reason } => {
            on_tab_open_failed(&mut state, role, &reason, &mut fx)
        }
        Msg::TabUpdateFailed { role, url, reason } => {
            on_tab_update_failed(&mut state, role, url, &reason, &mut fx)
        }
        Msg::TabLoadComplete { tab_id } => on_tab_load_complete(&mut state, tab_id, &mut fx),
        Msg::TabClosed { tab_id } => on_tab_closed(&mut state, tab_id, &mut fx),
        Msg::SubcategoriesExtracted { tab_id, records } => {
            on_subcategories(&mut state, tab_id, records, &mut fx)
        }
        Msg::ProductsExtracted { tab_id, products } => {
            on_products(&mut state, tab_id, products, &mut fx)
        }
        Msg::FilesExtracted {
            tab_id,
            files,
            product_path,
        } => on_files(&mut state, tab_id, files, product_path, &mut fx),
        Msg::WatchdogExpired {
            session,
            stage,
            generation,
        } => {
            if session == state.session {
                on_watchdog(&mut state, stage, generation, &mut fx);
            }
        }
        Msg::Wake { session, wake } => {
            if session != state.session {
                catalog_debug!("Dropping {:?} from session {}", wake, session);
            } else {
                match wake {
                    Wake::NextSubcategory => process_next_subcategory(&mut state, &mut fx),
                    Wake::NextProduct => process_next_product(&mut state, &mut fx),
                }
            }
        }
        Msg::Persisted { kind, ok } => on_persisted(&mut state, kind, ok),
        Msg::Downloaded { url, ok } => {
            if ok {
                state.downloaded_files += 1;
                state.downloaded_urls.insert(url);
            } else {
                catalog_error!("Download failed for {}", url);
            }
        }
    }

    (state, fx)
}

fn start_session(state: &mut CrawlState, url: String, fx: &mut Vec<Effect>) {
    if state.is_active() {
        catalog_warn!("Discarding session {} for a new crawl", state.session);
        for stage in state.watchdogs.disarm_all() {
            fx.push(Effect::CancelWatchdog { stage });
        }
    }

    let origin = match Url::parse(&url) {
        Ok(parsed) if parsed.has_host() => parsed.origin().ascii_serialization(),
        _ => {
            let name = root_category_name(&url);
            state.reset_for_session(url.clone(), String::new(), name);
            finish(state, Some(format!("invalid start url: {url}")), fx);
            return;
        }
    };

    let name = root_category_name(&url);
    state.reset_for_session(url.clone(), origin, name);
    catalog_info!(
        "Session {} started for category '{}' ({})",
        state.session,
        state.root_category_name,
        url
    );
    state.phases.set(Stage::Subcategories, StagePhase::Loading);
    fx.push(Effect::OpenTab {
        role: TabRole::Category,
        url,
    });
}

fn on_tab_opened(state: &mut CrawlState, role: TabRole, tab_id: TabId, fx: &mut Vec<Effect>) {
    if state.phases.get(role.stage()) != StagePhase::Loading {
        catalog_warn!("Unexpected {:?} tab {}; closing it", role, tab_id);
        fx.push(Effect::CloseTab { tab_id });
        return;
    }
    *state.tabs.slot(role) = Some(tab_id);
    if role == TabRole::Product {
        state.watchdogs.reset_retries(Stage::Files);
    }
    catalog_debug!("{:?} tab is {}", role, tab_id);
}

fn on_tab_open_failed(state: &mut CrawlState, role: TabRole, reason: &str, fx: &mut Vec<Effect>) {
    if state.phases.get(role.stage()) != StagePhase::Loading {
        return;
    }
    match role {
        TabRole::Category => {
            catalog_error!("Category tab could not be opened: {}", reason);
            finish(state, Some(CATEGORY_TAB_FAILED.to_string()), fx);
        }
        TabRole::Subcategory => {
            catalog_error!(
                "Subcategory tab for '{}' could not be opened: {}; skipping it",
                state.subcategory_label,
                reason
            );
            advance_subcategory(state, fx);
        }
        TabRole::Product => {
            catalog_error!("Product tab could not be opened: {}; retrying", reason);
            state.phases.set(Stage::Files, StagePhase::Idle);
            schedule(state, Wake::NextProduct, state.config.tab_retry_delay, fx);
        }
    }
}

fn on_tab_update_failed(
    state: &mut CrawlState,
    role: TabRole,
    url: String,
    reason: &str,
    fx: &mut Vec<Effect>,
) {
    if role != TabRole::Subcategory || state.phases.get(Stage::Products) != StagePhase::Loading {
        return;
    }
    catalog_warn!("Tab update failed: {}; opening a new tab", reason);
    state.tabs.subcategory = None;
    fx.push(Effect::OpenTab { role, url });
}

fn on_tab_load_complete(state: &mut CrawlState, tab_id: TabId, fx: &mut Vec<Effect>) {
    let Some(role) = TabRole::ALL
        .into_iter()
        .find(|role| state.tabs.get(*role) == Some(tab_id))
    else {
        return;
    };
    let stage = role.stage();
    if state.phases.get(stage) != StagePhase::Loading {
        catalog_debug!("Repeated load of {:?} tab {} ignored", role, tab_id);
        return;
    }
    state.phases.set(stage, StagePhase::AwaitingResponse);
    fx.push(Effect::RequestExtraction { tab_id, stage });
    arm_watchdog(state, stage, tab_id, fx);
}

fn on_tab_closed(state: &mut CrawlState, tab_id: TabId, fx: &mut Vec<Effect>) {
    if state.tabs.category == Some(tab_id) || state.tabs.subcategory == Some(tab_id) {
        finish(state, Some(TAB_CLOSED.to_string()), fx);
        return;
    }
    if state.tabs.product != Some(tab_id) {
        return;
    }
    catalog_warn!("Product tab {} closed; moving to the next product", tab_id);
    state.tabs.product = None;
    disarm(state, Stage::Files, fx);
    state.phases.set(Stage::Files, StagePhase::Idle);
    state.product_index += 1;
    schedule(state, Wake::NextProduct, state.config.next_product_delay, fx);
}

fn on_subcategories(
    state: &mut CrawlState,
    tab_id: TabId,
    records: Vec<SubcategoryRecord>,
    fx: &mut Vec<Effect>,
) {
    if !accepts_reply(state, Stage::Subcategories, tab_id) {
        return;
    }
    disarm(state, Stage::Subcategories, fx);
    state.phases.set(Stage::Subcategories, StagePhase::Idle);

    if records.is_empty() {
        finish(state, Some(NO_SUBCATEGORIES.to_string()), fx);
        return;
    }

    catalog_info!("Found {} subcategories", records.len());
    match category_dir(state) {
        Some(category) => fx.push(Effect::Persist {
            path: OutputPath::new([category, SUBCATEGORY_MANIFEST_NAME.to_string()]),
            content: render_subcategory_manifest(&records),
            overwrite: true,
            kind: PersistKind::SubcategoryManifest,
        }),
        None => catalog_error!("Category name sanitises to nothing; manifest not written"),
    }
    state.subcategories = records;
    schedule(state, Wake::NextSubcategory, state.config.settle_delay, fx);
}

fn process_next_subcategory(state: &mut CrawlState, fx: &mut Vec<Effect>) {
    if state.phases.get(Stage::Products) != StagePhase::Idle || state.product_loop_active {
        catalog_debug!("Subcategory already in progress");
        return;
    }
    if state.subcategory_index >= state.subcategories.len() {
        catalog_info!("All subcategories processed");
        finish(state, None, fx);
        return;
    }

    let record = state.subcategories[state.subcategory_index].clone();
    state.subcategory_label = record.label.clone();
    state.phases.set(Stage::Products, StagePhase::Loading);
    state.watchdogs.reset_retries(Stage::Products);
    let url = listing_url(state, &record.href);
    catalog_info!(
        "Processing subcategory [{}/{}]: {} ({})",
        state.subcategory_index + 1,
        state.subcategories.len(),
        record.label,
        url
    );

    match state.tabs.subcategory {
        Some(tab_id) => fx.push(Effect::UpdateTab {
            role: TabRole::Subcategory,
            tab_id,
            url,
        }),
        None => fx.push(Effect::OpenTab {
            role: TabRole::Subcategory,
            url,
        }),
    }
}

fn advance_subcategory(state: &mut CrawlState, fx: &mut Vec<Effect>) {
    state.subcategory_index += 1;
    state.product_loop_active = false;
    state.phases.set(Stage::Products, StagePhase::Idle);
    state.phases.set(Stage::Files, StagePhase::Idle);
    disarm(state, Stage::Products, fx);
    disarm(state, Stage::Files, fx);
    schedule(state, Wake::NextSubcategory, state.config.advance_delay, fx);
}

fn on_products(state: &mut CrawlState, tab_id: TabId, products: Vec<String>, fx: &mut Vec<Effect>) {
    if !accepts_reply(state, Stage::Products, tab_id) {
        return;
    }
    disarm(state, Stage::Products, fx);
    state.phases.set(Stage::Products, StagePhase::Idle);

    state.all_products = products.clone();
    state.products = products;
    state.product_index = 0;
    state.processed_this_subcategory.clear();
    state.summary = Some(SubcategorySummary {
        total_products: state.products.len(),
        ..SubcategorySummary::default()
    });

    if state.products.is_empty() {
        catalog_info!(
            "Subcategory '{}' has no products; moving on",
            state.subcategory_label
        );
        advance_subcategory(state, fx);
        return;
    }

    catalog_info!(
        "Subcategory '{}' has {} products",
        state.subcategory_label,
        state.products.len()
    );
    write_placeholders(state, fx);
    skip_already_processed(state);
    state.product_loop_active = true;
    process_next_product(state, fx);
}

/// One placeholder manifest per product so every product has a folder on disk.
/// Placeholders of products already manifested never replace an existing file.
fn write_placeholders(state: &CrawlState, fx: &mut Vec<Effect>) {
    let (Some(category), Some(subcategory)) = (category_dir(state), subcategory_dir(state)) else {
        catalog_error!("Category or subcategory name sanitises to nothing; no placeholders");
        return;
    };
    for product in &state.products {
        let Some(name) = product_name(product) else {
            continue;
        };
        fx.push(Effect::Persist {
            path: OutputPath::new([
                category.clone(),
                subcategory.clone(),
                name.clone(),
                product_manifest_name(&name),
            ]),
            content: PRODUCT_PLACEHOLDER.to_string(),
            overwrite: !state.resume_set.contains(product),
            kind: PersistKind::ProductPlaceholder {
                product: product.clone(),
            },
        });
    }
}

/// Skips the leading run of products an earlier pass already manifested.
fn skip_already_processed(state: &mut CrawlState) {
    let skipped = state
        .products
        .iter()
        .skip(state.product_index)
        .take_while(|product| state.resume_set.contains(*product))
        .count();
    if skipped > 0 {
        catalog_info!(
            "Skipping {} already processed product(s) in '{}'",
            skipped,
            state.subcategory_label
        );
        state.product_index += skipped;
    }
}

fn process_next_product(state: &mut CrawlState, fx: &mut Vec<Effect>) {
    if !state.product_loop_active || state.phases.get(Stage::Files) != StagePhase::Idle {
        catalog_debug!("Product already in progress");
        return;
    }
    if state.product_index >= state.products.len() {
        catalog_info!(
            "All products of '{}' attempted; writing summary",
            state.subcategory_label
        );
        write_summary(state, fx);
        advance_subcategory(state, fx);
        return;
    }

    state.phases.set(Stage::Files, StagePhase::Loading);
    let url = absolute_url(state, &state.products[state.product_index]);
    catalog_info!(
        "Processing product [{}/{}] of '{}': {}",
        state.product_index + 1,
        state.products.len(),
        state.subcategory_label,
        url
    );
    fx.push(Effect::OpenTab {
        role: TabRole::Product,
        url,
    });
}

fn on_files(
    state: &mut CrawlState,
    tab_id: TabId,
    files: Vec<String>,
    product_path: Option<String>,
    fx: &mut Vec<Effect>,
) {
    if !accepts_reply(state, Stage::Files, tab_id) {
        return;
    }
    disarm(state, Stage::Files, fx);

    let product = product_path
        .filter(|path| !path.is_empty())
        .or_else(|| state.products.get(state.product_index).cloned());
    let product_dir = match product.as_deref() {
        Some(path) => product_name(path),
        None => product_name(""),
    };
    let category = category_dir(state);
    let subcategory = subcategory_dir(state);
    if files.is_empty() {
        catalog_info!("Product {:?} has no files", product);
    }

    let mut lines = Vec::new();
    let mut seen = HashSet::new();
    for file in files {
        let Some(name) = file_name(&file) else {
            catalog_warn!("Skipping file with unusable name: {}", file);
            continue;
        };
        let (Some(category), Some(subcategory), Some(product_dir)) =
            (&category, &subcategory, &product_dir)
        else {
            catalog_error!("Skipping {}: destination folder sanitises to nothing", file);
            continue;
        };
        if seen.insert(name.clone()) {
            lines.push(format!("{name} -> {file}"));
        }
        if state.downloaded_urls.contains(&file) {
            catalog_debug!("Already downloaded, not fetching again: {}", file);
            continue;
        }
        fx.push(Effect::Download {
            path: OutputPath::new([
                category.clone(),
                subcategory.clone(),
                product_dir.clone(),
                name,
            ]),
            url: file,
        });
    }

    if let (Some(category), Some(subcategory), Some(product_dir)) =
        (category, subcategory, product_dir)
    {
        fx.push(Effect::Persist {
            path: OutputPath::new([
                category,
                subcategory,
                product_dir.clone(),
                product_manifest_name(&product_dir),
            ]),
            content: render_product_manifest(&lines),
            overwrite: true,
            kind: PersistKind::ProductManifest {
                product,
                had_files: !lines.is_empty(),
            },
        });
    }

    fx.push(Effect::CloseTab { tab_id });
    state.tabs.product = None;
    state.product_index += 1;
    state.phases.set(Stage::Files, StagePhase::Idle);
    schedule(state, Wake::NextProduct, state.config.next_product_delay, fx);
}

fn on_persisted(state: &mut CrawlState, kind: PersistKind, ok: bool) {
    match kind {
        PersistKind::ProductManifest {
            product: Some(product),
            had_files,
        } if ok => {
            state.processed_this_subcategory.insert(product.clone(), true);
            if let Some(summary) = state.summary.as_mut() {
                if had_files {
                    summary.products_with_files += 1;
                } else {
                    summary.products_without_files.push(product.clone());
                }
            }
            state.resume_set.insert(product);
        }
        PersistKind::ProductPlaceholder { product } if !ok => {
            catalog_debug!("Kept the existing manifest of {}", product)
        }
        kind if ok => catalog_debug!("Persisted {:?}", kind),
        kind => catalog_error!("Could not persist {:?}", kind),
    }
}

fn on_watchdog(state: &mut CrawlState, stage: Stage, generation: u64, fx: &mut Vec<Effect>) {
    match state
        .watchdogs
        .expire(stage, generation, state.config.max_retries)
    {
        Expiry::Ignored => {}
        Expiry::Resend { tab_id, generation } => {
            catalog_warn!(
                "Watchdog: attempt {} for {:?} on tab {}; resending",
                state.watchdogs.retries(stage),
                stage,
                tab_id
            );
            fx.push(Effect::RequestExtraction { tab_id, stage });
            fx.push(Effect::ArmWatchdog {
                session: state.session,
                stage,
                generation,
                after: state.config.watchdog_timeout,
            });
        }
        Expiry::Exhausted => {
            catalog_warn!(
                "Watchdog: retry budget ({}) spent for {:?}",
                state.config.max_retries,
                stage
            );
            match stage {
                Stage::Subcategories => {
                    state.phases.set(Stage::Subcategories, StagePhase::Idle);
                    finish(state, Some(SUBCATEGORY_TIMEOUT.to_string()), fx);
                }
                Stage::Products => advance_subcategory(state, fx),
                Stage::Files => {
                    if let Some(tab_id) = state.tabs.product.take() {
                        fx.push(Effect::CloseTab { tab_id });
                    }
                    state.phases.set(Stage::Files, StagePhase::Idle);
                    state.product_index += 1;
                    schedule(state, Wake::NextProduct, state.config.next_product_delay, fx);
                }
            }
        }
    }
}

fn write_summary(state: &mut CrawlState, fx: &mut Vec<Effect>) {
    if state.summary.is_none() {
        return;
    }
    let (Some(category), Some(subcategory)) = (category_dir(state), subcategory_dir(state)) else {
        return;
    };
    let summary =
        SubcategorySummary::compute(&state.all_products, &state.processed_this_subcategory);
    fx.push(Effect::Persist {
        path: OutputPath::new([category, subcategory.clone(), summary_name(&subcategory)]),
        content: summary.render(
            &state.root_category_name,
            &state.subcategory_label,
            &state.origin,
        ),
        overwrite: true,
        kind: PersistKind::Summary,
    });
    state.summary = Some(summary);
}

fn finish(state: &mut CrawlState, message: Option<String>, fx: &mut Vec<Effect>) {
    if state.finished {
        return;
    }
    state.finished = true;
    for stage in state.watchdogs.disarm_all() {
        fx.push(Effect::CancelWatchdog { stage });
    }
    for stage in Stage::ALL {
        state.phases.set(stage, StagePhase::Idle);
    }
    state.product_loop_active = false;

    let message =
        message.unwrap_or_else(|| format!("{} files downloaded", state.downloaded_files));
    catalog_info!("Session {} finished: {}", state.session, message);
    fx.push(Effect::Notify {
        title: FINISHED_TITLE.to_string(),
        message: message.clone(),
    });
    state.final_message = Some(message);

    // The category tab stays open for reference.
    for role in [TabRole::Subcategory, TabRole::Product] {
        if let Some(tab_id) = state.tabs.slot(role).take() {
            fx.push(Effect::CloseTab { tab_id });
        }
    }
}

/// A reply is only taken when its stage is waiting and it came from the
/// stage's current tab; anything else is a late reply for an item the crawl
/// already moved past.
fn accepts_reply(state: &CrawlState, stage: Stage, tab_id: TabId) -> bool {
    let expected = state.tabs.get(stage.role());
    let accepted =
        state.phases.get(stage) == StagePhase::AwaitingResponse && expected == Some(tab_id);
    if !accepted {
        catalog_warn!(
            "Discarding stale {:?} reply from tab {} (expected {:?}, phase {:?})",
            stage,
            tab_id,
            expected,
            state.phases.get(stage)
        );
    }
    accepted
}

fn arm_watchdog(state: &mut CrawlState, stage: Stage, tab_id: TabId, fx: &mut Vec<Effect>) {
    let generation = state.watchdogs.arm(stage, tab_id);
    fx.push(Effect::ArmWatchdog {
        session: state.session,
        stage,
        generation,
        after: state.config.watchdog_timeout,
    });
}

fn disarm(state: &mut CrawlState, stage: Stage, fx: &mut Vec<Effect>) {
    if state.watchdogs.disarm(stage) {
        fx.push(Effect::CancelWatchdog { stage });
    }
}

fn schedule(state: &CrawlState, wake: Wake, after: std::time::Duration, fx: &mut Vec<Effect>) {
    fx.push(Effect::Schedule {
        session: state.session,
        wake,
        after,
    });
}

fn listing_url(state: &CrawlState, href: &str) -> String {
    let href = href.trim_end_matches('/');
    format!("{}{}", absolute_url(state, href), state.config.listing_suffix)
}

/// Site-relative paths are joined to the session origin; absolute URLs pass through.
fn absolute_url(state: &CrawlState, path: &str) -> String {
    if Url::parse(path).is_ok() {
        path.to_string()
    } else {
        format!("{}{path}", state.origin)
    }
}

fn category_dir(state: &CrawlState) -> Option<String> {
    non_empty(sanitize(&state.root_category_name))
}

fn subcategory_dir(state: &CrawlState) -> Option<String> {
    non_empty(sanitize(&state.subcategory_label))
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
