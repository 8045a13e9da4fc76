use std::sync::Once;
use std::time::Duration;

use catalog_core::{
    update, CrawlConfig, CrawlState, Effect, Msg, Stage, StagePhase, SubcategoryRecord, TabRole,
    Wake,
};
use pretty_assertions::assert_eq;

const ROOT: &str = "https://example.com/pt-br/cameras";
const TIMEOUT: Duration = Duration::from_secs(40);

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(catalog_logging::initialize_for_tests);
}

fn wake(state: CrawlState, wake: Wake) -> (CrawlState, Vec<Effect>) {
    let session = state.session_id();
    update(state, Msg::Wake { session, wake })
}

fn expire(state: CrawlState, stage: Stage, generation: u64) -> (CrawlState, Vec<Effect>) {
    let session = state.session_id();
    update(
        state,
        Msg::WatchdogExpired {
            session,
            stage,
            generation,
        },
    )
}

fn armed_generation(effects: &[Effect], wanted: Stage) -> u64 {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::ArmWatchdog {
                stage, generation, ..
            } if *stage == wanted => Some(*generation),
            _ => None,
        })
        .expect("watchdog armed")
}

fn requests(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::RequestExtraction { .. }))
        .count()
}

/// Returns the state waiting on subcategories and the armed generation.
fn awaiting_subcategories() -> (CrawlState, u64) {
    let (state, _) = update(CrawlState::default(), Msg::StartCrawl { url: ROOT.into() });
    let (state, _) = update(
        state,
        Msg::TabOpened {
            role: TabRole::Category,
            tab_id: 1,
        },
    );
    let (state, effects) = update(state, Msg::TabLoadComplete { tab_id: 1 });
    let generation = armed_generation(&effects, Stage::Subcategories);
    (state, generation)
}

/// Returns the state waiting on products of tab 2 and the armed generation.
fn awaiting_products(subcategories: &[(&str, &str)]) -> (CrawlState, u64) {
    let (state, _) = awaiting_subcategories();
    let records = subcategories
        .iter()
        .map(|(label, href)| SubcategoryRecord::new(*label, *href))
        .collect();
    let (state, _) = update(state, Msg::SubcategoriesExtracted { tab_id: 1, records });
    let (state, _) = wake(state, Wake::NextSubcategory);
    let (state, _) = update(
        state,
        Msg::TabOpened {
            role: TabRole::Subcategory,
            tab_id: 2,
        },
    );
    let (state, effects) = update(state, Msg::TabLoadComplete { tab_id: 2 });
    let generation = armed_generation(&effects, Stage::Products);
    (state, generation)
}

/// Returns the state waiting on files of product tab 3 and the armed generation.
fn awaiting_files(products: &[&str]) -> (CrawlState, u64) {
    let (state, _) = awaiting_products(&[("Dome", "/pt-br/cameras/dome")]);
    let (state, _) = update(
        state,
        Msg::ProductsExtracted {
            tab_id: 2,
            products: products.iter().map(|p| p.to_string()).collect(),
        },
    );
    let (state, _) = update(
        state,
        Msg::TabOpened {
            role: TabRole::Product,
            tab_id: 3,
        },
    );
    let (state, effects) = update(state, Msg::TabLoadComplete { tab_id: 3 });
    let generation = armed_generation(&effects, Stage::Files);
    (state, generation)
}

#[test]
fn subcategory_stage_resends_once_then_fails_the_session() {
    init_logging();
    let (state, generation) = awaiting_subcategories();

    let (state, effects) = expire(state, Stage::Subcategories, generation);
    assert_eq!(requests(&effects), 1);
    assert_eq!(
        effects[0],
        Effect::RequestExtraction {
            tab_id: 1,
            stage: Stage::Subcategories,
        }
    );
    assert_eq!(state.watchdog_retries(Stage::Subcategories), 1);
    let second = armed_generation(&effects, Stage::Subcategories);

    let (state, effects) = expire(state, Stage::Subcategories, second);
    assert_eq!(requests(&effects), 0);
    assert!(state.is_finished());
    assert_eq!(
        state.final_message(),
        Some("failed to extract subcategories (timeout)")
    );
    assert!(effects.contains(&Effect::Notify {
        title: "Process finished".to_string(),
        message: "failed to extract subcategories (timeout)".to_string(),
    }));
}

#[test]
fn product_stage_resends_once_then_skips_the_subcategory() {
    init_logging();
    let (state, generation) = awaiting_products(&[
        ("Dome", "/pt-br/cameras/dome"),
        ("Bullet", "/pt-br/cameras/bullet"),
    ]);

    let (state, effects) = expire(state, Stage::Products, generation);
    assert_eq!(
        effects,
        vec![
            Effect::RequestExtraction {
                tab_id: 2,
                stage: Stage::Products,
            },
            Effect::ArmWatchdog {
                session: 1,
                stage: Stage::Products,
                generation: generation + 1,
                after: TIMEOUT,
            },
        ]
    );

    let (state, effects) = expire(state, Stage::Products, generation + 1);
    assert_eq!(requests(&effects), 0);
    assert!(!state.is_finished());
    assert_eq!(state.subcategory_index(), 1);
    assert_eq!(state.stage_phase(Stage::Products), StagePhase::Idle);
    assert_eq!(state.watchdog_retries(Stage::Products), 0);
    assert_eq!(
        effects.last(),
        Some(&Effect::Schedule {
            session: 1,
            wake: Wake::NextSubcategory,
            after: Duration::from_millis(2000),
        })
    );
}

#[test]
fn file_stage_resends_once_then_moves_to_next_product() {
    init_logging();
    let (state, generation) = awaiting_files(&["/produto/a", "/produto/b"]);

    let (state, effects) = expire(state, Stage::Files, generation);
    assert_eq!(requests(&effects), 1);
    let second = armed_generation(&effects, Stage::Files);

    let (state, effects) = expire(state, Stage::Files, second);
    assert_eq!(requests(&effects), 0);
    assert!(effects.contains(&Effect::CloseTab { tab_id: 3 }));
    assert_eq!(state.product_index(), 1);
    assert_eq!(state.tab(TabRole::Product), None);
    assert_eq!(state.stage_phase(Stage::Files), StagePhase::Idle);

    let (state, effects) = wake(state, Wake::NextProduct);
    assert_eq!(
        effects,
        vec![Effect::OpenTab {
            role: TabRole::Product,
            url: "https://example.com/produto/b".to_string(),
        }]
    );

    // A fresh product tab starts with a fresh retry budget.
    let (state, _) = update(
        state,
        Msg::TabOpened {
            role: TabRole::Product,
            tab_id: 4,
        },
    );
    assert_eq!(state.watchdog_retries(Stage::Files), 0);
}

#[test]
fn reply_after_resend_disarms_the_watchdog() {
    init_logging();
    let (state, generation) = awaiting_files(&["/produto/a"]);
    let (state, effects) = expire(state, Stage::Files, generation);
    let second = armed_generation(&effects, Stage::Files);

    let (state, effects) = update(
        state,
        Msg::FilesExtracted {
            tab_id: 3,
            files: Vec::new(),
            product_path: Some("/produto/a".to_string()),
        },
    );
    assert_eq!(effects[0], Effect::CancelWatchdog { stage: Stage::Files });
    assert_eq!(state.watchdog_retries(Stage::Files), 0);

    // The timer raced the reply; its expiry changes nothing.
    let before = state.clone();
    let (state, effects) = expire(state, Stage::Files, second);
    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn stale_generation_and_foreign_session_are_ignored() {
    init_logging();
    let (state, generation) = awaiting_subcategories();

    let (state, effects) = expire(state, Stage::Subcategories, generation + 7);
    assert!(effects.is_empty());
    assert_eq!(state.watchdog_retries(Stage::Subcategories), 0);

    let (state, effects) = update(
        state,
        Msg::WatchdogExpired {
            session: 99,
            stage: Stage::Subcategories,
            generation,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.watchdog_retries(Stage::Subcategories), 0);
}

#[test]
fn zero_retry_budget_degrades_on_first_expiry() {
    init_logging();
    let config = CrawlConfig {
        max_retries: 0,
        ..CrawlConfig::default()
    };
    let (state, _) = update(CrawlState::new(config), Msg::StartCrawl { url: ROOT.into() });
    let (state, _) = update(
        state,
        Msg::TabOpened {
            role: TabRole::Category,
            tab_id: 1,
        },
    );
    let (state, effects) = update(state, Msg::TabLoadComplete { tab_id: 1 });
    let generation = armed_generation(&effects, Stage::Subcategories);

    let (state, effects) = expire(state, Stage::Subcategories, generation);
    assert_eq!(requests(&effects), 0);
    assert!(state.is_finished());
}

#[test]
fn late_reply_from_previous_product_tab_is_discarded() {
    init_logging();
    let (state, generation) = awaiting_files(&["/produto/a", "/produto/b"]);
    let (state, effects) = expire(state, Stage::Files, generation);
    let (state, _) = expire(state, Stage::Files, armed_generation(&effects, Stage::Files));
    let (state, _) = wake(state, Wake::NextProduct);
    let (state, _) = update(
        state,
        Msg::TabOpened {
            role: TabRole::Product,
            tab_id: 4,
        },
    );
    let (state, _) = update(state, Msg::TabLoadComplete { tab_id: 4 });

    // Product a's page finally answers from its closed tab.
    let before = state.clone();
    let (state, effects) = update(
        state,
        Msg::FilesExtracted {
            tab_id: 3,
            files: vec!["https://x/late.pdf".to_string()],
            product_path: Some("/produto/a".to_string()),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, before);
    assert_eq!(state.stage_phase(Stage::Files), StagePhase::AwaitingResponse);
}
