//! Per-stage liveness timers.
//!
//! The timers themselves run in the engine; this module owns their
//! bookkeeping. Every arm bumps the stage's generation and an expiry is only
//! honoured when it carries the generation that is currently armed, so a
//! timer that lost a race against `disarm` or a re-arm is harmless.

use crate::{Stage, TabId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Watchdog {
    retries: u32,
    generation: u64,
    armed_tab: Option<TabId>,
}

/// What an expired timer asks the state machine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Stale or already-disarmed timer.
    Ignored,
    /// Resend the extraction to `tab_id` and arm again with `generation`.
    Resend { tab_id: TabId, generation: u64 },
    /// Retry budget spent; the timer is cleared for good.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogSet {
    subcategories: Watchdog,
    products: Watchdog,
    files: Watchdog,
}

impl WatchdogSet {
    fn get(&self, stage: Stage) -> &Watchdog {
        match stage {
            Stage::Subcategories => &self.subcategories,
            Stage::Products => &self.products,
            Stage::Files => &self.files,
        }
    }

    fn get_mut(&mut self, stage: Stage) -> &mut Watchdog {
        match stage {
            Stage::Subcategories => &mut self.subcategories,
            Stage::Products => &mut self.products,
            Stage::Files => &mut self.files,
        }
    }

    /// Arms (or re-arms) the stage's timer for `tab_id`; returns the new generation.
    pub fn arm(&mut self, stage: Stage, tab_id: TabId) -> u64 {
        let dog = self.get_mut(stage);
        dog.generation += 1;
        dog.armed_tab = Some(tab_id);
        dog.generation
    }

    /// Clears the timer and its retry counter. Returns whether a timer was armed.
    pub fn disarm(&mut self, stage: Stage) -> bool {
        let dog = self.get_mut(stage);
        dog.retries = 0;
        dog.armed_tab.take().is_some()
    }

    /// Disarms every stage; returns the stages that had a live timer.
    pub fn disarm_all(&mut self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.disarm(*stage))
            .collect()
    }

    pub fn reset_retries(&mut self, stage: Stage) {
        self.get_mut(stage).retries = 0;
    }

    pub fn retries(&self, stage: Stage) -> u32 {
        self.get(stage).retries
    }

    pub fn is_armed(&self, stage: Stage) -> bool {
        self.get(stage).armed_tab.is_some()
    }

    /// Applies a timer expiry against a retry budget.
    pub fn expire(&mut self, stage: Stage, generation: u64, budget: u32) -> Expiry {
        let dog = self.get_mut(stage);
        let Some(tab_id) = dog.armed_tab else {
            return Expiry::Ignored;
        };
        if generation != dog.generation {
            return Expiry::Ignored;
        }
        if dog.retries >= budget {
            dog.armed_tab = None;
            dog.retries = 0;
            return Expiry::Exhausted;
        }
        dog.retries += 1;
        dog.generation += 1;
        Expiry::Resend {
            tab_id,
            generation: dog.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_of_one_resends_once_then_exhausts() {
        let mut dogs = WatchdogSet::default();
        let generation = dogs.arm(Stage::Files, 7);

        let next = match dogs.expire(Stage::Files, generation, 1) {
            Expiry::Resend { tab_id, generation } => {
                assert_eq!(tab_id, 7);
                generation
            }
            other => panic!("expected resend, got {other:?}"),
        };
        assert_eq!(dogs.retries(Stage::Files), 1);

        assert_eq!(dogs.expire(Stage::Files, next, 1), Expiry::Exhausted);
        assert!(!dogs.is_armed(Stage::Files));
        assert_eq!(dogs.expire(Stage::Files, next, 1), Expiry::Ignored);
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut dogs = WatchdogSet::default();
        let first = dogs.arm(Stage::Products, 3);
        let second = dogs.arm(Stage::Products, 3);
        assert_ne!(first, second);
        assert_eq!(dogs.expire(Stage::Products, first, 1), Expiry::Ignored);
        assert_eq!(dogs.retries(Stage::Products), 0);
    }

    #[test]
    fn disarm_resets_retries_and_reports_live_timers() {
        let mut dogs = WatchdogSet::default();
        let generation = dogs.arm(Stage::Subcategories, 1);
        let _ = dogs.expire(Stage::Subcategories, generation, 1);
        assert_eq!(dogs.retries(Stage::Subcategories), 1);

        assert!(dogs.disarm(Stage::Subcategories));
        assert_eq!(dogs.retries(Stage::Subcategories), 0);
        assert!(!dogs.disarm(Stage::Subcategories));
    }

    #[test]
    fn disarm_all_lists_only_armed_stages() {
        let mut dogs = WatchdogSet::default();
        dogs.arm(Stage::Products, 2);
        assert_eq!(dogs.disarm_all(), vec![Stage::Products]);
        assert!(dogs.disarm_all().is_empty());
    }

    #[test]
    fn zero_budget_exhausts_immediately() {
        let mut dogs = WatchdogSet::default();
        let generation = dogs.arm(Stage::Files, 9);
        assert_eq!(dogs.expire(Stage::Files, generation, 0), Expiry::Exhausted);
    }
}
