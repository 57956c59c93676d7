//! Rule-set store
//!
//! Holds the currently published [`RuleSet`]. Readers take an `Arc` snapshot
//! and keep using it for the whole document, so a refresh that lands halfway
//! through a rewrite is never observed.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::ruleset::RuleSet;

#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
    generation: RwLock<u64>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(RuleSet::empty())
    }
}

impl RuleStore {
    pub fn new(initial: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            generation: RwLock::new(0),
        }
    }

    /// Snapshot of the published set.
    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Number of successful publications since creation.
    pub fn generation(&self) -> u64 {
        *self.generation.read()
    }

    /// Atomically replace the published set.
    pub fn publish(&self, rule_set: RuleSet) {
        let rules = rule_set.len();
        let cosmetics = rule_set.cosmetics().len();
        let mut generation = self.generation.write();
        *self.current.write() = Arc::new(rule_set);
        *generation += 1;
        log::info!(
            "published rule set #{} ({} network rules, {} cosmetic rules)",
            *generation,
            rules,
            cosmetics
        );
    }

    /// Build a replacement and publish it. On failure the previous set stays
    /// published and the error is returned to the caller.
    pub fn refresh_with<E, F>(&self, build: F) -> Result<Arc<RuleSet>, E>
    where
        E: std::fmt::Display,
        F: FnOnce() -> Result<RuleSet, E>,
    {
        match build() {
            Ok(rule_set) => {
                self.publish(rule_set);
                Ok(self.current())
            }
            Err(err) => {
                log::warn!("rule refresh failed, keeping previous rule set: {}", err);
                Err(err)
            }
        }
    }
}
