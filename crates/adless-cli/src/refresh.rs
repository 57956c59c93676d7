//! Periodic rule-set refresh.
//!
//! Recompiles every configured source and publishes the result through the
//! [`RuleStore`]. A failed refresh leaves the previous rule set serving.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use adless_core::RuleStore;

use crate::fetch::Fetcher;
use crate::lists::{compile_loaded, load_sources};

#[derive(Debug, Clone)]
pub struct Refresher {
    store: Arc<RuleStore>,
    sources: Vec<String>,
    fetcher: Fetcher,
    timeout: Duration,
}

impl Refresher {
    pub fn new(store: Arc<RuleStore>, sources: Vec<String>, fetcher: Fetcher, timeout: Duration) -> Self {
        Self {
            store,
            sources,
            fetcher,
            timeout,
        }
    }

    /// Load, compile and publish once. Returns the new generation.
    pub async fn refresh_once(&self) -> Result<u64, String> {
        let lists = match load_sources(&self.sources, &self.fetcher, self.timeout).await {
            Ok(lists) => lists,
            Err(e) => {
                log::warn!("rule refresh failed, keeping previous rule set: {}", e);
                return Err(e);
            }
        };

        self.store
            .refresh_with(|| compile_loaded(&lists, false).map(|compilation| compilation.rule_set))?;
        Ok(self.store.generation())
    }

    /// Refresh every `interval`, starting one interval from now.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Ok(generation) = self.refresh_once().await {
                    log::info!("rule set refreshed (generation {})", generation);
                }
            }
        })
    }
}
