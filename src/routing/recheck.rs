//! Recheck Scheduler
//!
//! Background loop that periodically re-probes hosts classified
//! auto-proxy and promotes the ones that have become reachable to
//! auto-direct. Networks change; blocks get lifted.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::probe::Prober;
use super::store::RuleStore;
use super::types::ProxyDecision;
use crate::config::RecheckConfig;

/// Periodic re-validation of auto-proxy classifications
pub struct RecheckScheduler {
    store: Arc<RuleStore>,
    prober: Arc<dyn Prober>,
    config: RecheckConfig,
}

impl RecheckScheduler {
    pub fn new(store: Arc<RuleStore>, prober: Arc<dyn Prober>, config: RecheckConfig) -> Self {
        Self {
            store,
            prober,
            config,
        }
    }

    /// Start the background loop: one pass shortly after startup, then
    /// one pass per interval for the process lifetime. Returns `None`
    /// when rechecking is disabled in the configuration.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            info!("recheck disabled, auto-proxy hosts will not be re-validated");
            return None;
        }
        Some(tokio::spawn(async move {
            tokio::time::sleep(self.config.initial_delay).await;
            loop {
                self.run_once().await;
                tokio::time::sleep(self.config.interval).await;
            }
        }))
    }

    /// Run a single recheck pass.
    ///
    /// The candidate set is snapshotted under the store's read lock and
    /// the lock released before any probing; results are written back
    /// through the ordinary learn path. Auto-direct entries are never
    /// demoted here; only an organic probe failure can re-learn a host
    /// as auto-proxy.
    pub async fn run_once(&self) {
        let candidates = self.store.auto_proxy_hosts().await;
        if candidates.is_empty() {
            debug!("recheck: no auto-proxy hosts");
            return;
        }

        info!("rechecking {} auto-proxy hosts", candidates.len());
        for (host, port) in candidates {
            info!("* rechecking {} ...", host);
            if self.prober.check(&host, port).await {
                self.store.learn(&host, port, ProxyDecision::AutoDirect).await;
            }
        }
    }
}
