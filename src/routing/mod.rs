//! Routing Module
//!
//! The routing-decision core: rule storage and matching, connectivity
//! probing with dedup, the learning fallback, and periodic re-validation
//! of learned classifications.

pub mod probe;
pub mod recheck;
pub mod router;
pub mod rules;
pub mod store;
pub mod types;

pub use probe::{ConnectivityProbe, ProbeDeduper, Prober};
pub use recheck::RecheckScheduler;
pub use router::Router;
pub use rules::{load_auto, load_rules, parse_line, save_auto, RuleKey};
pub use store::RuleStore;
pub use types::{HostRule, ProxyDecision};
