//! RustRoute Library
//!
//! Routing-decision core for a proxy client: for every destination
//! host:port it decides whether to connect directly, through the proxy,
//! or to refuse the connection, and it learns this decision automatically
//! by probing real network reachability when no explicit rule exists.

pub mod config;
pub mod routing;

pub use config::Config;
pub use routing::{
    ConnectivityProbe, ProbeDeduper, Prober, ProxyDecision, RecheckScheduler, Router, RuleStore,
};

/// Common error type for the routing core
pub type Result<T> = anyhow::Result<T>;
