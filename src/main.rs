//! RustRoute - Routing-decision core for a proxy client
//!
//! Diagnostic CLI: loads the rule files, decides each given HOST:PORT
//! target the way the proxy client would, and persists anything learned.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rustroute::config::ConfigManager;
use rustroute::routing::{
    load_auto, load_rules, save_auto, ConnectivityProbe, ProbeDeduper, Prober, RecheckScheduler,
    Router, RuleStore,
};

/// CLI arguments for RustRoute
#[derive(Parser, Debug)]
#[command(name = "rustroute")]
#[command(about = "RustRoute - routing decisions for proxy destinations")]
#[command(version)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Rule file path (overrides config file)
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Run one recheck pass over auto-proxy hosts before deciding
    #[arg(long)]
    pub recheck: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Targets to decide, as HOST:PORT
    #[arg(required = true)]
    pub targets: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let mut config = ConfigManager::load_from_file(&args.config)?;
    if let Some(rules) = args.rules {
        config.rules.rule_file = rules;
    }

    let store = Arc::new(RuleStore::new());
    load_rules(&store, &config.rules.rule_file).await;
    load_auto(&store, &config.rules.auto_rule_file).await;
    info!(
        "{} host rules, {} cidr rules",
        store.host_rule_count().await,
        store.cidr_rule_count().await
    );

    let probe = Arc::new(ConnectivityProbe::new(
        config.probe.connect_timeout,
        config.probe.tls_port,
    ));
    let prober: Arc<dyn Prober> = Arc::new(ProbeDeduper::new(probe));
    let router = Router::new(Arc::clone(&store), Arc::clone(&prober));

    if args.recheck {
        if config.recheck.enabled {
            let scheduler = RecheckScheduler::new(
                Arc::clone(&store),
                Arc::clone(&prober),
                config.recheck.clone(),
            );
            scheduler.run_once().await;
        } else {
            warn!("recheck requested but disabled in configuration");
        }
    }

    for target in &args.targets {
        let (host, port) = parse_target(target)
            .with_context(|| format!("invalid target, expected HOST:PORT: {}", target))?;
        let decision = router.decide(host, port).await;
        println!("{}:{} -> {}", host, port, decision);
    }

    if let Err(e) = save_auto(&store, &config.rules.auto_rule_file).await {
        warn!("could not save auto rules: {}", e);
    }

    Ok(())
}

fn parse_target(target: &str) -> Option<(&str, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}
