//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `http_attenuator` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - Loading and building the gateway configuration
//! - Printing the selection report
//!
//! All core functionality is implemented in the library crate.

use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use http_attenuator::initialization::init_logger_with;
use http_attenuator::metrics::MetricsSink;
use http_attenuator::pulse::SharedStore;
use http_attenuator::{CounterSink, GatewayConfig, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    match run(&opt).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("http_attenuator error: {:#}", e);
            process::exit(1);
        }
    }
}

#[cfg(feature = "redis-backend")]
async fn shared_store(opt: &Opt) -> Result<Option<Arc<dyn SharedStore>>> {
    match &opt.redis_url {
        Some(url) => {
            let store = http_attenuator::pulse::RedisStore::connect(url)
                .await
                .with_context(|| format!("Failed to connect to {}", url))?;
            Ok(Some(Arc::new(store)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "redis-backend"))]
async fn shared_store(_opt: &Opt) -> Result<Option<Arc<dyn SharedStore>>> {
    Ok(None)
}

async fn run(opt: &Opt) -> Result<()> {
    let config = GatewayConfig::load(&opt.config)?;
    let store = shared_store(opt).await?;

    let counters = Arc::new(CounterSink::new());
    let sink: Arc<dyn MetricsSink> = counters.clone();
    let gateway = config
        .build_with(sink, store)
        .context("Invalid gateway configuration")?;

    for name in gateway.attenuator_names() {
        if let Some(attenuator) = gateway.attenuator(name) {
            println!("attenuator {}", attenuator);
        }
    }

    let report = gateway.selection_report(
        opt.draws,
        opt.service.as_deref(),
        opt.pathology.as_deref(),
    );
    if report.is_empty() && (opt.service.is_some() || opt.pathology.is_some()) {
        bail!("No upstream or pathology matches the requested filter");
    }
    print!("{}", report);

    counters.log_summary();
    gateway.shutdown();
    Ok(())
}
