//! numshop - balance ledger & order workflow core.
//!
//! The messaging platform stays a black box: inbound events arrive as
//! newline-delimited JSON on stdin, outbound sends leave as JSON lines on
//! stdout (see [`numshop::gateway::ConsoleGateway`]). Each inbound event
//! is dispatched as its own task, the same concurrency shape as many
//! simultaneous chat sessions.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use numshop::{
    AdminAuthority, AppConfig, Catalog, ConsoleGateway, Dispatcher, FileStore, InboundEvent,
    Ledger, OrderWorkflow, ReferralEngine, Registry,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(&get_env());
    let _guard = numshop::logging::init_logging(&config);
    info!(admin_id = config.admin_id, data_dir = %config.store.data_dir, "starting numshop core");

    let store = Arc::new(FileStore::open(&config.store.data_dir).context("opening store")?);
    let ledger = Ledger::new(Arc::clone(&store));
    let registry = Registry::new(Arc::clone(&store));
    let referral = ReferralEngine::new(registry.clone(), ledger.clone(), config.referral_bonus);
    let catalog = Arc::new(Catalog::new(config.catalog.clone()));
    let workflow = Arc::new(OrderWorkflow::new(ledger.clone(), Arc::clone(&catalog)));
    let gateway = Arc::new(ConsoleGateway);
    let authority = AdminAuthority::new(
        config.admin_id,
        ledger.clone(),
        registry.clone(),
        Arc::clone(&workflow),
        Arc::clone(&gateway),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        ledger, registry, referral, workflow, authority, gateway,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundEvent>(&line) {
            Ok(event) => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.dispatch(event).await;
                });
            }
            Err(e) => warn!(%e, "unparseable inbound event skipped"),
        }
    }

    info!("event stream closed, shutting down");
    Ok(())
}
