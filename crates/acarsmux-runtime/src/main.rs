//! acarsmux: share one Hoppie ACARS account between several clients.
//!
//! Single-process binary: HTTP front, fan-out engine and upstream relay
//! all run in-process.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use acarsmux_core::logon_gate::LogonGate;
use acarsmux_fanout::engine::EngineConfig;
use acarsmux_fanout::send_dedup::{DEFAULT_CAPACITY, SendDedup};
use acarsmux_relay::HttpUpstream;

mod cli;
mod dispatch;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("ACARSMUX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let gate = LogonGate::from_csv(&args.allowed_logons).context("invalid ALLOWED_LOGONS")?;
    let upstream = HttpUpstream::new(&args.upstream, &args.hoppie_logon, args.upstream_timeout())
        .context("failed to set up upstream relay")?;

    let engine_config = EngineConfig {
        coalesce_window: args.coalesce_window(),
        fetch_timeout: args.fetch_timeout(),
    };
    let send_dedup = args
        .send_dedup_window()
        .map(|window| SendDedup::new(DEFAULT_CAPACITY, window));

    tracing::info!(
        upstream = %upstream.redacted_url(),
        allowed_logons = gate.len(),
        coalesce_secs = args.poll_coalesce_secs,
        upstream_timeout_secs = args.upstream_timeout_secs,
        send_dedup = send_dedup.is_some(),
        "acarsmux starting"
    );

    let state = server::AppState::new(
        gate,
        Arc::new(upstream),
        engine_config,
        send_dedup,
        args.fetch_timeout(),
    );
    server::run_server(args.listen, state).await
}
