//! Loopback simulator for tiered modifier sync.
//!
//! Runs a predicting client, its authoritative server and a simulated proxy
//! in one process, joined by fixed-latency links, and reports whether all
//! three agree on every category's effective level at the end.
//!
//! Run with: `cargo run -p stride-sim -- --latency-ticks 6`

mod link;
mod loopback;
mod script;

use clap::Parser;
use stride_config::{CliArgs, Config};
use tracing::{error, info, warn};

use crate::loopback::Loopback;
use crate::script::Script;

fn main() {
    let args = CliArgs::parse();
    let config_dir = args.config_dir();

    let mut config = match config_dir.as_deref() {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config from {}: {e}; using defaults", dir.display());
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.as_ref().map(|dir| dir.join("logs"));
    stride_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    let sim = &config.simulation;
    info!(
        ticks = sim.ticks,
        tick_rate = sim.tick_rate,
        latency_ticks = sim.latency_ticks,
        categories = config.modifiers.categories.len(),
        "starting loopback session"
    );

    let mut session = match Loopback::new(&config, Script::demo()) {
        Ok(session) => session,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let report = session.run(sim.ticks);

    let seconds = report.ticks as f64 / f64::from(sim.tick_rate);
    let stats = &report.stats;
    info!(
        ticks = report.ticks,
        simulated_seconds = seconds,
        packets = stats.packets_sent,
        bytes = stats.bytes_sent,
        acks = stats.acks,
        corrections = stats.corrections,
        suppressed = stats.corrections_suppressed,
        replayed = stats.moves_replayed,
        events = stats.client_events,
        stalls = stats.stalls,
        "session finished"
    );
    if stats.packets_sent > 0 {
        info!(
            "Average move packet: {:.1} bytes",
            stats.bytes_sent as f64 / stats.packets_sent as f64
        );
    }

    if report.converged() {
        info!(levels = ?report.server_levels, "client, server and proxy converged");
    } else {
        warn!(
            client = ?report.client_levels,
            server = ?report.server_levels,
            proxy = ?report.proxy_levels,
            "peers diverged"
        );
        std::process::exit(2);
    }
}
