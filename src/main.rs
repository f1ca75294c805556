use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn, Level};
use uuid::Uuid;

mod models;
mod utils;

use crate::utils::conf_helper::load_config;
use pq_core::{run_node, MeasurementPayload, NodeSimulator, ScenarioCatalog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries JSON lines, logs go to stderr
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    // === CONFIG ===
    let path = std::env::args().nth(1);
    let config = load_config(path.as_deref())
        .await
        .map_err(anyhow::Error::msg)
        .context("CRITICAL INIT FAILURE")?;

    let catalog = ScenarioCatalog::with_custom(config.custom_scenarios.clone())
        .context("invalid custom scenario")?;
    info!("Scenarios available: {}", catalog.keys().join(", "));

    let run_id = Uuid::new_v4();
    info!("{} run {} starting with {} node(s)", config.name, run_id, config.nodes.len());

    // === NODE TASKS ===
    let (tx, mut rx) = mpsc::channel::<MeasurementPayload>(config.channel_capacity.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);
    let tick = Duration::from_millis(config.driver.tick_interval_ms);

    let mut handles = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        let scenarios = catalog
            .resolve(&node.scenarios)
            .with_context(|| format!("node '{}'", node.id))?;
        let simulator = NodeSimulator::new(run_id, node, scenarios, &config.driver)
            .with_context(|| format!("node '{}'", node.id))?;
        handles.push(tokio::spawn(run_node(simulator, tick, tx.clone(), stop_rx.clone())));
    }
    drop(tx);

    let stop_on_ctrl_c = stop_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping nodes");
            let _ = stop_on_ctrl_c.send(true);
        }
    });

    // === OUTPUT ===
    let limit = config.max_ticks.map(|t| t * config.nodes.len() as u64);
    let mut printed: u64 = 0;

    while let Some(payload) = rx.recv().await {
        match serde_json::to_string(&payload) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("json serialize error: {}", e);
                continue;
            }
        }

        info!(
            "[{}#{}] {} V={} I={} P={} PF={} f={} THD_V={} -> {}",
            payload.node,
            payload.seq,
            payload.scenario,
            payload.measurement.voltage_rms,
            payload.measurement.current_rms,
            payload.measurement.power_active,
            payload.measurement.power_factor,
            payload.measurement.frequency,
            payload.measurement.thd_voltage,
            payload.compliance.status_message
        );

        printed += 1;
        if limit.is_some_and(|l| printed >= l) {
            let _ = stop_tx.send(true);
            break;
        }
    }
    drop(rx);

    for handle in handles {
        match handle.await {
            Ok(Ok(delivered)) => info!("node task delivered {} payloads", delivered),
            Ok(Err(e)) => warn!("node task failed: {}", e),
            Err(e) => error!("node task panicked: {}", e),
        }
    }

    info!("run {} finished, {} payloads written", run_id, printed);
    Ok(())
}
