use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::compliance::{ComplianceEvaluator, ComplianceLimits, ComplianceReport};
use crate::core::error::{PqError, Result};
use crate::core::format::Measurement;
use crate::core::measurement::{GeneratorSettings, MeasurementGenerator};
use crate::core::period::{DisplayWindow, PeriodExtractor};
use crate::core::scenario::Scenario;
use crate::core::validator::{validate_measurement, ValidationResult};

/// One tick of one node, ready for the transport.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementPayload {
    pub run_id: Uuid,
    pub node: String,
    pub seq: u64,
    pub scenario: String,
    pub measurement: Measurement,
    pub compliance: ComplianceReport,
    pub validation: ValidationResult,
    pub display: DisplayWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub tick_interval_ms: u64,
    /// Ticks spent on each scenario before moving to the next; 0 pins the first.
    pub scenario_rotation: u64,
    pub display_periods: usize,
    pub crossing_debounce: usize,
    pub generator: GeneratorSettings,
    pub compliance: ComplianceLimits,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            scenario_rotation: 10,
            display_periods: 2,
            crossing_debounce: 0,
            generator: GeneratorSettings::default(),
            compliance: ComplianceLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    /// Rotation order by scenario key; empty means the whole catalog.
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Per-node generation state. Owned by exactly one task.
pub struct NodeSimulator {
    run_id: Uuid,
    node_id: String,
    scenarios: Vec<Scenario>,
    rotation: u64,
    display_periods: usize,
    nominal_frequency: f64,
    generator: MeasurementGenerator,
    evaluator: ComplianceEvaluator,
    extractor: PeriodExtractor,
    rng: StdRng,
    seq: u64,
}

impl NodeSimulator {
    pub fn new(
        run_id: Uuid,
        node: &NodeConfig,
        scenarios: Vec<Scenario>,
        settings: &DriverSettings,
    ) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(PqError::invalid(format!("node '{}' has no scenarios", node.id)));
        }
        let rng = match node.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            run_id,
            node_id: node.id.clone(),
            scenarios,
            rotation: settings.scenario_rotation,
            display_periods: settings.display_periods.max(1),
            nominal_frequency: settings.generator.nominal_frequency,
            generator: MeasurementGenerator::new(settings.generator.clone())?,
            evaluator: ComplianceEvaluator::new(settings.compliance),
            extractor: PeriodExtractor::new().with_min_crossing_distance(settings.crossing_debounce),
            rng,
            seq: 0,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn current_scenario(&self) -> &Scenario {
        let index = match self.rotation {
            0 => 0,
            r => ((self.seq / r) % self.scenarios.len() as u64) as usize,
        };
        &self.scenarios[index]
    }

    pub fn next_payload(&mut self) -> Result<MeasurementPayload> {
        let scenario = self.current_scenario().clone();
        let measurement = self.generator.generate(&scenario, &mut self.rng)?;
        let compliance = self.evaluator.evaluate_measurement(&measurement);
        let validation = validate_measurement(&measurement);
        let display = self.extractor.extract_for_display(
            &measurement.waveform,
            self.nominal_frequency,
            self.display_periods,
        )?;

        let payload = MeasurementPayload {
            run_id: self.run_id,
            node: self.node_id.clone(),
            seq: self.seq,
            scenario: scenario.key,
            measurement,
            compliance,
            validation,
            display,
        };
        self.seq += 1;
        Ok(payload)
    }
}

/// Tick loop for one node. Returns the number of payloads delivered.
///
/// Ends when `shutdown` flips to true (or its sender is dropped) or the
/// sink is closed.
pub async fn run_node(
    mut node: NodeSimulator,
    tick_interval: Duration,
    sink: mpsc::Sender<MeasurementPayload>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64> {
    info!("node {} started", node.node_id());

    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut delivered: u64 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let payload = match node.next_payload() {
            Ok(p) => p,
            Err(e) => {
                error!("node {} generation failed: {}", node.node_id(), e);
                return Err(e);
            }
        };

        if !payload.validation.valid {
            warn!(
                "node {} seq {} invalid: {:?}",
                payload.node, payload.seq, payload.validation.errors
            );
        }
        debug!(
            "node {} seq {} scenario {} v_rms {} thd_v {}",
            payload.node,
            payload.seq,
            payload.scenario,
            payload.measurement.voltage_rms,
            payload.measurement.thd_voltage
        );

        // A full sink must not hold off shutdown
        tokio::select! {
            sent = sink.send(payload) => {
                if let Err(e) = sent {
                    warn!("node {} sink closed: {}", node.node_id(), e);
                    break;
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("node {} stopped while waiting on the sink", node.node_id());
                break;
            }
        }
        delivered += 1;
    }

    info!("node {} finished after {} payloads", node.node_id(), delivered);
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenario::ScenarioCatalog;

    fn node(seed: u64) -> NodeConfig {
        NodeConfig {
            id: "node-a".to_string(),
            scenarios: vec!["clean".to_string(), "distorted".to_string()],
            seed: Some(seed),
        }
    }

    fn simulator(seed: u64, settings: &DriverSettings) -> NodeSimulator {
        let cfg = node(seed);
        let scenarios = ScenarioCatalog::default().resolve(&cfg.scenarios).unwrap();
        NodeSimulator::new(Uuid::new_v4(), &cfg, scenarios, settings).unwrap()
    }

    #[test]
    fn test_sequence_and_rotation() {
        let settings = DriverSettings {
            scenario_rotation: 2,
            ..DriverSettings::default()
        };
        let mut sim = simulator(7, &settings);

        let keys: Vec<String> = (0..5).map(|_| sim.next_payload().unwrap().scenario).collect();
        assert_eq!(keys, ["clean", "clean", "distorted", "distorted", "clean"]);

        let next = sim.next_payload().unwrap();
        assert_eq!(next.seq, 5);
        assert_eq!(next.node, "node-a");
    }

    #[test]
    fn test_rotation_disabled() {
        let settings = DriverSettings {
            scenario_rotation: 0,
            ..DriverSettings::default()
        };
        let mut sim = simulator(7, &settings);
        for _ in 0..4 {
            assert_eq!(sim.next_payload().unwrap().scenario, "clean");
        }
    }

    #[test]
    fn test_seeded_nodes_are_reproducible() {
        let settings = DriverSettings::default();
        let a = simulator(99, &settings).next_payload().unwrap();
        let b = simulator(99, &settings).next_payload().unwrap();
        assert_eq!(a.measurement.waveform, b.measurement.waveform);
        assert_eq!(a.measurement.harmonics_voltage, b.measurement.harmonics_voltage);
    }

    #[test]
    fn test_payload_contents() {
        let settings = DriverSettings {
            generator: GeneratorSettings::deterministic(),
            ..DriverSettings::default()
        };
        let payload = simulator(1, &settings).next_payload().unwrap();

        assert!(matches!(payload.display, DisplayWindow::Locked(_)));
        assert_eq!(payload.compliance.overall_compliant, Some(true));
        assert!(payload.validation.valid);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["measurement"]["freq"], 50.0);
        assert!(json["measurement"]["waveform_v"].is_array());
        assert_eq!(json["display"]["kind"], "locked");
    }

    #[test]
    fn test_empty_rotation_is_rejected() {
        let cfg = node(1);
        assert!(NodeSimulator::new(Uuid::new_v4(), &cfg, vec![], &DriverSettings::default()).is_err());
    }

    #[tokio::test]
    async fn test_run_node_until_shutdown() {
        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let sim = simulator(3, &DriverSettings::default());

        let handle = tokio::spawn(run_node(sim, Duration::from_millis(5), tx, stop_rx));

        for expected in 0..3 {
            let payload = rx.recv().await.unwrap();
            assert_eq!(payload.seq, expected);
        }
        stop_tx.send(true).unwrap();

        let delivered = handle.await.unwrap().unwrap();
        assert!(delivered >= 3);
    }

    #[tokio::test]
    async fn test_run_node_stops_while_sink_is_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let sim = simulator(3, &DriverSettings::default());

        let handle = tokio::spawn(run_node(sim, Duration::from_millis(1), tx, stop_rx));

        // Let the node fill the channel and block on the next send
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("node did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 0);
    }

    #[tokio::test]
    async fn test_run_node_stops_on_closed_sink() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let sim = simulator(3, &DriverSettings::default());

        let delivered = run_node(sim, Duration::from_millis(1), tx, stop_rx).await.unwrap();
        assert_eq!(delivered, 0);
    }
}
