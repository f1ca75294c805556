use serde::{Deserialize, Serialize};

use pq_core::core::driver::{DriverSettings, NodeConfig};
use pq_core::core::scenario::Scenario;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub name: String,
    /// Stop after this many payloads per node; run until Ctrl-C when absent.
    pub max_ticks: Option<u64>,
    pub channel_capacity: usize,
    pub nodes: Vec<NodeConfig>,
    pub custom_scenarios: Vec<Scenario>,
    pub driver: DriverSettings,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            name: "pq-simulator".to_string(),
            max_ticks: None,
            channel_capacity: 64,
            nodes: vec![NodeConfig {
                id: "node-1".to_string(),
                scenarios: Vec::new(),
                seed: None,
            }],
            custom_scenarios: Vec::new(),
            driver: DriverSettings::default(),
        }
    }
}
