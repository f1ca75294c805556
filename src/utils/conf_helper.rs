use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::models::simulator_model::SimulatorConfig;

pub const DEFAULT_CONFIG_PATH: &str = "simulator.json";

/// Load the simulator configuration.
///
/// An explicit path must exist; a missing default file falls back to the
/// built-in configuration.
pub async fn load_config(path: Option<&str>) -> Result<SimulatorConfig, String> {
    let file_path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    if path.is_none() && !Path::new(file_path).exists() {
        warn!("{} not found, using built-in defaults", file_path);
        return Ok(SimulatorConfig::default());
    }

    let data = fs::read_to_string(file_path)
        .await
        .map_err(|e| format!("File read Error: {e} {file_path}"))?;

    let config = parse_config(&data)?;

    info!(
        "Config loaded from {}: {} node(s), {} custom scenario(s)",
        file_path,
        config.nodes.len(),
        config.custom_scenarios.len()
    );

    Ok(config)
}

pub fn parse_config(data: &str) -> Result<SimulatorConfig, String> {
    let config: SimulatorConfig =
        serde_json::from_str(data).map_err(|e| format!("JSON Parse Error: {e}"))?;

    if config.nodes.is_empty() {
        return Err("Config Error: at least one node is required".to_string());
    }
    if config.driver.tick_interval_ms == 0 {
        return Err("Config Error: tick_interval_ms must be positive".to_string());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_empty_nodes() {
        let err = parse_config(r#"{ "nodes": [] }"#).unwrap_err();
        assert!(err.contains("at least one node"));
    }

    #[test]
    fn test_parse_reports_json_errors() {
        assert!(parse_config("{ nodes: ").unwrap_err().starts_with("JSON Parse Error"));
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_error() {
        let err = load_config(Some("does/not/exist.json")).await.unwrap_err();
        assert!(err.starts_with("File read Error"));
    }
}
