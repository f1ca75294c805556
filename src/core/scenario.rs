// Load scenarios driving the measurement generator

use crate::core::error::{PqError, Result};
use crate::core::format::HarmonicSpectrum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub key: String,
    pub name: String,
    pub nominal_voltage: f64,
    pub voltage_harmonics: HarmonicSpectrum,
    pub current_harmonics: HarmonicSpectrum,
    /// Voltage noise band (V); current uses a thousandth of it.
    pub noise: f64,
    pub cos_phi: f64,
    #[serde(default)]
    pub clip_voltage: Option<f64>,
    #[serde(default)]
    pub dc_offset: Option<f64>,
    /// Draw 0.02..0.05 A instead of a load proportional to voltage.
    #[serde(default)]
    pub low_current_mode: bool,
}

impl Scenario {
    pub fn validate(&self) -> Result<()> {
        if !(self.cos_phi > 0.0 && self.cos_phi <= 1.0) {
            return Err(PqError::invalid(format!(
                "scenario '{}': cos_phi must be in (0, 1], got {}",
                self.key, self.cos_phi
            )));
        }
        if !(self.nominal_voltage.is_finite() && self.nominal_voltage > 0.0) {
            return Err(PqError::invalid(format!(
                "scenario '{}': nominal voltage must be positive",
                self.key
            )));
        }
        if self.noise < 0.0 {
            return Err(PqError::invalid(format!("scenario '{}': noise must be >= 0", self.key)));
        }
        Ok(())
    }

    /// Fundamental phase lag of current behind voltage (rad).
    pub fn phase_shift(&self) -> f64 {
        self.cos_phi.acos()
    }

    /// The built-in catalog: clean, distorted, clipped, asymmetric, low_current.
    pub fn presets() -> Vec<Scenario> {
        vec![
            preset(
                "clean",
                "Clean Power",
                230.0,
                &[1.0, 0.01, 0.005, 0.003, 0.002, 0.001, 0.001, 0.001],
                &[1.0, 0.01, 0.005, 0.003, 0.002, 0.001, 0.001, 0.001],
                0.5,
                0.95,
            ),
            preset(
                "distorted",
                "Distorted Power (Non-linear Load)",
                230.0,
                &[1.0, 0.02, 0.08, 0.04, 0.06, 0.03, 0.02, 0.015],
                &[1.0, 0.05, 0.15, 0.08, 0.12, 0.06, 0.04, 0.03],
                1.0,
                0.75,
            ),
            Scenario {
                clip_voltage: Some(340.0),
                ..preset(
                    "clipped",
                    "Voltage Clipping (Overload)",
                    248.0,
                    &[1.0, 0.03, 0.12, 0.06, 0.08, 0.04, 0.03, 0.02],
                    &[1.0, 0.04, 0.10, 0.05, 0.08, 0.04, 0.03, 0.02],
                    2.0,
                    0.85,
                )
            },
            Scenario {
                dc_offset: Some(5.0),
                ..preset(
                    "asymmetric",
                    "Asymmetric Waveform",
                    225.0,
                    &[1.0, 0.04, 0.06, 0.08, 0.05, 0.04, 0.02, 0.015],
                    &[1.0, 0.05, 0.08, 0.06, 0.07, 0.04, 0.03, 0.02],
                    1.5,
                    0.68,
                )
            },
            Scenario {
                low_current_mode: true,
                ..preset(
                    "low_current",
                    "Very Low Current (Phone Charger)",
                    230.0,
                    &[1.0, 0.015, 0.008, 0.005, 0.003, 0.002, 0.001, 0.001],
                    &[1.0, 0.08, 0.12, 0.06, 0.04, 0.02, 0.01, 0.008],
                    0.8,
                    0.65,
                )
            },
        ]
    }
}

fn preset(
    key: &str,
    name: &str,
    nominal_voltage: f64,
    voltage: &[f64],
    current: &[f64],
    noise: f64,
    cos_phi: f64,
) -> Scenario {
    Scenario {
        key: key.to_string(),
        name: name.to_string(),
        nominal_voltage,
        voltage_harmonics: spectrum(voltage),
        current_harmonics: spectrum(current),
        noise,
        cos_phi,
        clip_voltage: None,
        dc_offset: None,
        low_current_mode: false,
    }
}

// Preset tables are non-empty and non-negative
fn spectrum(coefficients: &[f64]) -> HarmonicSpectrum {
    HarmonicSpectrum::new(coefficients.to_vec()).unwrap_or_else(|_| HarmonicSpectrum::pure())
}

/// Scenario lookup by key over presets plus custom entries.
///
/// Custom entries with a preset's key replace that preset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    pub fn with_custom(custom: Vec<Scenario>) -> Result<Self> {
        let mut scenarios = Scenario::presets();
        for scenario in custom {
            scenario.validate()?;
            match scenarios.iter_mut().find(|s| s.key == scenario.key) {
                Some(existing) => *existing = scenario,
                None => scenarios.push(scenario),
            }
        }
        Ok(Self { scenarios })
    }

    pub fn get(&self, key: &str) -> Result<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| PqError::UnknownScenario(key.to_string()))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.key.as_str()).collect()
    }

    /// Resolve a rotation list; an empty list means every scenario in order.
    pub fn resolve(&self, keys: &[String]) -> Result<Vec<Scenario>> {
        if keys.is_empty() {
            return Ok(self.scenarios.clone());
        }
        keys.iter().map(|k| self.get(k).cloned()).collect()
    }
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self {
            scenarios: Scenario::presets(),
        }
    }
}
