// Budeanu power decomposition
//
// S is split into active P, fundamental reactive Q1 and distortion D with
// S^2 = P^2 + Q1^2 + D^2. Q1 comes from the fundamental phasors only.

use crate::core::constants::APPARENT_POWER_DEADBAND;
use crate::core::format::Reading;
use serde::Serialize;
use std::f64::consts::SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerInputs {
    pub voltage_rms: f64,
    pub current_rms: f64,
    pub voltage_fundamental_peak: f64,
    pub current_fundamental_peak: f64,
    /// Fundamental current phase minus fundamental voltage phase (rad).
    pub phase_angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerQuality {
    pub apparent: f64,
    pub active: f64,
    /// Signed fundamental reactive power Q1.
    pub reactive: f64,
    pub distortion: f64,
    /// `P/S`, or 1.0 inside the no-load deadband.
    pub power_factor: f64,
    pub power_factor_reading: Reading,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerQualityCalculator {
    noise_gate_current: Option<f64>,
}

impl PowerQualityCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every power quantity when `Irms` is below `gate` amps.
    pub fn with_noise_gate(mut self, gate: f64) -> Self {
        self.noise_gate_current = Some(gate);
        self
    }

    pub fn compute(&self, inputs: &PowerInputs) -> PowerQuality {
        if let Some(gate) = self.noise_gate_current {
            if inputs.current_rms < gate {
                return PowerQuality {
                    apparent: 0.0,
                    active: 0.0,
                    reactive: 0.0,
                    distortion: 0.0,
                    power_factor: 1.0,
                    power_factor_reading: Reading::Undefined,
                };
            }
        }

        let apparent = inputs.voltage_rms * inputs.current_rms;
        let active = apparent * inputs.phase_angle.cos();

        let u1_rms = inputs.voltage_fundamental_peak / SQRT_2;
        let i1_rms = inputs.current_fundamental_peak / SQRT_2;
        let reactive = u1_rms * i1_rms * inputs.phase_angle.sin();

        // Round-off can push the radicand slightly negative
        let d2 = (apparent * apparent - active * active - reactive * reactive).max(0.0);
        let distortion = d2.sqrt();

        let power_factor_reading = power_factor(active, apparent);

        PowerQuality {
            apparent,
            active,
            reactive,
            distortion,
            power_factor: power_factor_reading.or_sentinel(1.0),
            power_factor_reading,
        }
    }
}

/// `λ = P/S`, undefined at or below the apparent power deadband.
pub fn power_factor(active: f64, apparent: f64) -> Reading {
    if apparent > APPARENT_POWER_DEADBAND {
        Reading::Ok(active / apparent)
    } else {
        Reading::Undefined
    }
}
