// Data structures shared by the power-quality pipeline

use crate::core::constants::HARMONIC_ORDERS;
use crate::core::error::{PqError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Equal-length voltage and current samples captured at a fixed rate.
///
/// Fields are private so a buffer cannot be altered after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformBuffer {
    #[serde(rename = "waveform_v")]
    voltage: Vec<f64>,
    #[serde(rename = "waveform_i")]
    current: Vec<f64>,
    sample_rate: f64,
}

impl WaveformBuffer {
    pub fn new(voltage: Vec<f64>, current: Vec<f64>, sample_rate: f64) -> Result<Self> {
        if voltage.len() != current.len() {
            return Err(PqError::ChannelMismatch {
                voltage: voltage.len(),
                current: current.len(),
            });
        }
        if voltage.is_empty() {
            return Err(PqError::invalid("waveform buffer has no samples"));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PqError::invalid(format!("sample rate must be positive, got {}", sample_rate)));
        }

        Ok(Self {
            voltage,
            current,
            sample_rate,
        })
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }
}

/// Harmonic coefficients, index 0 = fundamental, index k = order k+1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct HarmonicSpectrum {
    coefficients: Vec<f64>,
}

impl HarmonicSpectrum {
    pub fn new(coefficients: Vec<f64>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(PqError::InvalidSpectrum("spectrum needs at least the fundamental".to_string()));
        }
        if let Some((idx, value)) = coefficients
            .iter()
            .enumerate()
            .find(|(_, c)| !c.is_finite() || **c < 0.0)
        {
            return Err(PqError::InvalidSpectrum(format!(
                "coefficient for order {} must be finite and >= 0, got {}",
                idx + 1,
                value
            )));
        }

        Ok(Self { coefficients })
    }

    /// Single-order spectrum: a pure sinusoid.
    pub fn pure() -> Self {
        Self {
            coefficients: vec![1.0],
        }
    }

    /// Coefficient for a zero-based order index; missing orders read as zero.
    pub fn coefficient(&self, index: usize) -> f64 {
        self.coefficients.get(index).copied().unwrap_or(0.0)
    }

    pub fn orders(&self) -> usize {
        self.coefficients.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.coefficients
    }

    /// Absolute per-order amplitudes for a given fundamental peak.
    pub fn amplitudes(&self, fundamental_peak: f64) -> Vec<f64> {
        self.coefficients.iter().map(|c| fundamental_peak * c).collect()
    }
}

impl TryFrom<Vec<f64>> for HarmonicSpectrum {
    type Error = PqError;

    fn try_from(value: Vec<f64>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HarmonicSpectrum> for Vec<f64> {
    fn from(value: HarmonicSpectrum) -> Self {
        value.coefficients
    }
}

/// Bounds for synthetic residual harmonics reported above the true spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFloorConfig {
    pub total_orders: usize,
    /// Residuals are drawn from `[0, max_amplitude)` in channel units.
    pub max_amplitude: f64,
}

impl NoiseFloorConfig {
    pub fn voltage() -> Self {
        Self {
            total_orders: HARMONIC_ORDERS,
            max_amplitude: 0.3,
        }
    }

    pub fn current() -> Self {
        Self {
            total_orders: HARMONIC_ORDERS,
            max_amplitude: 0.003,
        }
    }
}

impl Default for NoiseFloorConfig {
    fn default() -> Self {
        Self::voltage()
    }
}

/// Where a channel's reported harmonic vector comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumSource {
    /// True data only, reported as-is.
    Measured(HarmonicSpectrum),
    /// True data padded with a bounded synthetic noise floor.
    Synthesized(HarmonicSpectrum, NoiseFloorConfig),
}

impl SpectrumSource {
    pub fn spectrum(&self) -> &HarmonicSpectrum {
        match self {
            SpectrumSource::Measured(s) | SpectrumSource::Synthesized(s, _) => s,
        }
    }

    /// Reported amplitude vector: rounded true amplitudes, then noise-floor
    /// residuals for the missing orders when synthesized.
    pub fn reported_amplitudes<R: Rng + ?Sized>(
        &self,
        fundamental_peak: f64,
        decimals: i32,
        rng: &mut R,
    ) -> Vec<f64> {
        let mut out: Vec<f64> = self
            .spectrum()
            .amplitudes(fundamental_peak)
            .into_iter()
            .map(|a| round_to(a, decimals))
            .collect();

        if let SpectrumSource::Synthesized(_, floor) = self {
            while out.len() < floor.total_orders {
                let residual = if floor.max_amplitude > 0.0 {
                    rng.gen_range(0.0..floor.max_amplitude)
                } else {
                    0.0
                };
                out.push(round_to(residual, decimals));
            }
        }

        out
    }
}

/// Round half away from zero to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// A derived quantity that may not be meaningful for the given input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reading {
    Ok(f64),
    /// Computed, but outside the range where the result can be trusted.
    Unreliable,
    /// Not computable for this input (weak fundamental, no load).
    Undefined,
}

impl Reading {
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Ok(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reading::Ok(_))
    }

    /// Collapse to a plain number, substituting `sentinel` when not `Ok`.
    pub fn or_sentinel(self, sentinel: f64) -> f64 {
        self.value().unwrap_or(sentinel)
    }
}

/// One finished measurement cycle.
///
/// Scalar fields carry the externally visible rounding; `*_reading` fields
/// keep the unrounded tagged results behind the sentinels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "v_rms")]
    pub voltage_rms: f64,
    #[serde(rename = "i_rms")]
    pub current_rms: f64,
    #[serde(rename = "p_act")]
    pub power_active: f64,
    pub power_apparent: f64,
    pub power_reactive: f64,
    pub power_distortion: f64,
    pub power_factor: f64,
    #[serde(rename = "freq")]
    pub frequency: f64,
    #[serde(rename = "freq_valid")]
    pub frequency_valid: bool,
    #[serde(rename = "thd_v")]
    pub thd_voltage: f64,
    #[serde(rename = "thd_i")]
    pub thd_current: f64,
    #[serde(rename = "harm_v")]
    pub harmonics_voltage: Vec<f64>,
    #[serde(rename = "harm_i")]
    pub harmonics_current: Vec<f64>,
    pub thd_voltage_reading: Reading,
    pub thd_current_reading: Reading,
    pub power_factor_reading: Reading,
    #[serde(flatten)]
    pub waveform: WaveformBuffer,
}

/// Exactly K periods cut from a buffer at a rising zero crossing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodWindow {
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub start_index: usize,
    pub samples_per_period: usize,
    pub periods: usize,
    pub inferred_sampling_rate: f64,
}

impl PeriodWindow {
    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }
}
