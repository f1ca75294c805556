//! Harmonic amplitude and phase extraction from captured samples.
//!
//! Each order is measured with a normalized single-bin DFT at `k * f0`.
//! The input is first trimmed to whole periods (when the voltage channel
//! allows it) so the bins fall on exact multiples of the window length.

use crate::core::constants::HARMONIC_ORDERS;
use crate::core::error::{PqError, Result};
use crate::core::format::WaveformBuffer;
use crate::core::period::{Extraction, PeriodExtractor};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHarmonics {
    /// Peak amplitude per order, index 0 = fundamental.
    pub amplitudes: Vec<f64>,
    /// Phase of the fundamental bin (rad).
    pub fundamental_phase: f64,
}

impl ChannelHarmonics {
    pub fn fundamental(&self) -> f64 {
        self.amplitudes.first().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferHarmonics {
    pub voltage: ChannelHarmonics,
    pub current: ChannelHarmonics,
    /// Samples actually analysed after period trimming.
    pub analysed_samples: usize,
}

impl BufferHarmonics {
    /// Fundamental current phase relative to voltage, wrapped to (-π, π].
    pub fn phase_angle(&self) -> f64 {
        wrap_phase(self.current.fundamental_phase - self.voltage.fundamental_phase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicAnalyzer {
    sample_rate: f64,
    max_order: usize,
}

impl HarmonicAnalyzer {
    pub fn new(sample_rate: f64, max_order: usize) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PqError::invalid(format!("sample rate must be positive, got {}", sample_rate)));
        }
        if max_order == 0 {
            return Err(PqError::invalid("at least the fundamental order is required"));
        }
        Ok(Self {
            sample_rate,
            max_order,
        })
    }

    pub fn for_buffer(buffer: &WaveformBuffer) -> Self {
        Self {
            sample_rate: buffer.sample_rate(),
            max_order: HARMONIC_ORDERS,
        }
    }

    /// Amplitudes of orders `1..=max_order` and the fundamental phase.
    /// Orders at or above Nyquist read as zero.
    pub fn analyze_channel(&self, samples: &[f64], fundamental_hz: f64) -> Result<ChannelHarmonics> {
        if samples.is_empty() {
            return Err(PqError::invalid("cannot analyse an empty channel"));
        }
        if !(fundamental_hz.is_finite() && fundamental_hz > 0.0) {
            return Err(PqError::invalid(format!(
                "fundamental frequency must be positive, got {}",
                fundamental_hz
            )));
        }

        let nyquist = self.sample_rate / 2.0;
        let mut amplitudes = Vec::with_capacity(self.max_order);
        let mut fundamental_phase = 0.0;

        for order in 1..=self.max_order {
            let freq = order as f64 * fundamental_hz;
            if freq >= nyquist {
                amplitudes.push(0.0);
                continue;
            }
            let (re, im) = dft_bin(samples, freq, self.sample_rate);
            amplitudes.push(2.0 * (re * re + im * im).sqrt());
            if order == 1 {
                fundamental_phase = im.atan2(re);
            }
        }

        Ok(ChannelHarmonics {
            amplitudes,
            fundamental_phase,
        })
    }

    /// Analyse both channels over the same whole-period window.
    pub fn analyze_buffer(&self, buffer: &WaveformBuffer, fundamental_hz: f64) -> Result<BufferHarmonics> {
        let (voltage, current) = match PeriodExtractor::new().extract_max(buffer, fundamental_hz)? {
            // Drop the closing sample so the window is exactly N periods
            Extraction::Window(w) => {
                let n = w.len() - 1;
                (w.voltage[..n].to_vec(), w.current[..n].to_vec())
            }
            Extraction::Unavailable(_) => (buffer.voltage().to_vec(), buffer.current().to_vec()),
        };

        Ok(BufferHarmonics {
            voltage: self.analyze_channel(&voltage, fundamental_hz)?,
            current: self.analyze_channel(&current, fundamental_hz)?,
            analysed_samples: voltage.len(),
        })
    }
}

/// Normalized DFT coefficient at an arbitrary frequency:
/// `X(f) = 1/N · Σ x[n]·exp(-j·2π·f·n/fs)`.
fn dft_bin(samples: &[f64], freq_hz: f64, sample_rate: f64) -> (f64, f64) {
    let step = -2.0 * PI * freq_hz / sample_rate;
    let (re, im) = samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(re, im), (n, &x)| {
            let angle = step * n as f64;
            (re + x * angle.cos(), im + x * angle.sin())
        });
    let len = samples.len() as f64;
    (re / len, im / len)
}

fn wrap_phase(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}
