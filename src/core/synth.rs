// Harmonic waveform synthesis with ADC-style distortions

use crate::core::constants::SAMPLING_FREQUENCY_HZ;
use crate::core::error::{PqError, Result};
use crate::core::format::{round_to, HarmonicSpectrum};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Distortions applied on top of the harmonic sum, in this order:
/// DC offset, uniform noise, symmetric clipping, quantization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Peak-to-peak width of the uniform noise band.
    pub noise_amplitude: f64,
    pub clip_magnitude: Option<f64>,
    pub dc_offset: f64,
    /// Decimal places kept per sample.
    pub decimals: i32,
}

impl SynthesisOptions {
    pub fn clean(decimals: i32) -> Self {
        Self {
            noise_amplitude: 0.0,
            clip_magnitude: None,
            dc_offset: 0.0,
            decimals,
        }
    }
}

/// Parameters for one synthesized channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec<'a> {
    pub fundamental_peak: f64,
    pub spectrum: &'a HarmonicSpectrum,
    pub phase_shift: f64,
    pub options: SynthesisOptions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicWaveformSynthesizer {
    sampling_frequency: f64,
}

impl HarmonicWaveformSynthesizer {
    pub fn new(sampling_frequency: f64) -> Result<Self> {
        if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
            return Err(PqError::invalid(format!(
                "sampling frequency must be positive, got {}",
                sampling_frequency
            )));
        }
        Ok(Self { sampling_frequency })
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Sample `Σ A·c_h·sin((h+1)·ω·t + phase)` at the device rate.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        channel: &ChannelSpec<'_>,
        samples: usize,
        frequency: f64,
        rng: &mut R,
    ) -> Vec<f64> {
        let omega = 2.0 * PI * frequency;
        let dt = 1.0 / self.sampling_frequency;
        let coefficients = channel.spectrum.as_slice();
        let options = &channel.options;

        (0..samples)
            .map(|i| {
                let t = i as f64 * dt;
                let mut value: f64 = coefficients
                    .iter()
                    .enumerate()
                    .map(|(h, coeff)| {
                        let order = (h + 1) as f64;
                        channel.fundamental_peak * coeff * (order * omega * t + channel.phase_shift).sin()
                    })
                    .sum();

                value += options.dc_offset;

                if options.noise_amplitude > 0.0 {
                    value += (rng.gen::<f64>() - 0.5) * options.noise_amplitude;
                }

                if let Some(clip) = options.clip_magnitude {
                    value = value.clamp(-clip.abs(), clip.abs());
                }

                round_to(value, options.decimals)
            })
            .collect()
    }
}

impl Default for HarmonicWaveformSynthesizer {
    fn default() -> Self {
        Self {
            sampling_frequency: SAMPLING_FREQUENCY_HZ,
        }
    }
}
