//! Measurement pipeline.
//!
//! Two entry points produce the same [`Measurement`] record:
//!
//! - [`MeasurementGenerator::generate`] synthesizes a capture for a load
//!   [`Scenario`] (simulated node), then measures it.
//! - [`analyze_capture`] measures an existing [`WaveformBuffer`], estimating
//!   frequency from zero crossings and harmonics with a DFT.
//!
//! Both finish through the same rounding step so downstream consumers see
//! identical precision regardless of the source.

use crate::core::constants::*;
use crate::core::error::{PqError, Result};
use crate::core::format::{
    round_to, HarmonicSpectrum, Measurement, NoiseFloorConfig, Reading, SpectrumSource,
    WaveformBuffer,
};
use crate::core::period::{estimate_frequency, is_plausible_frequency};
use crate::core::power::{PowerInputs, PowerQuality, PowerQualityCalculator};
use crate::core::scenario::Scenario;
use crate::core::spectrum::HarmonicAnalyzer;
use crate::core::stats::{assess_thd, compute_rms};
use crate::core::synth::{ChannelSpec, HarmonicWaveformSynthesizer, SynthesisOptions};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub sampling_frequency: f64,
    pub nominal_frequency: f64,
    /// Total width of the uniform frequency drift band (Hz).
    pub frequency_jitter: f64,
    /// Total width of the uniform RMS voltage band (V).
    pub voltage_jitter: f64,
    /// Whole fundamental cycles per capture; one closing sample is appended.
    pub capture_cycles: usize,
    /// Start each capture at a random phase, as a free-running ADC would.
    pub random_capture_phase: bool,
    pub voltage_noise_floor: Option<NoiseFloorConfig>,
    pub current_noise_floor: Option<NoiseFloorConfig>,
    pub noise_gate_current: Option<f64>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            sampling_frequency: SAMPLING_FREQUENCY_HZ,
            nominal_frequency: NOMINAL_FREQUENCY,
            frequency_jitter: 0.4,
            voltage_jitter: 4.0,
            capture_cycles: 3,
            random_capture_phase: false,
            voltage_noise_floor: Some(NoiseFloorConfig::voltage()),
            current_noise_floor: Some(NoiseFloorConfig::current()),
            noise_gate_current: None,
        }
    }
}

impl GeneratorSettings {
    /// Reject settings that would yield a non-positive frequency or an
    /// unbounded capture length.
    pub fn validate(&self) -> Result<()> {
        let f0 = self.nominal_frequency;
        if !(f0.is_finite() && f0 > 0.0) {
            return Err(PqError::invalid(format!("nominal frequency must be positive, got {}", f0)));
        }
        if !(self.frequency_jitter >= 0.0 && self.frequency_jitter < 2.0 * f0) {
            return Err(PqError::invalid(format!(
                "frequency jitter must be in [0, {}), got {}",
                2.0 * f0,
                self.frequency_jitter
            )));
        }
        if !(self.voltage_jitter.is_finite() && self.voltage_jitter >= 0.0) {
            return Err(PqError::invalid(format!(
                "voltage jitter must be >= 0, got {}",
                self.voltage_jitter
            )));
        }
        if self.capture_cycles == 0 || self.capture_cycles > MAX_CAPTURE_CYCLES {
            return Err(PqError::invalid(format!(
                "capture cycles must be in 1..={}, got {}",
                MAX_CAPTURE_CYCLES, self.capture_cycles
            )));
        }
        // Lowest possible frequency bounds the samples per cycle
        let slowest = f0 - self.frequency_jitter / 2.0;
        let samples_per_cycle = self.sampling_frequency / slowest;
        if !(samples_per_cycle.is_finite() && samples_per_cycle <= MAX_SAMPLES_PER_CYCLE) {
            return Err(PqError::invalid(format!(
                "{} Hz sampling gives {} samples per cycle at {} Hz",
                self.sampling_frequency, samples_per_cycle, slowest
            )));
        }
        Ok(())
    }

    /// No drift, no padding: every draw except waveform noise is fixed.
    pub fn deterministic() -> Self {
        Self {
            frequency_jitter: 0.0,
            voltage_jitter: 0.0,
            voltage_noise_floor: None,
            current_noise_floor: None,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementGenerator {
    synthesizer: HarmonicWaveformSynthesizer,
    calculator: PowerQualityCalculator,
    settings: GeneratorSettings,
}

impl MeasurementGenerator {
    pub fn new(settings: GeneratorSettings) -> Result<Self> {
        settings.validate()?;
        let synthesizer = HarmonicWaveformSynthesizer::new(settings.sampling_frequency)?;
        let calculator = match settings.noise_gate_current {
            Some(gate) => PowerQualityCalculator::new().with_noise_gate(gate),
            None => PowerQualityCalculator::new(),
        };
        Ok(Self {
            synthesizer,
            calculator,
            settings,
        })
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn generate<R: Rng + ?Sized>(&self, scenario: &Scenario, rng: &mut R) -> Result<Measurement> {
        scenario.validate()?;
        let s = &self.settings;

        let frequency = s.nominal_frequency + jitter(rng, s.frequency_jitter);
        let samples_per_cycle = (s.sampling_frequency / frequency).round() as usize;
        let samples = s.capture_cycles * samples_per_cycle.max(1) + 1;

        let v_rms_target = scenario.nominal_voltage + jitter(rng, s.voltage_jitter);
        let v_fundamental = v_rms_target * SQRT_2;

        let i_rms_target = if scenario.low_current_mode {
            0.02 + rng.gen::<f64>() * 0.03
        } else {
            v_rms_target * (0.01 + rng.gen::<f64>() * 0.05) / scenario.cos_phi
        };
        let i_fundamental = i_rms_target * SQRT_2;

        let phase_shift = scenario.phase_shift();
        let capture_phase = if s.random_capture_phase {
            rng.gen_range(0.0..2.0 * PI)
        } else {
            0.0
        };

        let voltage_channel = ChannelSpec {
            fundamental_peak: v_fundamental,
            spectrum: &scenario.voltage_harmonics,
            phase_shift: capture_phase,
            options: SynthesisOptions {
                noise_amplitude: scenario.noise,
                clip_magnitude: scenario.clip_voltage,
                dc_offset: scenario.dc_offset.unwrap_or(0.0),
                decimals: VOLTAGE_SAMPLE_DECIMALS,
            },
        };
        let current_channel = ChannelSpec {
            fundamental_peak: i_fundamental,
            spectrum: &scenario.current_harmonics,
            phase_shift: phase_shift + capture_phase,
            options: SynthesisOptions {
                noise_amplitude: scenario.noise * 0.001,
                ..SynthesisOptions::clean(CURRENT_SAMPLE_DECIMALS)
            },
        };

        let voltage = self.synthesizer.synthesize(&voltage_channel, samples, frequency, rng);
        let current = self.synthesizer.synthesize(&current_channel, samples, frequency, rng);
        let waveform = WaveformBuffer::new(voltage, current, self.synthesizer.sampling_frequency())?;

        let voltage_rms = compute_rms(waveform.voltage())?;
        let current_rms = compute_rms(waveform.current())?;

        let power = self.calculator.compute(&PowerInputs {
            voltage_rms,
            current_rms,
            voltage_fundamental_peak: v_fundamental,
            current_fundamental_peak: i_fundamental,
            phase_angle: phase_shift,
        });

        // THD always comes from the true spectrum, never the padded report
        let thd_voltage = assess_thd(&scenario.voltage_harmonics.amplitudes(v_fundamental), THD_V_MIN_FUNDAMENTAL);
        let thd_current = assess_thd(&scenario.current_harmonics.amplitudes(i_fundamental), THD_I_MIN_FUNDAMENTAL);

        let voltage_source = spectrum_source(&scenario.voltage_harmonics, s.voltage_noise_floor);
        let current_source = spectrum_source(&scenario.current_harmonics, s.current_noise_floor);

        Ok(finalize(RawMeasurement {
            voltage_rms,
            current_rms,
            power,
            frequency,
            frequency_valid: is_plausible_frequency(frequency),
            thd_voltage,
            thd_current,
            harmonics_voltage: voltage_source.reported_amplitudes(v_fundamental, VOLTAGE_SAMPLE_DECIMALS, rng),
            harmonics_current: current_source.reported_amplitudes(i_fundamental, CURRENT_SAMPLE_DECIMALS, rng),
            waveform,
        }))
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, width: f64) -> f64 {
    if width > 0.0 {
        (rng.gen::<f64>() - 0.5) * width
    } else {
        0.0
    }
}

fn spectrum_source(spectrum: &HarmonicSpectrum, floor: Option<NoiseFloorConfig>) -> SpectrumSource {
    match floor {
        Some(cfg) => SpectrumSource::Synthesized(spectrum.clone(), cfg),
        None => SpectrumSource::Measured(spectrum.clone()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub nominal_frequency: f64,
    /// Zero-crossing hysteresis on the voltage channel (V).
    pub zero_crossing_hysteresis: f64,
    pub noise_gate_current: Option<f64>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            nominal_frequency: NOMINAL_FREQUENCY,
            zero_crossing_hysteresis: 2.75,
            noise_gate_current: None,
        }
    }
}

/// Measure a captured buffer.
///
/// An implausible or missing frequency estimate falls back to the nominal
/// frequency for harmonic analysis and is flagged through `frequency_valid`.
pub fn analyze_capture(buffer: WaveformBuffer, settings: &CaptureSettings) -> Result<Measurement> {
    let (frequency, frequency_valid) = match estimate_frequency(
        buffer.voltage(),
        buffer.sample_rate(),
        settings.zero_crossing_hysteresis,
    ) {
        Some(f) if is_plausible_frequency(f) => (f, true),
        _ => (settings.nominal_frequency, false),
    };

    let harmonics = HarmonicAnalyzer::for_buffer(&buffer).analyze_buffer(&buffer, frequency)?;
    let voltage_rms = compute_rms(buffer.voltage())?;
    let current_rms = compute_rms(buffer.current())?;

    let calculator = match settings.noise_gate_current {
        Some(gate) => PowerQualityCalculator::new().with_noise_gate(gate),
        None => PowerQualityCalculator::new(),
    };
    let power = calculator.compute(&PowerInputs {
        voltage_rms,
        current_rms,
        voltage_fundamental_peak: harmonics.voltage.fundamental(),
        current_fundamental_peak: harmonics.current.fundamental(),
        phase_angle: harmonics.phase_angle(),
    });

    Ok(finalize(RawMeasurement {
        voltage_rms,
        current_rms,
        power,
        frequency,
        frequency_valid,
        thd_voltage: assess_thd(&harmonics.voltage.amplitudes, THD_V_MIN_FUNDAMENTAL),
        thd_current: assess_thd(&harmonics.current.amplitudes, THD_I_MIN_FUNDAMENTAL),
        harmonics_voltage: round_all(&harmonics.voltage.amplitudes, VOLTAGE_SAMPLE_DECIMALS),
        harmonics_current: round_all(&harmonics.current.amplitudes, CURRENT_SAMPLE_DECIMALS),
        waveform: buffer,
    }))
}

fn round_all(values: &[f64], decimals: i32) -> Vec<f64> {
    values.iter().map(|v| round_to(*v, decimals)).collect()
}

struct RawMeasurement {
    voltage_rms: f64,
    current_rms: f64,
    power: PowerQuality,
    frequency: f64,
    frequency_valid: bool,
    thd_voltage: Reading,
    thd_current: Reading,
    harmonics_voltage: Vec<f64>,
    harmonics_current: Vec<f64>,
    waveform: WaveformBuffer,
}

fn finalize(raw: RawMeasurement) -> Measurement {
    Measurement {
        timestamp: Utc::now(),
        voltage_rms: round_to(raw.voltage_rms, VOLTAGE_RMS_DECIMALS),
        current_rms: round_to(raw.current_rms, CURRENT_RMS_DECIMALS),
        power_active: round_to(raw.power.active, POWER_DECIMALS),
        power_apparent: round_to(raw.power.apparent, POWER_DECIMALS),
        power_reactive: round_to(raw.power.reactive.abs(), POWER_DECIMALS),
        power_distortion: round_to(raw.power.distortion, POWER_DECIMALS),
        power_factor: round_to(raw.power.power_factor, POWER_FACTOR_DECIMALS),
        frequency: round_to(raw.frequency, FREQUENCY_DECIMALS),
        frequency_valid: raw.frequency_valid,
        thd_voltage: round_to(raw.thd_voltage.or_sentinel(0.0), THD_DECIMALS),
        thd_current: round_to(raw.thd_current.or_sentinel(0.0), THD_DECIMALS),
        harmonics_voltage: raw.harmonics_voltage,
        harmonics_current: raw.harmonics_current,
        thd_voltage_reading: raw.thd_voltage,
        thd_current_reading: raw.thd_current,
        power_factor_reading: raw.power.power_factor_reading,
        waveform: raw.waveform,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenario::ScenarioCatalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet(key: &str) -> Scenario {
        let mut scenario = ScenarioCatalog::default().get(key).unwrap().clone();
        scenario.noise = 0.0;
        scenario
    }

    #[test]
    fn test_budeanu_identity_on_generated_measurement() {
        let settings = GeneratorSettings {
            capture_cycles: 10,
            ..GeneratorSettings::deterministic()
        };
        let generator = MeasurementGenerator::new(settings).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for key in ["clean", "distorted", "clipped", "asymmetric", "low_current"] {
            for _ in 0..20 {
                let m = generator.generate(&quiet(key), &mut rng).unwrap();
                let s = m.power_apparent;
                let sum = m.power_active.powi(2) + m.power_reactive.powi(2) + m.power_distortion.powi(2);
                // Each of S, P, Q, D is rounded to 0.1 VA
                let rounding = 2.0 * 0.05 * (s + m.power_active + m.power_reactive + m.power_distortion) + 0.01;
                let tolerance = (1e-3 * s * s).max(rounding);
                assert!((s * s - sum).abs() <= tolerance, "{}: S^2={} vs {}", key, s * s, sum);
            }
        }
    }

    #[test]
    fn test_rejects_unusable_settings() {
        let zero_frequency = GeneratorSettings {
            nominal_frequency: 0.0,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(zero_frequency).is_err());

        let nan_frequency = GeneratorSettings {
            nominal_frequency: f64::NAN,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(nan_frequency).is_err());

        let wide_jitter = GeneratorSettings {
            frequency_jitter: 100.0,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(wide_jitter).is_err());

        let negative_jitter = GeneratorSettings {
            frequency_jitter: -1.0,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(negative_jitter).is_err());

        let negative_voltage_jitter = GeneratorSettings {
            voltage_jitter: -4.0,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(negative_voltage_jitter).is_err());

        let no_cycles = GeneratorSettings {
            capture_cycles: 0,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(no_cycles).is_err());

        let endless = GeneratorSettings {
            capture_cycles: usize::MAX,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(endless).is_err());

        let crawling = GeneratorSettings {
            nominal_frequency: 1e-9,
            ..GeneratorSettings::deterministic()
        };
        assert!(MeasurementGenerator::new(crawling).is_err());

        assert!(MeasurementGenerator::new(GeneratorSettings::default()).is_ok());
    }

    #[test]
    fn test_capture_length_and_rounding() {
        let generator = MeasurementGenerator::new(GeneratorSettings::deterministic()).unwrap();
        let m = generator.generate(&quiet("clean"), &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(m.waveform.len(), 3 * 60 + 1);
        assert_eq!(m.frequency, 50.0);
        assert!(m.frequency_valid);
        assert_eq!(m.voltage_rms, round_to(m.voltage_rms, 1));
        assert_eq!(m.power_factor, round_to(m.power_factor, 2));
        assert!((m.power_factor - 0.95).abs() < 0.011);
        assert_eq!(m.harmonics_voltage.len(), 8);
    }

    #[test]
    fn test_noise_floor_only_pads_report() {
        let scenario = quiet("distorted");
        let expected_thd = round_to(0.013925f64.sqrt() * 100.0, 2);

        let plain = MeasurementGenerator::new(GeneratorSettings::deterministic()).unwrap();
        let padded = MeasurementGenerator::new(GeneratorSettings {
            voltage_noise_floor: Some(NoiseFloorConfig::voltage()),
            current_noise_floor: Some(NoiseFloorConfig::current()),
            ..GeneratorSettings::deterministic()
        })
        .unwrap();

        let a = plain.generate(&scenario, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = padded.generate(&scenario, &mut StdRng::seed_from_u64(9)).unwrap();

        assert_eq!(a.thd_voltage, expected_thd);
        assert_eq!(b.thd_voltage, expected_thd);
        assert_eq!(a.harmonics_voltage.len(), 8);
        assert_eq!(b.harmonics_voltage.len(), HARMONIC_ORDERS);
        assert_eq!(b.harmonics_current.len(), HARMONIC_ORDERS);
        assert_eq!(&a.harmonics_voltage[..], &b.harmonics_voltage[..8]);
    }

    #[test]
    fn test_low_current_thd_is_undefined() {
        let generator = MeasurementGenerator::new(GeneratorSettings::deterministic()).unwrap();
        let m = generator.generate(&quiet("low_current"), &mut StdRng::seed_from_u64(5)).unwrap();

        assert!(m.current_rms > 0.015 && m.current_rms < 0.06);
        assert_eq!(m.thd_current, 0.0);
        assert_eq!(m.thd_current_reading, Reading::Undefined);
        assert!(m.thd_voltage_reading.is_ok());
    }

    #[test]
    fn test_clipping_limits_samples() {
        let generator = MeasurementGenerator::new(GeneratorSettings::default()).unwrap();
        let m = generator.generate(&quiet("clipped"), &mut StdRng::seed_from_u64(11)).unwrap();
        assert!(m.waveform.voltage().iter().all(|v| v.abs() <= 340.0));
    }

    #[test]
    fn test_analyze_capture_matches_generator() {
        let settings = GeneratorSettings {
            capture_cycles: 10,
            random_capture_phase: true,
            ..GeneratorSettings::deterministic()
        };
        let generator = MeasurementGenerator::new(settings).unwrap();
        let generated = generator.generate(&quiet("distorted"), &mut StdRng::seed_from_u64(3)).unwrap();

        let captured = analyze_capture(generated.waveform.clone(), &CaptureSettings::default()).unwrap();

        assert_eq!(captured.voltage_rms, generated.voltage_rms);
        assert_eq!(captured.current_rms, generated.current_rms);
        assert!(captured.frequency_valid);
        assert!((captured.frequency - 50.0).abs() <= 0.2);
        assert!((captured.thd_voltage - generated.thd_voltage).abs() < 0.2);
        assert!((captured.power_factor - 0.75).abs() < 0.02);
        assert_eq!(captured.harmonics_voltage.len(), HARMONIC_ORDERS);
    }

    #[test]
    fn test_analyze_capture_without_crossings() {
        let buffer = WaveformBuffer::new(vec![5.0; 120], vec![0.1; 120], 3000.0).unwrap();
        let m = analyze_capture(buffer, &CaptureSettings::default()).unwrap();
        assert!(!m.frequency_valid);
        assert_eq!(m.frequency, NOMINAL_FREQUENCY);
        assert_eq!(m.thd_voltage_reading, Reading::Undefined);
    }
}
