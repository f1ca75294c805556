//! Zero-crossing period locking for waveform display.
//!
//! A capture starts at an arbitrary phase. To draw a stable oscilloscope
//! view the voltage channel is searched for rising zero crossings and both
//! channels are cut to exactly `K` periods starting at the first crossing.
//! Voltage and current are always sliced with the same index window, so the
//! phase between them is the one that was captured.

use crate::core::constants::{FREQUENCY_VALID_MAX, FREQUENCY_VALID_MIN};
use crate::core::error::{PqError, Result};
use crate::core::format::{PeriodWindow, WaveformBuffer};
use serde::Serialize;
use std::fmt;

/// Why a window could not be cut from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    TooFewCrossings { found: usize },
    DegeneratePeriod { samples_per_period: usize },
    InsufficientTrailingData { needed: usize, available: usize },
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::TooFewCrossings { found } => {
                write!(f, "need 2 rising zero crossings, found {}", found)
            }
            Unavailable::DegeneratePeriod { samples_per_period } => {
                write!(f, "degenerate period of {} samples", samples_per_period)
            }
            Unavailable::InsufficientTrailingData { needed, available } => {
                write!(f, "window needs {} samples, buffer has {}", needed, available)
            }
        }
    }
}

/// Outcome of a period extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Window(PeriodWindow),
    Unavailable(Unavailable),
}

impl Extraction {
    pub fn is_available(&self) -> bool {
        matches!(self, Extraction::Window(_))
    }

    pub fn window(&self) -> Option<&PeriodWindow> {
        match self {
            Extraction::Window(w) => Some(w),
            Extraction::Unavailable(_) => None,
        }
    }

    pub fn into_window(self) -> Option<PeriodWindow> {
        match self {
            Extraction::Window(w) => Some(w),
            Extraction::Unavailable(_) => None,
        }
    }
}

/// What a renderer should draw after applying the fallback policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayWindow {
    Locked(PeriodWindow),
    Raw(WaveformBuffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodExtractor {
    min_crossing_distance: usize,
}

impl PeriodExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore crossings closer than `distance` samples to the previous
    /// accepted one. Zero keeps every crossing.
    pub fn with_min_crossing_distance(mut self, distance: usize) -> Self {
        self.min_crossing_distance = distance;
        self
    }

    /// Indices `i` where `samples[i-1] <= 0 && samples[i] > 0`.
    pub fn rising_crossings(&self, samples: &[f64]) -> Vec<usize> {
        let mut crossings: Vec<usize> = Vec::new();
        for i in 1..samples.len() {
            if samples[i - 1] <= 0.0 && samples[i] > 0.0 {
                if let Some(&last) = crossings.last() {
                    if i - last < self.min_crossing_distance {
                        continue;
                    }
                }
                crossings.push(i);
            }
        }
        crossings
    }

    /// Cut exactly `num_periods` periods (+1 closing sample) from `buffer`.
    pub fn extract(
        &self,
        buffer: &WaveformBuffer,
        nominal_frequency: f64,
        num_periods: usize,
    ) -> Result<Extraction> {
        if num_periods == 0 {
            return Err(PqError::invalid("period count must be at least 1"));
        }
        if !(nominal_frequency.is_finite() && nominal_frequency > 0.0) {
            return Err(PqError::invalid(format!(
                "nominal frequency must be positive, got {}",
                nominal_frequency
            )));
        }

        let crossings = self.rising_crossings(buffer.voltage());
        if crossings.len() < 2 {
            return Ok(Extraction::Unavailable(Unavailable::TooFewCrossings {
                found: crossings.len(),
            }));
        }

        let samples_per_period = crossings[1] - crossings[0];
        if samples_per_period < 2 {
            return Ok(Extraction::Unavailable(Unavailable::DegeneratePeriod {
                samples_per_period,
            }));
        }

        let start = crossings[0];
        let end = num_periods
            .checked_mul(samples_per_period)
            .and_then(|n| n.checked_add(start + 1));
        let end = match end {
            Some(end) if end <= buffer.len() => end,
            _ => {
                return Ok(Extraction::Unavailable(Unavailable::InsufficientTrailingData {
                    needed: end.unwrap_or(usize::MAX),
                    available: buffer.len(),
                }));
            }
        };

        let range = start..end;
        Ok(Extraction::Window(PeriodWindow {
            voltage: buffer.voltage()[range.clone()].to_vec(),
            current: buffer.current()[range].to_vec(),
            start_index: start,
            samples_per_period,
            periods: num_periods,
            inferred_sampling_rate: samples_per_period as f64 * nominal_frequency,
        }))
    }

    /// Largest whole number of periods that fits, if any.
    pub fn extract_max(&self, buffer: &WaveformBuffer, nominal_frequency: f64) -> Result<Extraction> {
        let probe = self.extract(buffer, nominal_frequency, 1)?;
        let window = match probe {
            Extraction::Window(w) => w,
            unavailable => return Ok(unavailable),
        };

        let fitting = (buffer.len() - window.start_index - 1) / window.samples_per_period;
        if fitting <= 1 {
            return Ok(Extraction::Window(window));
        }
        self.extract(buffer, nominal_frequency, fitting)
    }

    /// Try `preferred` periods, then fewer down to one, then the raw buffer.
    pub fn extract_for_display(
        &self,
        buffer: &WaveformBuffer,
        nominal_frequency: f64,
        preferred: usize,
    ) -> Result<DisplayWindow> {
        let single = match self.extract(buffer, nominal_frequency, 1)? {
            Extraction::Window(w) => w,
            Extraction::Unavailable(_) => return Ok(DisplayWindow::Raw(buffer.clone())),
        };

        let fitting = (buffer.len() - single.start_index - 1) / single.samples_per_period;
        let periods = preferred.clamp(1, fitting.max(1));
        if periods == 1 {
            return Ok(DisplayWindow::Locked(single));
        }
        match self.extract(buffer, nominal_frequency, periods)? {
            Extraction::Window(w) => Ok(DisplayWindow::Locked(w)),
            Extraction::Unavailable(_) => Ok(DisplayWindow::Locked(single)),
        }
    }
}

/// Mains frequency from the mean spacing of rising crossings.
///
/// The mean is removed first. A crossing is armed once the signal drops
/// below `-hysteresis` and fires on the first sample above `hysteresis`.
/// Returns `None` with fewer than two crossings.
pub fn estimate_frequency(samples: &[f64], sample_rate: f64, hysteresis: f64) -> Option<f64> {
    if samples.len() < 2 || sample_rate <= 0.0 {
        return None;
    }
    let offset = samples.iter().sum::<f64>() / samples.len() as f64;
    let h = hysteresis.abs();

    let mut crossings: Vec<usize> = Vec::new();
    let mut armed = false;
    for (i, sample) in samples.iter().enumerate() {
        let v = sample - offset;
        if v < -h {
            armed = true;
        } else if armed && v > h {
            crossings.push(i);
            armed = false;
        }
    }

    if crossings.len() < 2 {
        return None;
    }

    let span = (crossings[crossings.len() - 1] - crossings[0]) as f64;
    let avg_samples = span / (crossings.len() - 1) as f64;
    Some(sample_rate / avg_samples)
}

/// Whether a frequency estimate lies in the plausible mains window.
pub fn is_plausible_frequency(frequency: f64) -> bool {
    (FREQUENCY_VALID_MIN..=FREQUENCY_VALID_MAX).contains(&frequency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SPP: f64 = 60.0;

    fn sine_buffer(len: usize, phase: f64, current_offset: f64) -> WaveformBuffer {
        let voltage = (0..len).map(|i| 325.0 * (2.0 * PI * i as f64 / SPP + phase).sin()).collect();
        let current = (0..len)
            .map(|i| 10.0 * (2.0 * PI * i as f64 / SPP + phase + current_offset).sin())
            .collect();
        WaveformBuffer::new(voltage, current, 3000.0).unwrap()
    }

    #[test]
    fn test_extracts_two_periods_from_three_cycles() {
        let extractor = PeriodExtractor::new();
        for phase in [0.0, 0.3, 1.7, 2.9, 4.4, 5.8] {
            let buffer = sine_buffer(180, phase, 0.0);
            let window = extractor
                .extract(&buffer, 50.0, 2)
                .unwrap()
                .into_window()
                .expect("window should fit");

            assert_eq!(window.len(), 2 * 60 + 1);
            assert_eq!(window.samples_per_period, 60);
            assert!(window.voltage[0].abs() < 325.0 * (2.0 * PI / SPP).sin() + 1e-9);
            assert!(window.voltage[1] > 0.0);
            assert_eq!(window.inferred_sampling_rate, 3000.0);
        }
    }

    #[test]
    fn test_falls_back_to_single_period() {
        // Crossing near index 5, second near 65, buffer ends at 90
        let buffer = sine_buffer(90, -0.5, 0.0);
        let extractor = PeriodExtractor::new();

        let two = extractor.extract(&buffer, 50.0, 2).unwrap();
        assert_eq!(
            two,
            Extraction::Unavailable(Unavailable::InsufficientTrailingData {
                needed: 5 + 121,
                available: 90
            })
        );

        let one = extractor.extract(&buffer, 50.0, 1).unwrap();
        let window = one.window().expect("one period fits");
        assert_eq!(window.start_index, 5);
        assert_eq!(window.len(), 61);
    }

    #[test]
    fn test_too_few_crossings() {
        let buffer = sine_buffer(70, 0.5, 0.0);
        let result = PeriodExtractor::new().extract(&buffer, 50.0, 1).unwrap();
        assert!(matches!(
            result,
            Extraction::Unavailable(Unavailable::TooFewCrossings { found: 1 })
        ));
    }

    #[test]
    fn test_current_keeps_phase_relative_to_voltage() {
        let phase = 2.0;
        let offset = PI / 3.0;
        let buffer = sine_buffer(180, phase, offset);
        let window = PeriodExtractor::new()
            .extract(&buffer, 50.0, 2)
            .unwrap()
            .into_window()
            .unwrap();

        let t = window.start_index as f64;
        let expected = 10.0 * (2.0 * PI * t / SPP + phase + offset).sin();
        assert!(window.current[0].abs() > 1.0);
        assert!((window.current[0] - expected).abs() < 1e-9);
        assert_eq!(
            &window.current[..],
            &buffer.current()[window.start_index..window.start_index + 121]
        );
    }

    #[test]
    fn test_invalid_period_count() {
        let buffer = sine_buffer(120, 0.0, 0.0);
        assert!(PeriodExtractor::new().extract(&buffer, 50.0, 0).is_err());
        assert!(PeriodExtractor::new().extract(&buffer, 0.0, 1).is_err());
    }

    #[test]
    fn test_debounce_skips_spurious_crossing() {
        let mut voltage: Vec<f64> = (0..180).map(|i| (2.0 * PI * i as f64 / SPP - 0.5).sin()).collect();
        // Noise dip right after the first crossing at index 5
        voltage[7] = -0.01;
        let buffer = WaveformBuffer::new(voltage, vec![0.0; 180], 3000.0).unwrap();

        let naive = PeriodExtractor::new().extract(&buffer, 50.0, 1).unwrap();
        assert_eq!(naive.window().unwrap().samples_per_period, 3);

        let debounced = PeriodExtractor::new()
            .with_min_crossing_distance(10)
            .extract(&buffer, 50.0, 1)
            .unwrap();
        assert_eq!(debounced.window().unwrap().samples_per_period, 60);
    }

    #[test]
    fn test_display_fallback_chain() {
        let extractor = PeriodExtractor::new();

        let roomy = sine_buffer(200, 1.0, 0.0);
        match extractor.extract_for_display(&roomy, 50.0, 2).unwrap() {
            DisplayWindow::Locked(w) => assert_eq!(w.periods, 2),
            other => panic!("expected locked window, got {:?}", other),
        }

        let short = sine_buffer(90, -0.5, 0.0);
        match extractor.extract_for_display(&short, 50.0, 2).unwrap() {
            DisplayWindow::Locked(w) => assert_eq!(w.periods, 1),
            other => panic!("expected locked window, got {:?}", other),
        }

        let tiny = sine_buffer(30, 0.5, 0.0);
        assert_eq!(
            extractor.extract_for_display(&tiny, 50.0, 2).unwrap(),
            DisplayWindow::Raw(tiny.clone())
        );
    }

    #[test]
    fn test_huge_period_count_is_unavailable() {
        let extractor = PeriodExtractor::new();
        let buffer = sine_buffer(181, 0.3, 0.0);
        let huge = usize::MAX / 2;

        match extractor.extract(&buffer, 50.0, huge).unwrap() {
            Extraction::Unavailable(Unavailable::InsufficientTrailingData { needed, available }) => {
                assert_eq!(needed, usize::MAX);
                assert_eq!(available, 181);
            }
            other => panic!("expected unavailable, got {:?}", other),
        }

        match extractor.extract_for_display(&buffer, 50.0, huge).unwrap() {
            DisplayWindow::Locked(w) => assert_eq!(w.periods, 2),
            other => panic!("expected locked window, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_max_uses_all_whole_periods() {
        let buffer = sine_buffer(400, 0.3, 0.0);
        let window = PeriodExtractor::new()
            .extract_max(&buffer, 50.0)
            .unwrap()
            .into_window()
            .unwrap();
        assert_eq!(window.periods, (400 - window.start_index - 1) / 60);
        assert_eq!(window.periods, 5);
    }

    #[test]
    fn test_estimate_frequency() {
        let fs = 3000.0;
        let samples: Vec<f64> = (0..512)
            .map(|i| 325.0 * (2.0 * PI * 50.2 * i as f64 / fs + 0.4).sin() + 3.0)
            .collect();
        let f = estimate_frequency(&samples, fs, 2.75).unwrap();
        assert!((f - 50.2).abs() < 0.5);
        assert!(is_plausible_frequency(f));

        assert_eq!(estimate_frequency(&[1.0; 100], fs, 0.1), None);
        assert!(!is_plausible_frequency(60.0));
    }
}
