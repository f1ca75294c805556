// Sanity checks on a finished measurement

use crate::core::constants::*;
use crate::core::format::Measurement;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Errors mark physically implausible readings, warnings mark readings
/// outside the supply standard or internally inconsistent power figures.
pub fn validate_measurement(m: &Measurement) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if m.voltage_rms > VOLTAGE_SAFETY_LIMIT {
        errors.push(format!(
            "Voltage {:.1} V exceeds safety limit {:.0} V",
            m.voltage_rms, VOLTAGE_SAFETY_LIMIT
        ));
    }
    if m.current_rms > CURRENT_SAFETY_LIMIT {
        errors.push(format!(
            "Current {:.3} A exceeds safety limit {:.0} A",
            m.current_rms, CURRENT_SAFETY_LIMIT
        ));
    }
    if !(FREQUENCY_VALID_MIN..=FREQUENCY_VALID_MAX).contains(&m.frequency) {
        errors.push(format!("Frequency {:.1} Hz outside measurable range", m.frequency));
    }

    let voltage_deviation = (m.voltage_rms - NOMINAL_VOLTAGE) / NOMINAL_VOLTAGE * 100.0;
    if voltage_deviation.abs() > VOLTAGE_DEVIATION_LIMIT_PERCENT {
        warnings.push(format!("Voltage deviation {:.1}% from nominal", voltage_deviation));
    }
    if (m.frequency - NOMINAL_FREQUENCY).abs() > FREQUENCY_DEVIATION_LIMIT_HZ {
        warnings.push(format!("Frequency {:.1} Hz outside 49.5-50.5 Hz", m.frequency));
    }
    if m.power_factor < MIN_POWER_FACTOR {
        warnings.push(format!("Low power factor {:.2}", m.power_factor));
    }
    if m.thd_voltage > VOLTAGE_THD_LIMIT {
        warnings.push(format!("Voltage THD {:.2}% above limit", m.thd_voltage));
    }

    let budeanu = (m.power_active.powi(2) + m.power_reactive.powi(2) + m.power_distortion.powi(2)).sqrt();
    if relative_gap(m.power_apparent, budeanu) > POWER_CONSISTENCY_TOLERANCE {
        warnings.push(format!(
            "Apparent power {:.1} VA inconsistent with P, Q, D ({:.1} VA)",
            m.power_apparent, budeanu
        ));
    }
    let product = m.voltage_rms * m.current_rms;
    if relative_gap(m.power_apparent, product) > POWER_CONSISTENCY_TOLERANCE {
        warnings.push(format!(
            "Apparent power {:.1} VA inconsistent with Vrms x Irms ({:.1} VA)",
            m.power_apparent, product
        ));
    }

    ValidationResult {
        valid: errors.is_empty(),
        warnings,
        errors,
    }
}

// Relative difference against the reported value; a tiny reported value
// (deadband) is compared absolutely.
fn relative_gap(reported: f64, reference: f64) -> f64 {
    let diff = (reported - reference).abs();
    if reported.abs() > APPARENT_POWER_DEADBAND {
        diff / reported.abs()
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::{Reading, WaveformBuffer};
    use chrono::Utc;

    fn measurement(v: f64, i: f64, pf: f64) -> Measurement {
        let s = v * i;
        let p = s * pf;
        let q = (s * s - p * p).sqrt();
        Measurement {
            timestamp: Utc::now(),
            voltage_rms: v,
            current_rms: i,
            power_active: p,
            power_apparent: s,
            power_reactive: q,
            power_distortion: 0.0,
            power_factor: pf,
            frequency: 50.0,
            frequency_valid: true,
            thd_voltage: 2.0,
            thd_current: 5.0,
            harmonics_voltage: vec![325.0],
            harmonics_current: vec![1.0],
            thd_voltage_reading: Reading::Ok(2.0),
            thd_current_reading: Reading::Ok(5.0),
            power_factor_reading: Reading::Ok(pf),
            waveform: WaveformBuffer::new(vec![0.0], vec![0.0], 3000.0).unwrap(),
        }
    }

    #[test]
    fn test_nominal_measurement_is_clean() {
        let result = validate_measurement(&measurement(230.0, 5.0, 0.95));
        assert!(result.valid);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_safety_limits_are_errors() {
        let mut m = measurement(380.0, 45.0, 0.95);
        m.frequency = 60.0;
        let result = validate_measurement(&m);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_standard_limits_are_warnings() {
        let mut m = measurement(260.0, 5.0, 0.7);
        m.frequency = 50.8;
        m.thd_voltage = 9.5;
        let result = validate_measurement(&m);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 4, "{:?}", result.warnings);
    }

    #[test]
    fn test_inconsistent_apparent_power() {
        let mut m = measurement(230.0, 5.0, 0.95);
        m.power_apparent *= 1.2;
        let result = validate_measurement(&m);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 2);
    }
}
