// PN-EN 50160 style compliance classification

use crate::core::constants::*;
use crate::core::format::{Measurement, Reading};
use serde::{Deserialize, Serialize};

/// One regulated quantity: deviation from `nominal` must fall in
/// `[lower_bound, upper_bound]` (upper bound exclusive when `upper_exclusive`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceBand {
    pub nominal: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default)]
    pub upper_exclusive: bool,
}

impl ComplianceBand {
    pub fn contains(&self, deviation: f64) -> bool {
        let upper_ok = if self.upper_exclusive {
            deviation < self.upper_bound
        } else {
            deviation <= self.upper_bound
        };
        deviation >= self.lower_bound && upper_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceLimits {
    /// Deviation in percent of nominal.
    pub voltage: ComplianceBand,
    /// Deviation in Hz.
    pub frequency: ComplianceBand,
    /// Absolute THD in percent.
    pub voltage_thd: ComplianceBand,
}

impl Default for ComplianceLimits {
    fn default() -> Self {
        Self {
            voltage: ComplianceBand {
                nominal: NOMINAL_VOLTAGE,
                lower_bound: -VOLTAGE_DEVIATION_LIMIT_PERCENT,
                upper_bound: VOLTAGE_DEVIATION_LIMIT_PERCENT,
                upper_exclusive: false,
            },
            frequency: ComplianceBand {
                nominal: NOMINAL_FREQUENCY,
                lower_bound: -FREQUENCY_DEVIATION_LIMIT_HZ,
                upper_bound: FREQUENCY_DEVIATION_LIMIT_HZ,
                upper_exclusive: false,
            },
            voltage_thd: ComplianceBand {
                nominal: 0.0,
                lower_bound: 0.0,
                upper_bound: VOLTAGE_THD_LIMIT,
                upper_exclusive: true,
            },
        }
    }
}

/// Scalars to classify. `None` means not measured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComplianceInput {
    pub voltage_rms: Option<f64>,
    pub frequency: Option<f64>,
    pub thd_voltage: Option<f64>,
}

impl ComplianceInput {
    /// THD sentinels are not evidence of compliance, so a non-`Ok` reading
    /// leaves the THD unknown.
    pub fn from_measurement(m: &Measurement) -> Self {
        Self {
            voltage_rms: Some(m.voltage_rms),
            frequency: Some(m.frequency),
            thd_voltage: match m.thd_voltage_reading {
                Reading::Ok(v) => Some(v),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorStatus {
    pub deviation: Option<f64>,
    pub within_limits: Option<bool>,
}

impl IndicatorStatus {
    fn unknown() -> Self {
        Self {
            deviation: None,
            within_limits: None,
        }
    }

    fn classify(deviation: f64, band: &ComplianceBand) -> Self {
        Self {
            deviation: Some(deviation),
            within_limits: Some(band.contains(deviation)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub voltage: IndicatorStatus,
    pub frequency: IndicatorStatus,
    pub thd: IndicatorStatus,
    pub overall_compliant: Option<bool>,
    pub status_message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComplianceEvaluator {
    limits: ComplianceLimits,
}

impl ComplianceEvaluator {
    pub fn new(limits: ComplianceLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ComplianceLimits {
        &self.limits
    }

    pub fn evaluate(&self, input: &ComplianceInput) -> ComplianceReport {
        let limits = &self.limits;

        let voltage = match input.voltage_rms {
            Some(v) => {
                let deviation = (v - limits.voltage.nominal) / limits.voltage.nominal * 100.0;
                IndicatorStatus::classify(deviation, &limits.voltage)
            }
            None => IndicatorStatus::unknown(),
        };
        let frequency = match input.frequency {
            Some(f) => IndicatorStatus::classify(f - limits.frequency.nominal, &limits.frequency),
            None => IndicatorStatus::unknown(),
        };
        let thd = match input.thd_voltage {
            Some(t) => IndicatorStatus::classify(t - limits.voltage_thd.nominal, &limits.voltage_thd),
            None => IndicatorStatus::unknown(),
        };

        let overall_compliant = [voltage, frequency, thd]
            .iter()
            .map(|s| s.within_limits)
            .collect::<Option<Vec<bool>>>()
            .map(|flags| flags.iter().all(|ok| *ok));

        let status_message = status_message(&voltage, &frequency, &thd, input);

        ComplianceReport {
            voltage,
            frequency,
            thd,
            overall_compliant,
            status_message,
        }
    }

    pub fn evaluate_measurement(&self, measurement: &Measurement) -> ComplianceReport {
        self.evaluate(&ComplianceInput::from_measurement(measurement))
    }
}

fn status_message(
    voltage: &IndicatorStatus,
    frequency: &IndicatorStatus,
    thd: &IndicatorStatus,
    input: &ComplianceInput,
) -> String {
    let mut issues = Vec::new();

    if let (Some(false), Some(dev)) = (voltage.within_limits, voltage.deviation) {
        issues.push(format!("Voltage deviation {:.1}%", dev));
    }
    if frequency.within_limits == Some(false) {
        issues.push("Frequency out of range".to_string());
    }
    if let (Some(false), Some(value)) = (thd.within_limits, input.thd_voltage) {
        issues.push(format!("THD {:.1}%", value));
    }

    let partial = [voltage, frequency, thd].iter().any(|s| s.within_limits.is_none());

    if issues.is_empty() {
        if partial {
            "No violations detected (partial measurement)".to_string()
        } else {
            "All indicators within PN-EN 50160 limits".to_string()
        }
    } else if partial {
        format!("Non-compliant: {} (partial measurement)", issues.join(", "))
    } else {
        format!("Non-compliant: {}", issues.join(", "))
    }
}
