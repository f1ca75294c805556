// Power-quality signal core
// Main library entry point

pub mod core;

// Re-export main types
pub use core::error::{PqError, Result};
pub use core::format::{HarmonicSpectrum, Measurement, PeriodWindow, Reading, WaveformBuffer};
pub use core::compliance::{ComplianceEvaluator, ComplianceInput, ComplianceReport};
pub use core::measurement::{analyze_capture, CaptureSettings, GeneratorSettings, MeasurementGenerator};
pub use core::period::{DisplayWindow, Extraction, PeriodExtractor};
pub use core::power::{PowerQuality, PowerQualityCalculator};
pub use core::scenario::{Scenario, ScenarioCatalog};
pub use core::validator::{validate_measurement, ValidationResult};
pub use core::driver::{run_node, DriverSettings, MeasurementPayload, NodeConfig, NodeSimulator};

#[cfg(test)]
mod tests {
    #[test]
    fn test_constants() {
        use crate::core::constants::*;
        assert_eq!(SAMPLING_FREQUENCY_HZ, 3000.0);
        assert_eq!(HARMONIC_ORDERS, 25);
        assert!(FREQUENCY_VALID_MIN < NOMINAL_FREQUENCY && NOMINAL_FREQUENCY < FREQUENCY_VALID_MAX);
    }
}
