// Device and regulatory constants for the power-quality core

// Fixed ADC sampling rate of the measurement node, independent of mains frequency
pub const SAMPLING_FREQUENCY_HZ: f64 = 3000.0;

// Harmonic orders reported per channel (H1..H25)
pub const HARMONIC_ORDERS: usize = 25;

// ADC quantization emulation
pub const VOLTAGE_SAMPLE_DECIMALS: i32 = 2;
pub const CURRENT_SAMPLE_DECIMALS: i32 = 3;

// Output rounding of the measurement record
pub const VOLTAGE_RMS_DECIMALS: i32 = 1;
pub const CURRENT_RMS_DECIMALS: i32 = 3;
pub const POWER_DECIMALS: i32 = 1;
pub const POWER_FACTOR_DECIMALS: i32 = 2;
pub const THD_DECIMALS: i32 = 2;
pub const FREQUENCY_DECIMALS: i32 = 1;

// THD is only trusted above these fundamental amplitudes (peak)
pub const THD_V_MIN_FUNDAMENTAL: f64 = 10.0;
pub const THD_I_MIN_FUNDAMENTAL: f64 = 0.15;

// THD above this ratio is treated as a measurement error
pub const THD_ERROR_CEILING_PERCENT: f64 = 100.0;

// Below this apparent power (VA) the power factor is not computed
pub const APPARENT_POWER_DEADBAND: f64 = 0.05;

// Nominal supply (PN-EN 50160 / IEC 61000)
pub const NOMINAL_VOLTAGE: f64 = 230.0;
pub const NOMINAL_FREQUENCY: f64 = 50.0;
pub const VOLTAGE_DEVIATION_LIMIT_PERCENT: f64 = 10.0;
pub const FREQUENCY_DEVIATION_LIMIT_HZ: f64 = 0.5;
pub const VOLTAGE_THD_LIMIT: f64 = 8.0;
pub const MIN_POWER_FACTOR: f64 = 0.85;

// Plausible mains frequency window for zero-crossing estimates
pub const FREQUENCY_VALID_MIN: f64 = 45.0;
pub const FREQUENCY_VALID_MAX: f64 = 55.0;

// Safety limits (hard errors in validation)
pub const VOLTAGE_SAFETY_LIMIT: f64 = 360.0;
pub const CURRENT_SAFETY_LIMIT: f64 = 40.0;

// Relative tolerance for apparent power consistency checks
pub const POWER_CONSISTENCY_TOLERANCE: f64 = 0.05;

// Upper bounds on a synthesized capture
pub const MAX_CAPTURE_CYCLES: usize = 500;
pub const MAX_SAMPLES_PER_CYCLE: f64 = 100_000.0;
