pub mod compliance;
pub mod constants;
pub mod driver;
pub mod error;
pub mod format;
pub mod measurement;
pub mod period;
pub mod power;
pub mod scenario;
pub mod spectrum;
pub mod stats;
pub mod synth;
pub mod validator;
