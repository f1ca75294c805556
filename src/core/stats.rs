// RMS and THD over sampled and harmonic data

use crate::core::constants::THD_ERROR_CEILING_PERCENT;
use crate::core::error::{PqError, Result};
use crate::core::format::Reading;

/// Root-mean-square of a sample sequence.
pub fn compute_rms(samples: &[f64]) -> Result<f64> {
    if samples.is_empty() {
        return Err(PqError::invalid("cannot compute RMS of an empty sequence"));
    }
    let sum_squares: f64 = samples.iter().map(|s| s * s).sum();
    Ok((sum_squares / samples.len() as f64).sqrt())
}

/// THD in percent as a tagged reading.
///
/// `Undefined` when the fundamental is below `min_fundamental` (or absent),
/// `Unreliable` when the ratio exceeds 100 %.
pub fn assess_thd(amplitudes: &[f64], min_fundamental: f64) -> Reading {
    let fundamental = match amplitudes.first() {
        Some(f) => *f,
        None => return Reading::Undefined,
    };

    if fundamental < min_fundamental || fundamental <= 0.0 {
        return Reading::Undefined;
    }

    let sum_harmonic_squares: f64 = amplitudes[1..].iter().map(|a| a * a).sum();
    let thd = sum_harmonic_squares.sqrt() / fundamental * 100.0;

    if thd > THD_ERROR_CEILING_PERCENT {
        Reading::Unreliable
    } else {
        Reading::Ok(thd)
    }
}

/// THD in percent with the wire sentinel: 0 whenever the reading is not usable.
pub fn compute_thd(amplitudes: &[f64], min_fundamental: f64) -> f64 {
    assess_thd(amplitudes, min_fundamental).or_sentinel(0.0)
}
