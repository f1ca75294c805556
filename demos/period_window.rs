// Example: generate one capture per scenario and lock a display window on it

use pq_core::core::measurement::CaptureSettings;
use pq_core::{
    analyze_capture, ComplianceEvaluator, DisplayWindow, GeneratorSettings, MeasurementGenerator,
    PeriodExtractor, Result, ScenarioCatalog,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, Level};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let generator = MeasurementGenerator::new(GeneratorSettings {
        random_capture_phase: true,
        ..GeneratorSettings::default()
    })?;
    let catalog = ScenarioCatalog::default();
    let extractor = PeriodExtractor::new();
    let evaluator = ComplianceEvaluator::default();
    let mut rng = StdRng::seed_from_u64(2024);

    for key in catalog.keys() {
        let scenario = catalog.get(key)?;
        let m = generator.generate(scenario, &mut rng)?;

        info!("{} ({} samples)", scenario.name, m.waveform.len());
        info!(
            "  V={} V  I={} A  S={} VA  P={} W  Q={} var  D={} VA  PF={}",
            m.voltage_rms,
            m.current_rms,
            m.power_apparent,
            m.power_active,
            m.power_reactive,
            m.power_distortion,
            m.power_factor
        );
        info!("  THD V={}% ({:?})  I={}% ({:?})", m.thd_voltage, m.thd_voltage_reading, m.thd_current, m.thd_current_reading);

        match extractor.extract_for_display(&m.waveform, 50.0, 2)? {
            DisplayWindow::Locked(w) => info!(
                "  window: {} period(s) from sample {}, {} samples/period, fs~{} Hz",
                w.periods, w.start_index, w.samples_per_period, w.inferred_sampling_rate
            ),
            DisplayWindow::Raw(b) => info!("  window: raw buffer of {} samples", b.len()),
        }

        // Re-measure the synthetic buffer as if it had come from the ADC
        let captured = analyze_capture(m.waveform.clone(), &CaptureSettings::default())?;
        debug!(
            "  capture path: f={} Hz (valid={}) THD V={}% PF={}",
            captured.frequency, captured.frequency_valid, captured.thd_voltage, captured.power_factor
        );

        info!("  {}", evaluator.evaluate_measurement(&m).status_message);
    }

    Ok(())
}
