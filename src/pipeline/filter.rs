use anyhow::Result;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::device::SampleRecord;

/// One filtered sample, one-to-one and order-preserving with its source
/// [`SampleRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessedSample {
    pub timestamp: f64,
    pub filtered_value: f64,
}

/// Filter stage configuration.
///
/// The source hardware path runs in passthrough today, but the low-pass is a
/// first-class option, not dead code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode")]
pub enum FilterSettings {
    Passthrough,
    #[serde(rename = "lowpass")]
    LowPass {
        cutoff_hz: f64,
        sample_rate_hz: f64,
        order: usize,
    },
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::Passthrough
    }
}

/// Causal Butterworth low-pass as a cascade of biquad sections (plus one
/// single-pole section for odd orders). State persists across samples and
/// starts from zero; one output per input, no lookahead.
struct ButterworthLowPass {
    sections: Vec<DirectForm2Transposed<f64>>,
}

impl ButterworthLowPass {
    fn new(cutoff_hz: f64, sample_rate_hz: f64, order: usize) -> Result<Self> {
        if order == 0 {
            anyhow::bail!("Filter order must be at least 1");
        }
        if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate_hz / 2.0) {
            anyhow::bail!(
                "Cutoff {} Hz must lie below the Nyquist rate of {} Hz",
                cutoff_hz,
                sample_rate_hz / 2.0
            );
        }

        let mut sections = Vec::with_capacity(order / 2 + 1);
        let n = order as f64;

        for k in 0..order / 2 {
            // Damping of the k-th Butterworth pole pair.
            let zeta = (std::f64::consts::PI * (2.0 * k as f64 + 1.0) / (2.0 * n)).sin();
            let coeffs = Coefficients::<f64>::from_params(
                Type::LowPass,
                sample_rate_hz.hz(),
                cutoff_hz.hz(),
                1.0 / (2.0 * zeta),
            )
            .map_err(|e| anyhow::anyhow!("Failed to derive low-pass coefficients: {:?}", e))?;
            sections.push(DirectForm2Transposed::<f64>::new(coeffs));
        }

        if order % 2 == 1 {
            let coeffs = Coefficients::<f64>::from_params(
                Type::SinglePoleLowPass,
                sample_rate_hz.hz(),
                cutoff_hz.hz(),
                biquad::Q_BUTTERWORTH_F64,
            )
            .map_err(|e| anyhow::anyhow!("Failed to derive single-pole coefficients: {:?}", e))?;
            sections.push(DirectForm2Transposed::<f64>::new(coeffs));
        }

        Ok(Self { sections })
    }

    fn process(&mut self, x: f64) -> f64 {
        self.sections.iter_mut().fold(x, |acc, s| s.run(acc))
    }
}

enum Kernel {
    Passthrough,
    LowPass(ButterworthLowPass),
}

/// Optional causal transform between acquisition and analysis.
pub struct FilterStage {
    kernel: Kernel,
}

impl FilterStage {
    pub fn new(settings: FilterSettings) -> Result<Self> {
        let kernel = match settings {
            FilterSettings::Passthrough => {
                debug!("Filter stage in passthrough mode");
                Kernel::Passthrough
            }
            FilterSettings::LowPass {
                cutoff_hz,
                sample_rate_hz,
                order,
            } => {
                info!(
                    "Filter stage: Butterworth low-pass, {} Hz cutoff at {} Hz, order {}",
                    cutoff_hz, sample_rate_hz, order
                );
                Kernel::LowPass(ButterworthLowPass::new(cutoff_hz, sample_rate_hz, order)?)
            }
        };
        Ok(Self { kernel })
    }

    pub fn apply(&mut self, record: SampleRecord) -> ProcessedSample {
        let filtered_value = match &mut self.kernel {
            Kernel::Passthrough => record.value as f64,
            Kernel::LowPass(filter) => filter.process(record.value as f64),
        };
        ProcessedSample {
            timestamp: record.timestamp,
            filtered_value,
        }
    }
}

/// Run the filter worker until the raw channel closes.
///
/// Every processed sample is fanned out as an owned copy to two independent
/// lanes: the analysis lane applies backpressure (a full channel blocks this
/// stage), while the display lane is best-effort and sheds the newest sample
/// when its consumer lags.
pub fn run_filter_stage(
    mut rx: mpsc::Receiver<SampleRecord>,
    analysis_tx: mpsc::Sender<ProcessedSample>,
    display_tx: mpsc::Sender<ProcessedSample>,
    mut stage: FilterStage,
) {
    let mut display_drops: u64 = 0;

    while let Some(record) = rx.blocking_recv() {
        let processed = stage.apply(record);

        if analysis_tx.blocking_send(processed).is_err() {
            debug!("Analysis receiver dropped, stopping filter stage");
            break;
        }
        if let Err(mpsc::error::TrySendError::Full(_)) = display_tx.try_send(processed) {
            display_drops += 1;
        }
    }

    if display_drops > 0 {
        warn!(
            "Display lane dropped {} samples while its consumer lagged",
            display_drops
        );
    }
    info!("Filter stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: i64) -> SampleRecord {
        SampleRecord {
            timestamp: 0.0,
            value,
        }
    }

    #[test]
    fn test_passthrough_is_identity() {
        let mut stage = FilterStage::new(FilterSettings::Passthrough).unwrap();
        for value in [-1000, -1, 0, 1, 42, 65535] {
            let out = stage.apply(record(value));
            assert_eq!(out.filtered_value, value as f64);
        }
    }

    #[test]
    fn test_passthrough_preserves_timestamps() {
        let mut stage = FilterStage::new(FilterSettings::Passthrough).unwrap();
        let out = stage.apply(SampleRecord {
            timestamp: 12.5,
            value: 7,
        });
        assert_eq!(out.timestamp, 12.5);
    }

    #[test]
    fn test_lowpass_converges_to_dc_level() {
        let mut stage = FilterStage::new(FilterSettings::LowPass {
            cutoff_hz: 0.5,
            sample_rate_hz: 50.0,
            order: 5,
        })
        .unwrap();

        // Constant input must settle at the same level (unity DC gain).
        let mut last = 0.0;
        for _ in 0..5000 {
            last = stage.apply(record(100)).filtered_value;
        }
        assert!((last - 100.0).abs() < 0.5, "settled at {last}");
    }

    #[test]
    fn test_lowpass_attenuates_fast_oscillation() {
        let mut stage = FilterStage::new(FilterSettings::LowPass {
            cutoff_hz: 0.5,
            sample_rate_hz: 50.0,
            order: 5,
        })
        .unwrap();

        // A full-swing alternating input at 25 Hz is far above the 0.5 Hz
        // cutoff; the steady-state output swing should be near zero.
        let mut peak: f64 = 0.0;
        for i in 0..2000 {
            let value = if i % 2 == 0 { 100 } else { -100 };
            let out = stage.apply(record(value)).filtered_value;
            if i > 1000 {
                peak = peak.max(out.abs());
            }
        }
        assert!(peak < 1.0, "steady-state swing was {peak}");
    }

    #[test]
    fn test_lowpass_rejects_bad_parameters() {
        assert!(FilterStage::new(FilterSettings::LowPass {
            cutoff_hz: 30.0,
            sample_rate_hz: 50.0,
            order: 5,
        })
        .is_err());
        assert!(FilterStage::new(FilterSettings::LowPass {
            cutoff_hz: 0.5,
            sample_rate_hz: 50.0,
            order: 0,
        })
        .is_err());
    }

    #[test]
    fn test_even_order_lowpass_builds() {
        let mut stage = FilterStage::new(FilterSettings::LowPass {
            cutoff_hz: 1.0,
            sample_rate_hz: 50.0,
            order: 4,
        })
        .unwrap();
        let mut last = 0.0;
        for _ in 0..5000 {
            last = stage.apply(record(10)).filtered_value;
        }
        assert!((last - 10.0).abs() < 0.1);
    }
}
