use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::onset::{find_breath_onsets, DEFAULT_N_BINS};

/// Shortest window the built-in analyzer accepts, in samples.
pub const MIN_WINDOW_LEN: usize = 100;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis window of {len} samples is below the {min} sample minimum")]
    WindowTooShort { len: usize, min: usize },

    #[error("window holds too few breath cycles ({peaks} peaks, {troughs} troughs)")]
    TooFewCycles { peaks: usize, troughs: usize },
}

/// Per-window respiration metrics, aligned index-for-index with the window.
#[derive(Debug, Clone, Serialize)]
pub struct RespirationMetrics {
    /// Instantaneous respiration rate, breaths per minute.
    #[serde(rename = "RSP_Rate")]
    pub rate: Vec<f64>,
    /// Smoothed waveform the extrema were taken from.
    #[serde(rename = "RSP_Clean")]
    pub clean: Vec<f64>,
}

/// Seam for the respiration metrics collaborator.
pub trait RespirationAnalyzer: Send {
    fn analyze(
        &mut self,
        window: &[f64],
        sample_rate_hz: f64,
    ) -> Result<RespirationMetrics, AnalysisError>;
}

/// Built-in collaborator: moving-average smoothing, baseline-crossing
/// extrema, per-sample rate from inter-peak spacing.
pub struct CycleRateAnalyzer {
    n_bins: usize,
    smoothing_secs: f64,
}

impl Default for CycleRateAnalyzer {
    fn default() -> Self {
        Self {
            n_bins: DEFAULT_N_BINS,
            smoothing_secs: 0.5,
        }
    }
}

impl CycleRateAnalyzer {
    pub fn new(n_bins: usize) -> Self {
        Self {
            n_bins,
            ..Self::default()
        }
    }

    fn smooth(&self, window: &[f64], sample_rate_hz: f64) -> Vec<f64> {
        let half = ((self.smoothing_secs * sample_rate_hz / 2.0).round() as usize).max(1);
        (0..window.len())
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half + 1).min(window.len());
                window[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
            })
            .collect()
    }
}

/// Extrema of the smoothed waveform: one peak per above-baseline run, one
/// trough per below-baseline run, troughs kept strictly between the first
/// and last peak.
fn baseline_extrema(clean: &[f64], baseline: f64) -> (Vec<usize>, Vec<usize>) {
    let mut peaks = Vec::new();
    let mut troughs = Vec::new();

    let mut run_start = 0;
    let mut run_above = clean[0] >= baseline;
    for i in 1..=clean.len() {
        let above = i < clean.len() && clean[i] >= baseline;
        if i < clean.len() && above == run_above {
            continue;
        }
        let run = &clean[run_start..i];
        let extremum = run_start
            + run
                .iter()
                .enumerate()
                .fold(0, |best, (j, &v)| {
                    let better = if run_above { v > run[best] } else { v < run[best] };
                    if better {
                        j
                    } else {
                        best
                    }
                });
        if run_above {
            peaks.push(extremum);
        } else {
            troughs.push(extremum);
        }
        run_start = i;
        run_above = above;
    }

    if let (Some(&first), Some(&last)) = (peaks.first(), peaks.last()) {
        troughs.retain(|&t| t > first && t < last);
    }
    (peaks, troughs)
}

impl RespirationAnalyzer for CycleRateAnalyzer {
    fn analyze(
        &mut self,
        window: &[f64],
        sample_rate_hz: f64,
    ) -> Result<RespirationMetrics, AnalysisError> {
        if window.len() < MIN_WINDOW_LEN {
            return Err(AnalysisError::WindowTooShort {
                len: window.len(),
                min: MIN_WINDOW_LEN,
            });
        }

        let clean = self.smooth(window, sample_rate_hz);
        let baseline = clean.iter().sum::<f64>() / clean.len() as f64;
        let (peaks, troughs) = baseline_extrema(&clean, baseline);

        if peaks.len() < 2 {
            return Err(AnalysisError::TooFewCycles {
                peaks: peaks.len(),
                troughs: troughs.len(),
            });
        }

        match find_breath_onsets(&clean, &peaks, &troughs, self.n_bins) {
            Ok(events) => {
                let pauses = events
                    .inhale_pause_onsets
                    .iter()
                    .chain(&events.exhale_pause_onsets)
                    .filter(|p| p.is_some())
                    .count();
                debug!(
                    inhales = events.inhale_onsets.len(),
                    exhales = events.exhale_onsets.len(),
                    pauses,
                    "Breath onsets located"
                );
            }
            Err(e) => debug!("Onset detection skipped for this window: {}", e),
        }

        let mut rate = vec![0.0; window.len()];
        let mut seg = 0;
        for (j, r) in rate.iter_mut().enumerate() {
            while seg + 2 < peaks.len() && j >= peaks[seg + 1] {
                seg += 1;
            }
            let period = (peaks[seg + 1] - peaks[seg]) as f64 / sample_rate_hz;
            *r = 60.0 / period;
        }

        Ok(RespirationMetrics { rate, clean })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinusoid_window(len: usize, freq_hz: f64, sample_rate_hz: f64) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sample_rate_hz).sin())
            .collect()
    }

    #[test]
    fn test_steady_breathing_rate_is_recovered() {
        // 0.25 Hz breathing sampled at 50 Hz is 15 breaths per minute.
        let window = sinusoid_window(1500, 0.25, 50.0);
        let mut analyzer = CycleRateAnalyzer::default();
        let metrics = analyzer.analyze(&window, 50.0).unwrap();

        assert_eq!(metrics.rate.len(), window.len());
        assert_eq!(metrics.clean.len(), window.len());
        for &r in &metrics.rate {
            assert!((r - 15.0).abs() < 1.0, "rate {r}");
        }
    }

    #[test]
    fn test_flat_window_has_too_few_cycles() {
        let window = vec![5.0; 1500];
        let mut analyzer = CycleRateAnalyzer::default();
        let err = analyzer.analyze(&window, 50.0).unwrap_err();
        assert!(matches!(err, AnalysisError::TooFewCycles { .. }));
    }

    #[test]
    fn test_short_window_is_rejected() {
        let window = sinusoid_window(50, 0.25, 50.0);
        let mut analyzer = CycleRateAnalyzer::default();
        let err = analyzer.analyze(&window, 50.0).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::WindowTooShort {
                len: 50,
                min: MIN_WINDOW_LEN
            }
        );
    }

    #[test]
    fn test_smoothing_suppresses_spike_noise() {
        let mut window = sinusoid_window(1500, 0.25, 50.0);
        for i in (0..window.len()).step_by(97) {
            window[i] += 3.0; // isolated spikes
        }
        let mut analyzer = CycleRateAnalyzer::default();
        let metrics = analyzer.analyze(&window, 50.0).unwrap();
        for &r in &metrics.rate {
            assert!((r - 15.0).abs() < 2.0, "rate {r}");
        }
    }

    #[test]
    fn test_extrema_alternate_around_baseline() {
        let clean = sinusoid_window(600, 0.25, 50.0);
        let (peaks, troughs) = baseline_extrema(&clean, 0.0);
        assert_eq!(peaks.len(), 3);
        assert_eq!(troughs.len(), 2);
        for (p, t) in peaks.iter().zip(&troughs) {
            assert!(p < t);
        }
    }
}
