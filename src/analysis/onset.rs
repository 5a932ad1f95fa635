use thiserror::Error;

/// Default histogram resolution for amplitude binning.
pub const DEFAULT_N_BINS: usize = 100;

/// A mode bin must dominate the mean bin count by this factor before a
/// segment can be a pause plateau.
const MAX_BIN_RATIO_THRESHOLD: f64 = 5.0;

/// A neighboring bin joins the pause band while it holds more than this
/// fraction of the mode bin's count.
const BAND_EXPANSION_THRESHOLD: f64 = 0.25;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OnsetError {
    #[error("onset detection needs at least two peaks, got {0}")]
    TooFewPeaks(usize),

    #[error("need at least {needed} troughs for {peaks} peaks, got {got}")]
    TooFewTroughs {
        peaks: usize,
        needed: usize,
        got: usize,
    },

    #[error("extremum index {index} is out of range for waveform of length {len}")]
    OutOfBounds { index: usize, len: usize },
}

/// Per-breath-cycle onsets and pauses, indexed by cycle number.
///
/// Onset values are sample indices into the source waveform. Pause entries
/// are `None` for cycles without a detected plateau; that is an expected
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreathEvents {
    pub inhale_onsets: Vec<usize>,
    pub exhale_onsets: Vec<usize>,
    pub inhale_pause_onsets: Vec<Option<usize>>,
    pub exhale_pause_onsets: Vec<Option<usize>>,
}

/// Amplitude histogram over one inter-extremum window, numpy-style: equal
/// width bins spanning [min, max], the maximum landing in the last bin.
struct AmplitudeHistogram {
    counts: Vec<u64>,
    edges: Vec<f64>,
}

impl AmplitudeHistogram {
    fn new(window: &[f64], n_bins: usize) -> Self {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &v in window {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo >= hi {
            // Degenerate flat window: center a unit range on the value.
            lo -= 0.5;
            hi = lo + 1.0;
        }
        let width = (hi - lo) / n_bins as f64;

        let mut counts = vec![0u64; n_bins];
        for &v in window {
            let bin = (((v - lo) / width) as usize).min(n_bins - 1);
            counts[bin] += 1;
        }

        let edges = (0..=n_bins).map(|i| lo + i as f64 * width).collect();
        Self { counts, edges }
    }

    fn mode_bin(&self) -> usize {
        let mut best = 0;
        for (i, &c) in self.counts.iter().enumerate() {
            if c > self.counts[best] {
                best = i;
            }
        }
        best
    }
}

/// How one inter-extremum window transitions between breath phases.
enum Transition {
    /// Continuous transition; scan against the global baseline.
    Direct,
    /// Sustained plateau; the band is the expanded mode-bin amplitude range.
    Pause { band_lo: f64, band_hi: f64 },
}

fn classify(
    window: &[f64],
    n_bins: usize,
    lower_threshold_bin: usize,
    upper_threshold_bin: usize,
    max_pause_bins: usize,
) -> Transition {
    if window.is_empty() {
        return Transition::Direct;
    }

    let hist = AmplitudeHistogram::new(window, n_bins);
    let mode = hist.mode_bin();
    let mean_count = window.len() as f64 / n_bins as f64;
    let max_bin_ratio = hist.counts[mode] as f64 / mean_count;

    let mid_range = mode > lower_threshold_bin && mode < upper_threshold_bin;
    if !mid_range || max_bin_ratio < MAX_BIN_RATIO_THRESHOLD {
        return Transition::Direct;
    }

    // Widen the mode bin's amplitude range outward, bin by bin, while the
    // neighboring bin still carries a meaningful share of the plateau.
    let limit = hist.counts[mode] as f64 * BAND_EXPANSION_THRESHOLD;
    let mut band_lo = hist.edges[mode];
    let mut band_hi = hist.edges[mode + 1];

    for d in 1..=max_pause_bins {
        let Some(bin) = mode.checked_sub(d) else { break };
        if hist.counts[bin] as f64 > limit {
            band_lo = hist.edges[bin];
        } else {
            break;
        }
    }
    for d in 1..=max_pause_bins {
        let bin = mode + d;
        if bin >= n_bins {
            break;
        }
        if hist.counts[bin] as f64 > limit {
            band_hi = hist.edges[bin + 1];
        } else {
            break;
        }
    }

    Transition::Pause { band_lo, band_hi }
}

/// First and last in-window indices whose amplitude falls strictly inside
/// the pause band.
fn pause_interval(window: &[f64], band_lo: f64, band_hi: f64) -> Option<(usize, usize)> {
    let mut first = None;
    let mut last = None;
    for (j, &v) in window.iter().enumerate() {
        if v > band_lo && v < band_hi {
            if first.is_none() {
                first = Some(j);
            }
            last = Some(j);
        }
    }
    Some((first?, last?))
}

fn last_at_or_below(window: &[f64], threshold: f64) -> Option<usize> {
    window.iter().rposition(|&v| v <= threshold)
}

fn last_above(window: &[f64], threshold: f64) -> Option<usize> {
    window.iter().rposition(|&v| v > threshold)
}

/// Find each breath onset and respiratory pause, given the waveform and its
/// alternating peak/trough indices.
///
/// Each inter-extremum window (trough to next peak for inhales, peak to next
/// trough for exhales) is classified independently: a dominant mid-range
/// histogram mode marks a pause plateau, anything else is a direct
/// transition scanned against the waveform mean. Boundary cycles, where one
/// extremum is missing, fall back to a plain threshold-crossing scan within
/// a horizon of one mean inter-peak spacing.
pub fn find_breath_onsets(
    resp: &[f64],
    peaks: &[usize],
    troughs: &[usize],
    n_bins: usize,
) -> Result<BreathEvents, OnsetError> {
    let n_peaks = peaks.len();
    if n_peaks < 2 {
        return Err(OnsetError::TooFewPeaks(n_peaks));
    }
    if troughs.len() + 1 < n_peaks {
        return Err(OnsetError::TooFewTroughs {
            peaks: n_peaks,
            needed: n_peaks - 1,
            got: troughs.len(),
        });
    }
    for &index in peaks.iter().chain(troughs) {
        if index >= resp.len() {
            return Err(OnsetError::OutOfBounds {
                index,
                len: resp.len(),
            });
        }
    }

    let mut inhale_onsets = vec![0usize; n_peaks];
    let mut exhale_onsets = vec![0usize; troughs.len()];
    let mut inhale_pause_onsets: Vec<Option<usize>> = vec![None; n_peaks];
    let mut exhale_pause_onsets: Vec<Option<usize>> = vec![None; troughs.len()];

    let max_pause_bins = if n_bins >= 100 { 5 } else { 2 };
    let lower_threshold_bin = (n_bins as f64 * 0.3).round() as usize;
    let upper_threshold_bin = (n_bins as f64 * 0.7).round() as usize;
    let baseline = resp.iter().sum::<f64>() / resp.len() as f64;

    // Lookback/lookahead horizon for the boundary cycles.
    let tail_onset_lims = {
        let total: usize = peaks.windows(2).map(|w| w[1] - w[0]).sum();
        total / (n_peaks - 1)
    };

    // First inhale: no trough exists before the first peak, so scan within
    // the horizon using the mode-bin edge when it sits mid-range.
    let first_boundary = peaks[0].saturating_sub(tail_onset_lims);
    let first_window = &resp[first_boundary..peaks[0]];
    inhale_onsets[0] = if first_window.is_empty() {
        first_boundary
    } else {
        let hist = AmplitudeHistogram::new(first_window, n_bins);
        let mode = hist.mode_bin();
        let threshold = if mode < lower_threshold_bin || mode > upper_threshold_bin {
            baseline
        } else {
            hist.edges[mode]
        };
        match first_window.iter().rposition(|&v| v < threshold) {
            Some(j) => first_boundary + j,
            None => first_boundary,
        }
    };

    for cycle in 0..n_peaks - 1 {
        // Inhale segment: trough up to the next peak. A plateau here is the
        // pause that follows the exhale.
        let start = troughs[cycle];
        let window = &resp[start..peaks[cycle + 1]];
        let mut settled = false;

        if let Transition::Pause { band_lo, band_hi } = classify(
            window,
            n_bins,
            lower_threshold_bin,
            upper_threshold_bin,
            max_pause_bins,
        ) {
            if let Some((first, last)) = pause_interval(window, band_lo, band_hi) {
                exhale_pause_onsets[cycle] = Some((start + first).saturating_sub(1));
                inhale_onsets[cycle + 1] = start + last + 1;
                settled = true;
            }
        }
        if !settled {
            inhale_onsets[cycle + 1] = match last_at_or_below(window, baseline) {
                Some(j) => start + j,
                None => start,
            };
        }

        // Exhale segment: peak down to its trough. A plateau here is the
        // pause that follows the inhale.
        let start = peaks[cycle];
        let window = &resp[start..troughs[cycle]];
        let mut settled = false;

        if let Transition::Pause { band_lo, band_hi } = classify(
            window,
            n_bins,
            lower_threshold_bin,
            upper_threshold_bin,
            max_pause_bins,
        ) {
            if let Some((first, last)) = pause_interval(window, band_lo, band_hi) {
                inhale_pause_onsets[cycle] = Some((start + first).saturating_sub(1));
                exhale_onsets[cycle] = start + last + 1;
                settled = true;
            }
        }
        if !settled {
            exhale_onsets[cycle] = match last_above(window, baseline) {
                Some(j) => start + j,
                None => start,
            };
        }
    }

    // Final exhale: no trough exists after the last peak; take the first
    // fall below baseline within the horizon.
    let last_peak = peaks[n_peaks - 1];
    let last_boundary = if resp.len() - last_peak > tail_onset_lims {
        last_peak + tail_onset_lims
    } else {
        resp.len()
    };
    let tail_window = &resp[last_peak..last_boundary];
    if let Some(onset) = exhale_onsets.last_mut() {
        *onset = match tail_window.iter().position(|&v| v < baseline) {
            Some(j) => last_peak + j,
            None => last_boundary,
        };
    }

    Ok(BreathEvents {
        inhale_onsets,
        exhale_onsets,
        inhale_pause_onsets,
        exhale_pause_onsets,
    })
}
