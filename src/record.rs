use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::LinkStats;
use crate::pipeline::{AnalysisResult, FilterSettings};

/// A complete capture session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub session_id: Uuid,
    pub port: String,
    pub amplitude_level: u8,
    pub filter: FilterSettings,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    // Stats
    pub samples_received: u64,
    pub bytes_discarded: u64,
    pub checksum_errors: u64,
    pub windows_analyzed: u64,
    pub last_rate_bpm: Option<f64>,
}

impl CaptureRecord {
    pub fn new(port: String, amplitude_level: u8, filter: FilterSettings) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            port,
            amplitude_level,
            filter,
            started_at: Utc::now(),
            ended_at: None,
            samples_received: 0,
            bytes_discarded: 0,
            checksum_errors: 0,
            windows_analyzed: 0,
            last_rate_bpm: None,
        }
    }

    pub fn add_result(&mut self, result: &AnalysisResult) {
        self.windows_analyzed += 1;
        self.last_rate_bpm = result.metrics.rate.last().copied();
    }

    pub fn apply_link_stats(&mut self, stats: &LinkStats) {
        self.samples_received = stats.samples_published;
        self.bytes_discarded = stats.scanner.discarded_bytes;
        self.checksum_errors = stats.scanner.checksum_errors;
    }

    pub fn finalize(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RespirationMetrics;

    #[test]
    fn test_add_result_tracks_latest_rate() {
        let mut record =
            CaptureRecord::new("/dev/ttyUSB0".to_string(), 5, FilterSettings::Passthrough);
        record.add_result(&AnalysisResult {
            timestamp: 30.0,
            metrics: RespirationMetrics {
                rate: vec![14.0, 15.5],
                clean: vec![0.0, 0.0],
            },
        });
        assert_eq!(record.windows_analyzed, 1);
        assert_eq!(record.last_rate_bpm, Some(15.5));
    }

    #[test]
    fn test_finalize_sets_end_time() {
        let mut record =
            CaptureRecord::new("/dev/ttyUSB0".to_string(), 5, FilterSettings::Passthrough);
        assert!(record.ended_at.is_none());
        record.finalize();
        assert!(record.ended_at.is_some());
        assert!(record.duration_secs() >= 0.0);
    }
}
