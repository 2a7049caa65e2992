//! Run reports and benchmark summaries

use crate::pipeline::orchestrator::RunMode;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// One persisted batch
#[derive(Debug, Clone, Serialize)]
pub struct PersistStats {
    /// Rows appended to the batch before rollup
    pub rows: u64,
    /// Facts written
    pub facts: u64,
    /// Segment file size
    pub bytes: u64,
    pub elapsed: Duration,
}

/// The final merge
#[derive(Debug, Clone, Serialize)]
pub struct MergeStats {
    pub segments: usize,
    pub facts: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub rows_ingested: u64,
    /// Index rollovers, persisted or not
    pub batches: usize,
    pub persists: Vec<PersistStats>,
    pub merge: Option<MergeStats>,
    /// Append loop including persists
    pub ingest_elapsed: Duration,
    pub total_elapsed: Duration,
}

impl RunReport {
    pub(crate) fn new(run_id: Uuid, mode: RunMode) -> Self {
        Self {
            run_id,
            mode,
            rows_ingested: 0,
            batches: 0,
            persists: Vec::new(),
            merge: None,
            ingest_elapsed: Duration::ZERO,
            total_elapsed: Duration::ZERO,
        }
    }

    /// Rows ingested per second over the whole run
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.total_elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_ingested as f64 / secs
        } else {
            0.0
        }
    }

    pub fn persisted_facts(&self) -> u64 {
        self.persists.iter().map(|p| p.facts).sum()
    }

    pub fn persisted_bytes(&self) -> u64 {
        self.persists.iter().map(|p| p.bytes).sum()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {} ({}): {} rows in {} batches, {} segments ({} facts, {} bytes)",
            self.run_id,
            self.mode,
            self.rows_ingested,
            self.batches,
            self.persists.len(),
            self.persisted_facts(),
            self.persisted_bytes()
        )?;
        if let Some(merge) = &self.merge {
            write!(
                f,
                ", merged {} -> {} facts in {:?}",
                merge.segments, merge.facts, merge.elapsed
            )?;
        }
        write!(
            f,
            ", {:?} total, {:.0} rows/s",
            self.total_elapsed,
            self.rows_per_sec()
        )
    }
}

/// Aggregate over several runs of the same configuration
#[derive(Debug, Clone, Serialize)]
pub struct BenchSummary {
    pub runs: usize,
    pub mean_elapsed: Duration,
    pub min_elapsed: Duration,
    pub max_elapsed: Duration,
    pub mean_rows_per_sec: f64,
}

impl BenchSummary {
    /// Summarize `reports`; `None` when there are none
    pub fn from_reports(reports: &[RunReport]) -> Option<Self> {
        let min_elapsed = reports.iter().map(|r| r.total_elapsed).min()?;
        let max_elapsed = reports.iter().map(|r| r.total_elapsed).max()?;
        let total: Duration = reports.iter().map(|r| r.total_elapsed).sum();
        let runs = reports.len();

        Some(Self {
            runs,
            mean_elapsed: total / runs as u32,
            min_elapsed,
            max_elapsed,
            mean_rows_per_sec: reports.iter().map(|r| r.rows_per_sec()).sum::<f64>() / runs as f64,
        })
    }
}

impl std::fmt::Display for BenchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} runs: mean {:?} (min {:?}, max {:?}), {:.0} rows/s",
            self.runs, self.mean_elapsed, self.min_elapsed, self.max_elapsed, self.mean_rows_per_sec
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(rows: u64, millis: u64) -> RunReport {
        let mut report = RunReport::new(Uuid::new_v4(), RunMode::Persist);
        report.rows_ingested = rows;
        report.total_elapsed = Duration::from_millis(millis);
        report.persists.push(PersistStats {
            rows,
            facts: rows / 2,
            bytes: 100,
            elapsed: Duration::from_millis(1),
        });
        report
    }

    #[test]
    fn test_rows_per_sec() {
        assert_eq!(report(1000, 500).rows_per_sec(), 2000.0);
        assert_eq!(report(1000, 0).rows_per_sec(), 0.0);
        assert_eq!(report(10, 1).persisted_facts(), 5);
    }

    #[test]
    fn test_summary() {
        assert!(BenchSummary::from_reports(&[]).is_none());

        let summary =
            BenchSummary::from_reports(&[report(1000, 100), report(1000, 300)]).unwrap();
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.mean_elapsed, Duration::from_millis(200));
        assert_eq!(summary.min_elapsed, Duration::from_millis(100));
        assert_eq!(summary.max_elapsed, Duration::from_millis(300));
        assert!(summary.to_string().starts_with("2 runs"));
    }

    #[test]
    fn test_display_mentions_merge() {
        let mut r = report(10, 10);
        assert!(!r.to_string().contains("merged"));
        r.merge = Some(MergeStats {
            segments: 4,
            facts: 10,
            bytes: 10,
            elapsed: Duration::from_millis(1),
        });
        assert!(r.to_string().contains("merged 4 -> 10 facts"));
    }
}
