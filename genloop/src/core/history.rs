//! Structured iteration history stores.
//!
//! Each store keeps the full list of per-iteration entries and a derived
//! aggregate. Aggregates are always recomputed from the full list on every
//! append, never patched incrementally.

use serde::{Deserialize, Serialize};

use crate::core::types::{IterationResult, IterationStatus, TestResults};

/// `logs/test_history.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TestHistory {
    pub iterations: Vec<TestHistoryEntry>,
    pub summary: Option<TestHistorySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestHistoryEntry {
    pub iteration: u32,
    pub timestamp: String,
    pub status: IterationStatus,
    pub duration: f64,
    pub test_results: TestResults,
    pub validation_errors: u32,
    pub compilation_success: bool,
    pub files_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestHistorySummary {
    pub total_iterations: usize,
    pub successful_iterations: usize,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub final_status: IterationStatus,
    pub last_updated: String,
}

impl TestHistory {
    pub fn record(&mut self, result: &IterationResult) {
        self.iterations.push(TestHistoryEntry {
            iteration: result.iteration,
            timestamp: result.timestamp.clone(),
            status: result.status,
            duration: result.duration,
            test_results: result.test_results.clone(),
            validation_errors: result.validation_errors,
            compilation_success: result.compilation_success,
            files_count: result.code_files_count,
        });
        self.summary = self.recompute_summary();
    }

    fn recompute_summary(&self) -> Option<TestHistorySummary> {
        let last = self.iterations.last()?;
        let total_duration: f64 = self.iterations.iter().map(|e| e.duration).sum();
        Some(TestHistorySummary {
            total_iterations: self.iterations.len(),
            successful_iterations: self
                .iterations
                .iter()
                .filter(|e| e.status == IterationStatus::Success)
                .count(),
            total_duration,
            avg_duration: total_duration / self.iterations.len() as f64,
            final_status: last.status,
            last_updated: last.timestamp.clone(),
        })
    }
}

/// Direction of an error count between two snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Decreasing,
    Increasing,
    Stable,
}

impl Trend {
    fn between(previous: u32, current: u32) -> Self {
        match current.cmp(&previous) {
            std::cmp::Ordering::Less => Trend::Decreasing,
            std::cmp::Ordering::Greater => Trend::Increasing,
            std::cmp::Ordering::Equal => Trend::Stable,
        }
    }
}

/// Overall direction of total active errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    Improving,
    Regressing,
    Stable,
}

/// `logs/error_evolution.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ErrorEvolution {
    pub error_timeline: Vec<ErrorSnapshot>,
    /// Present once at least two snapshots exist.
    pub resolution_stats: Option<ResolutionStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorSnapshot {
    pub iteration: u32,
    pub timestamp: String,
    pub validation_errors: u32,
    pub compilation_success: bool,
    pub test_failures: u32,
    pub errors_fixed: usize,
    pub total_active_errors: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionStats {
    pub validation_errors_trend: Trend,
    pub compilation_improved: bool,
    pub test_failures_trend: Trend,
    pub overall_progress: Progress,
}

impl ResolutionStats {
    pub fn between(previous: &ErrorSnapshot, current: &ErrorSnapshot) -> Self {
        let overall_progress = match Trend::between(
            previous.total_active_errors,
            current.total_active_errors,
        ) {
            Trend::Decreasing => Progress::Improving,
            Trend::Increasing => Progress::Regressing,
            Trend::Stable => Progress::Stable,
        };
        Self {
            validation_errors_trend: Trend::between(
                previous.validation_errors,
                current.validation_errors,
            ),
            compilation_improved: current.compilation_success && !previous.compilation_success,
            test_failures_trend: Trend::between(previous.test_failures, current.test_failures),
            overall_progress,
        }
    }
}

impl ErrorEvolution {
    pub fn record(&mut self, result: &IterationResult) {
        self.error_timeline.push(ErrorSnapshot {
            iteration: result.iteration,
            timestamp: result.timestamp.clone(),
            validation_errors: result.validation_errors,
            compilation_success: result.compilation_success,
            test_failures: result.test_results.failure_count(),
            errors_fixed: result.errors_fixed.len(),
            total_active_errors: result.total_active_errors(),
        });
        if let [.., previous, current] = self.error_timeline.as_slice() {
            self.resolution_stats = Some(ResolutionStats::between(previous, current));
        }
    }

    pub fn latest(&self) -> Option<&ErrorSnapshot> {
        self.error_timeline.last()
    }
}

/// `logs/performance_stats.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceStats {
    pub iterations: Vec<PerformanceEntry>,
    pub averages: Option<PerformanceAverages>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceEntry {
    pub iteration: u32,
    pub timestamp: String,
    pub duration: f64,
    pub files_generated: usize,
    pub test_files: usize,
    pub files_per_second: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceAverages {
    pub avg_duration: f64,
    pub avg_files_per_iteration: f64,
    pub avg_files_per_second: f64,
    pub fastest_iteration: f64,
    pub slowest_iteration: f64,
    pub total_files_generated: usize,
}

impl PerformanceStats {
    pub fn record(&mut self, result: &IterationResult) {
        let files_per_second = if result.duration > 0.0 {
            result.code_files_count as f64 / result.duration
        } else {
            0.0
        };
        self.iterations.push(PerformanceEntry {
            iteration: result.iteration,
            timestamp: result.timestamp.clone(),
            duration: result.duration,
            files_generated: result.code_files_count,
            test_files: result.test_files_count,
            files_per_second,
        });
        self.averages = self.recompute_averages();
    }

    fn recompute_averages(&self) -> Option<PerformanceAverages> {
        if self.iterations.is_empty() {
            return None;
        }
        let n = self.iterations.len() as f64;
        let durations = self.iterations.iter().map(|e| e.duration);
        let total_files: usize = self.iterations.iter().map(|e| e.files_generated).sum();
        Some(PerformanceAverages {
            avg_duration: durations.clone().sum::<f64>() / n,
            avg_files_per_iteration: total_files as f64 / n,
            avg_files_per_second: self
                .iterations
                .iter()
                .map(|e| e.files_per_second)
                .sum::<f64>()
                / n,
            fastest_iteration: durations.clone().fold(f64::INFINITY, f64::min),
            slowest_iteration: durations.fold(f64::NEG_INFINITY, f64::max),
            total_files_generated: total_files,
        })
    }
}
