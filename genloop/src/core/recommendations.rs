//! Derived end-of-run assessments: resolution rate and recommendations.

use serde::{Deserialize, Serialize};

use crate::core::history::{
    ErrorEvolution, ErrorSnapshot, PerformanceAverages, PerformanceStats, Progress,
    ResolutionStats, TestHistory, TestHistorySummary,
};

/// Average iteration duration above which generation is considered slow.
pub const SLOW_ITERATION_SECS: f64 = 120.0;

/// Resolution rate below which requirements should be reviewed.
pub const LOW_RESOLUTION_RATE: f64 = 0.5;

pub const ADD_TESTS: &str = "Consider adding test files to improve code reliability";
pub const ADD_CONFIG: &str =
    "Add configuration files (package.json, requirements.txt) for better dependency management";
pub const ORGANIZE: &str = "Organize code into logical directories for better maintainability";
pub const SIMPLIFY: &str =
    "Generation time is high - consider simplifying requirements for faster iterations";
pub const REVIEW_REQUIREMENTS: &str =
    "Error resolution rate is low - review requirements clarity and complexity";
pub const LOOKS_GOOD: &str = "Code quality looks good! Consider adding more comprehensive tests.";

/// The three history stores merged into one view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsolidatedStats {
    #[serde(flatten)]
    pub summary: Option<TestHistorySummary>,
    pub final_error_state: Option<ErrorSnapshot>,
    pub error_resolution: Option<ResolutionStats>,
    pub performance: Option<PerformanceAverages>,
}

impl ConsolidatedStats {
    pub fn merge(
        history: &TestHistory,
        evolution: &ErrorEvolution,
        performance: &PerformanceStats,
    ) -> Self {
        Self {
            summary: history.summary.clone(),
            final_error_state: evolution.latest().cloned(),
            error_resolution: evolution.resolution_stats.clone(),
            performance: performance.averages.clone(),
        }
    }

    pub fn iterations_efficiency(&self) -> f64 {
        match &self.summary {
            Some(s) if s.total_iterations > 0 => {
                s.successful_iterations as f64 / s.total_iterations as f64
            }
            _ => 0.0,
        }
    }

    pub fn avg_duration(&self) -> f64 {
        self.performance.as_ref().map_or(0.0, |p| p.avg_duration)
    }

    pub fn avg_files_per_second(&self) -> f64 {
        self.performance
            .as_ref()
            .map_or(0.0, |p| p.avg_files_per_second)
    }
}

/// Coarse error resolution rate.
///
/// 0 without any snapshot, 1 when no errors remain, otherwise read from the
/// latest overall progress label (improving 0.8, stable 0.5, else 0.2).
pub fn error_resolution_rate(stats: &ConsolidatedStats) -> f64 {
    let Some(final_state) = &stats.final_error_state else {
        return 0.0;
    };
    if final_state.total_active_errors == 0 {
        return 1.0;
    }
    match stats.error_resolution.as_ref().map(|r| r.overall_progress) {
        Some(Progress::Improving) => 0.8,
        Some(Progress::Stable) => 0.5,
        Some(Progress::Regressing) | None => 0.2,
    }
}

/// Observable properties of the final tree used by the rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSignals {
    pub has_tests: bool,
    pub has_config: bool,
    pub organized: bool,
}

/// Every matching rule in order, or the single positive default.
pub fn quality_recommendations(tree: TreeSignals, stats: &ConsolidatedStats) -> Vec<String> {
    let rules = [
        (!tree.has_tests, ADD_TESTS),
        (!tree.has_config, ADD_CONFIG),
        (!tree.organized, ORGANIZE),
        (stats.avg_duration() > SLOW_ITERATION_SECS, SIMPLIFY),
        (error_resolution_rate(stats) < LOW_RESOLUTION_RATE, REVIEW_REQUIREMENTS),
    ];
    let mut recommendations: Vec<String> = rules
        .iter()
        .filter(|(fires, _)| *fires)
        .map(|(_, text)| (*text).to_string())
        .collect();
    if recommendations.is_empty() {
        recommendations.push(LOOKS_GOOD.to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::Trend;

    fn snapshot(total_active_errors: u32) -> ErrorSnapshot {
        ErrorSnapshot {
            iteration: 2,
            timestamp: "t".to_string(),
            validation_errors: total_active_errors,
            compilation_success: true,
            test_failures: 0,
            errors_fixed: 0,
            total_active_errors,
        }
    }

    fn stats_with(total: u32, progress: Option<Progress>) -> ConsolidatedStats {
        ConsolidatedStats {
            final_error_state: Some(snapshot(total)),
            error_resolution: progress.map(|overall_progress| ResolutionStats {
                validation_errors_trend: Trend::Stable,
                compilation_improved: false,
                test_failures_trend: Trend::Stable,
                overall_progress,
            }),
            ..ConsolidatedStats::default()
        }
    }

    #[test]
    fn resolution_rate_mapping() {
        assert_eq!(error_resolution_rate(&ConsolidatedStats::default()), 0.0);
        assert_eq!(error_resolution_rate(&stats_with(0, None)), 1.0);
        assert_eq!(
            error_resolution_rate(&stats_with(3, Some(Progress::Improving))),
            0.8
        );
        assert_eq!(
            error_resolution_rate(&stats_with(3, Some(Progress::Stable))),
            0.5
        );
        assert_eq!(
            error_resolution_rate(&stats_with(3, Some(Progress::Regressing))),
            0.2
        );
        assert_eq!(error_resolution_rate(&stats_with(3, None)), 0.2);
    }

    #[test]
    fn all_rules_fire_in_order() {
        let mut stats = stats_with(4, Some(Progress::Regressing));
        stats.performance = Some(PerformanceAverages {
            avg_duration: 180.0,
            ..PerformanceAverages::default()
        });
        let tree = TreeSignals {
            has_tests: false,
            has_config: false,
            organized: false,
        };
        assert_eq!(
            quality_recommendations(tree, &stats),
            vec![ADD_TESTS, ADD_CONFIG, ORGANIZE, SIMPLIFY, REVIEW_REQUIREMENTS]
        );
    }

    #[test]
    fn default_when_nothing_fires() {
        let tree = TreeSignals {
            has_tests: true,
            has_config: true,
            organized: true,
        };
        assert_eq!(
            quality_recommendations(tree, &stats_with(0, None)),
            vec![LOOKS_GOOD]
        );
    }

    #[test]
    fn efficiency_handles_missing_summary() {
        assert_eq!(ConsolidatedStats::default().iterations_efficiency(), 0.0);
    }
}
