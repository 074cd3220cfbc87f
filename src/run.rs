//! Complete analysis runs
//!
//! A [`MetricsRun`] is everything one analysis pass produced: one
//! [`MetricsResult`] per category — every category is always present, even
//! when empty — plus the profile name, creation timestamp, and the name of
//! the analysis scope. Runs are immutable once the execution context hands
//! them over; diffing and snapshot I/O operate on completed runs only.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::warn;

use crate::metric::{Metric, MetricCategory, MetricRepository};
use crate::profile::Profile;
use crate::results::MetricsResult;
use crate::snapshot::{self, SnapshotError};

/// All categories' results plus run metadata.
#[derive(Debug, Clone)]
pub struct MetricsRun {
    /// One result per category, in [`MetricCategory::ALL`] order.
    results: Vec<MetricsResult>,
    profile_name: String,
    timestamp: DateTime<Utc>,
    scope: String,
}

impl MetricsRun {
    /// A fresh, empty run stamped with the current time.
    pub fn new(profile_name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::with_timestamp(profile_name, scope, Utc::now())
    }

    /// A fresh, empty run with an explicit timestamp (snapshot reads).
    pub fn with_timestamp(
        profile_name: impl Into<String>,
        scope: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            results: MetricCategory::ALL
                .iter()
                .map(|_| MetricsResult::new())
                .collect(),
            profile_name: profile_name.into(),
            timestamp,
            scope: scope.into(),
        }
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Name of the analysis scope the run covered.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn results_for(&self, category: MetricCategory) -> &MetricsResult {
        &self.results[category.index()]
    }

    pub fn results_for_mut(&mut self, category: MetricCategory) -> &mut MetricsResult {
        &mut self.results[category.index()]
    }

    /// Union of the metrics present across all categories, in category
    /// then id order.
    pub fn metrics(&self) -> Vec<&Metric> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for category in MetricCategory::ALL {
            for metric in self.results_for(category).metrics() {
                if seen.insert(metric.id().to_string()) {
                    out.push(metric);
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.results.iter().all(MetricsResult::is_empty)
    }

    /// Whether any category's result breaches a threshold of the profile.
    pub fn has_warnings(&self, profile: &Profile) -> bool {
        self.results.iter().any(|r| r.has_warnings(profile))
    }

    /// A run with identical metadata and each category's result filtered
    /// down to its threshold-breaching rows.
    pub fn filter_rows_without_warnings(&self, profile: &Profile) -> MetricsRun {
        MetricsRun {
            results: self
                .results
                .iter()
                .map(|r| r.filter_rows_without_warnings(profile))
                .collect(),
            profile_name: self.profile_name.clone(),
            timestamp: self.timestamp,
            scope: self.scope.clone(),
        }
    }

    /// Pair this run (as "current") with an earlier one for a diff view.
    pub fn diff<'a>(&'a self, previous: &'a MetricsRun) -> RunDiff<'a> {
        RunDiff {
            current: self,
            previous,
        }
    }

    /// Persist to the snapshot format.
    pub fn write_to_file(&self, path: &Path) -> Result<(), SnapshotError> {
        snapshot::write_to_file(self, path)
    }

    /// Load a previously persisted run. A missing or unreadable snapshot
    /// yields `None` — "no previous results available" — never a panic.
    pub fn read_from_file(path: &Path, repository: &dyn MetricRepository) -> Option<MetricsRun> {
        match snapshot::read_from_file(path, repository) {
            Ok(run) => Some(run),
            Err(e) => {
                warn!("could not read snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Change classification for one diff cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffState {
    /// Present in both runs with equal values.
    Unchanged,
    /// Present in both runs with different values.
    Modified,
    /// Present only in the current run.
    Added,
    /// Present only in the previous run.
    Removed,
}

/// One (metric, measured object) cell of a diff view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffEntry {
    pub current: Option<f64>,
    pub previous: Option<f64>,
}

impl DiffEntry {
    /// `None` when the pair is absent from both runs.
    pub fn state(&self) -> Option<DiffState> {
        match (self.current, self.previous) {
            (Some(c), Some(p)) if c == p => Some(DiffState::Unchanged),
            (Some(_), Some(_)) => Some(DiffState::Modified),
            (Some(_), None) => Some(DiffState::Added),
            (None, Some(_)) => Some(DiffState::Removed),
            (None, None) => None,
        }
    }
}

/// A pairing of two completed runs for change visualization.
#[derive(Debug, Clone, Copy)]
pub struct RunDiff<'a> {
    current: &'a MetricsRun,
    previous: &'a MetricsRun,
}

impl<'a> RunDiff<'a> {
    pub fn current(&self) -> &'a MetricsRun {
        self.current
    }

    pub fn previous(&self) -> &'a MetricsRun {
        self.previous
    }

    /// Union of both runs' measured objects for a category.
    pub fn measured_objects(&self, category: MetricCategory) -> BTreeSet<&'a str> {
        self.current
            .results_for(category)
            .measured_objects()
            .chain(self.previous.results_for(category).measured_objects())
            .collect()
    }

    /// Union of both runs' metrics for a category, in id order.
    pub fn metrics(&self, category: MetricCategory) -> Vec<&'a Metric> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for run in [self.current, self.previous] {
            for metric in run.results_for(category).metrics() {
                if seen.insert(metric.id()) {
                    out.push(metric);
                }
            }
        }
        out.sort_by_key(|m| m.id());
        out
    }

    /// The (current, previous) values for one cell.
    pub fn entry(&self, category: MetricCategory, metric_id: &str, measured: &str) -> DiffEntry {
        DiffEntry {
            current: self.current.results_for(category).value_for(metric_id, measured),
            previous: self
                .previous
                .results_for(category)
                .value_for(metric_id, measured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{Calculator, VisitEvent};
    use crate::context::RunContext;
    use crate::metric::MetricType;
    use crate::profile::MetricInstance;

    #[derive(Default)]
    struct NullCalculator;

    impl Calculator for NullCalculator {
        fn visit(&mut self, _event: &VisitEvent<'_>, _ctx: &mut RunContext<'_, '_>) {}
    }

    fn metric(id: &str, category: MetricCategory) -> Metric {
        Metric::new(id, category, MetricType::Count, "T", "Test metric", || {
            Box::new(NullCalculator)
        })
    }

    #[test]
    fn test_every_category_always_present() {
        let run = MetricsRun::new("default", "demo");
        for category in MetricCategory::ALL {
            assert!(run.results_for(category).is_empty());
        }
        assert!(run.is_empty());
    }

    #[test]
    fn test_metrics_union_across_categories() {
        let class_metric = metric("per_class", MetricCategory::Class);
        let method_metric = metric("per_method", MetricCategory::Method);
        let mut run = MetricsRun::new("default", "demo");
        run.results_for_mut(MetricCategory::Class)
            .post_count(&class_metric, "A", 1.0);
        run.results_for_mut(MetricCategory::Method)
            .post_count(&method_metric, "A.a()", 2.0);

        let ids: Vec<_> = run.metrics().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["per_class", "per_method"]);
    }

    #[test]
    fn test_diff_union_and_cell_classification() {
        let m = metric("m", MetricCategory::Class);

        let mut previous = MetricsRun::new("default", "demo");
        previous
            .results_for_mut(MetricCategory::Class)
            .post_count(&m, "X", 1.0);
        previous
            .results_for_mut(MetricCategory::Class)
            .post_count(&m, "Y", 2.0);

        let mut current = MetricsRun::new("default", "demo");
        current
            .results_for_mut(MetricCategory::Class)
            .post_count(&m, "Y", 2.0);
        current
            .results_for_mut(MetricCategory::Class)
            .post_count(&m, "Z", 3.0);

        let diff = current.diff(&previous);
        let objects: Vec<_> = diff.measured_objects(MetricCategory::Class).into_iter().collect();
        assert_eq!(objects, vec!["X", "Y", "Z"]);

        let x = diff.entry(MetricCategory::Class, "m", "X");
        assert_eq!(x.current, None);
        assert_eq!(x.previous, Some(1.0));
        assert_eq!(x.state(), Some(DiffState::Removed));

        let z = diff.entry(MetricCategory::Class, "m", "Z");
        assert_eq!(z.current, Some(3.0));
        assert_eq!(z.previous, None);
        assert_eq!(z.state(), Some(DiffState::Added));

        let y = diff.entry(MetricCategory::Class, "m", "Y");
        assert_eq!(y.current, Some(2.0));
        assert_eq!(y.previous, Some(2.0));
        assert_eq!(y.state(), Some(DiffState::Unchanged));

        assert_eq!(
            diff.entry(MetricCategory::Class, "m", "missing").state(),
            None
        );
    }

    #[test]
    fn test_diff_modified_cell() {
        let m = metric("m", MetricCategory::Class);
        let mut previous = MetricsRun::new("default", "demo");
        previous
            .results_for_mut(MetricCategory::Class)
            .post_count(&m, "A", 1.0);
        let mut current = MetricsRun::new("default", "demo");
        current
            .results_for_mut(MetricCategory::Class)
            .post_count(&m, "A", 4.0);

        let entry = current.diff(&previous).entry(MetricCategory::Class, "m", "A");
        assert_eq!(entry.state(), Some(DiffState::Modified));
    }

    #[test]
    fn test_run_filter_keeps_metadata() {
        let m = metric("m", MetricCategory::Class);
        let mut run = MetricsRun::new("strict", "demo");
        run.results_for_mut(MetricCategory::Class)
            .post_count(&m, "A", 5.0);
        run.results_for_mut(MetricCategory::Class)
            .post_count(&m, "B", 50.0);

        let mut profile = Profile::new("strict");
        let mut instance = MetricInstance::new(m.clone());
        instance.upper_threshold = 10.0;
        instance.upper_enabled = true;
        profile.add_instance(instance);

        let filtered = run.filter_rows_without_warnings(&profile);
        assert_eq!(filtered.profile_name(), "strict");
        assert_eq!(filtered.scope(), "demo");
        assert_eq!(filtered.timestamp(), run.timestamp());
        let objects: Vec<_> = filtered
            .results_for(MetricCategory::Class)
            .measured_objects()
            .collect();
        assert_eq!(objects, vec!["B"]);
    }
}
