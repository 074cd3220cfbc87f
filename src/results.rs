//! Per-category result storage
//!
//! One [`MetricsResult`] holds every value recorded at one granularity
//! level during a run: a (metric, measured object) → [`Fraction`] table
//! plus index sets of the metrics and measured objects present, and the
//! anchors pointing back into the program model.
//!
//! Absence is first-class: a value that was never posted is distinct from
//! a posted zero, and aggregate queries return `None` both when a metric
//! type does not support them and when there is nothing to aggregate.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::metric::{Metric, MetricType};
use crate::model::Anchor;
use crate::profile::Profile;

/// One recorded value: a numerator/denominator pair.
///
/// Plain counts are fractions over 1; ratio metrics carry their real
/// denominator so aggregates can weight correctly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fraction {
    pub numerator: f64,
    pub denominator: f64,
}

impl Fraction {
    pub fn new(numerator: f64, denominator: f64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A plain count, denominator 1.
    pub fn whole(numerator: f64) -> Self {
        Self::new(numerator, 1.0)
    }

    /// The evaluated value; a zero denominator evaluates to 0.
    pub fn value(&self) -> f64 {
        if self.denominator == 0.0 {
            0.0
        } else {
            self.numerator / self.denominator
        }
    }
}

/// All values recorded for one category during one run.
#[derive(Debug, Clone, Default)]
pub struct MetricsResult {
    /// Metrics present, by id.
    metrics: BTreeMap<String, Metric>,
    /// Measured objects present.
    measured_objects: BTreeSet<String>,
    /// metric id → measured object → recorded fraction.
    values: BTreeMap<String, BTreeMap<String, Fraction>>,
    /// measured object → model anchor. Absent after deserialization.
    anchors: HashMap<String, Anchor>,
}

impl MetricsResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value for (metric, measured object).
    ///
    /// An empty measured key is a no-op: a calculator that could not
    /// determine a key contributes nothing. Posting the same pair twice
    /// overwrites the earlier fraction.
    pub fn post_value(&mut self, metric: &Metric, measured: &str, numerator: f64, denominator: f64) {
        if measured.is_empty() {
            return;
        }
        self.metrics
            .entry(metric.id().to_string())
            .or_insert_with(|| metric.clone());
        self.measured_objects.insert(measured.to_string());
        self.values
            .entry(metric.id().to_string())
            .or_default()
            .insert(measured.to_string(), Fraction::new(numerator, denominator));
    }

    /// Record a plain count, denominator 1.
    pub fn post_count(&mut self, metric: &Metric, measured: &str, value: f64) {
        self.post_value(metric, measured, value, 1.0);
    }

    /// Attach a model anchor to a measured object.
    pub fn set_anchor(&mut self, measured: &str, anchor: Anchor) {
        if measured.is_empty() {
            return;
        }
        self.anchors.insert(measured.to_string(), anchor);
    }

    /// The anchor recorded for a measured object, if any survives.
    pub fn anchor_for(&self, measured: &str) -> Option<&Anchor> {
        self.anchors.get(measured)
    }

    /// Metrics present in this result, in id order.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }

    pub fn has_metric(&self, metric_id: &str) -> bool {
        self.metrics.contains_key(metric_id)
    }

    /// Measured objects present, in key order.
    pub fn measured_objects(&self) -> impl Iterator<Item = &str> {
        self.measured_objects.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// The recorded fraction, or `None` when the pair was never posted.
    pub fn fraction_for(&self, metric_id: &str, measured: &str) -> Option<Fraction> {
        self.values.get(metric_id)?.get(measured).copied()
    }

    /// The evaluated value, or `None` when the pair was never posted —
    /// callers must distinguish "zero" from "never measured".
    pub fn value_for(&self, metric_id: &str, measured: &str) -> Option<f64> {
        self.fraction_for(metric_id, measured).map(|f| f.value())
    }

    /// All recorded (measured object, fraction) pairs for a metric.
    pub fn values_for(&self, metric_id: &str) -> impl Iterator<Item = (&str, Fraction)> {
        self.values
            .get(metric_id)
            .into_iter()
            .flat_map(|by_object| by_object.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    /// Sum of all numerators. Only meaningful for Count metrics; `None`
    /// for other metric types and for metrics with no recorded values.
    pub fn total_for(&self, metric_id: &str) -> Option<f64> {
        let metric = self.metrics.get(metric_id)?;
        if !metric.metric_type().has_total() {
            return None;
        }
        let by_object = self.values.get(metric_id)?;
        if by_object.is_empty() {
            return None;
        }
        Some(by_object.values().map(|f| f.numerator).sum())
    }

    /// Average across measured objects: total over object count for Count
    /// metrics, Σnumerator over Σdenominator for Ratio metrics. `None` for
    /// recursive metric types, whose nested double-counting makes a naive
    /// average misleading.
    pub fn average_for(&self, metric_id: &str) -> Option<f64> {
        let metric = self.metrics.get(metric_id)?;
        if !metric.metric_type().has_average() {
            return None;
        }
        let by_object = self.values.get(metric_id)?;
        if by_object.is_empty() {
            return None;
        }
        match metric.metric_type() {
            MetricType::Count => {
                let total: f64 = by_object.values().map(|f| f.numerator).sum();
                Some(total / by_object.len() as f64)
            }
            MetricType::Ratio => {
                let numerator: f64 = by_object.values().map(|f| f.numerator).sum();
                let denominator: f64 = by_object.values().map(|f| f.denominator).sum();
                if denominator == 0.0 {
                    None
                } else {
                    Some(numerator / denominator)
                }
            }
            MetricType::RecursiveCount | MetricType::RecursiveRatio => None,
        }
    }

    /// Smallest evaluated value across measured objects; defined for every
    /// metric type.
    pub fn minimum_for(&self, metric_id: &str) -> Option<f64> {
        self.values
            .get(metric_id)?
            .values()
            .map(Fraction::value)
            .min_by(f64::total_cmp)
    }

    /// Largest evaluated value across measured objects.
    pub fn maximum_for(&self, metric_id: &str) -> Option<f64> {
        self.values
            .get(metric_id)?
            .values()
            .map(Fraction::value)
            .max_by(f64::total_cmp)
    }

    /// Whether any recorded value breaches an enabled threshold of the
    /// given profile.
    pub fn has_warnings(&self, profile: &Profile) -> bool {
        self.metrics.keys().any(|metric_id| {
            self.breaching_objects(profile, metric_id)
                .next()
                .is_some()
        })
    }

    /// A copy containing only measured objects that breached at least one
    /// enabled threshold, with every surviving object's values — for every
    /// metric, not only the breaching one — and its anchor preserved.
    pub fn filter_rows_without_warnings(&self, profile: &Profile) -> MetricsResult {
        let mut breached: BTreeSet<String> = BTreeSet::new();
        for metric_id in self.metrics.keys() {
            breached.extend(
                self.breaching_objects(profile, metric_id)
                    .map(str::to_string),
            );
        }

        // The surviving rows keep their original fractions; re-posting the
        // evaluated ratio over 1 would silently change aggregate semantics
        // on the filtered result.
        MetricsResult {
            metrics: self.metrics.clone(),
            measured_objects: breached.clone(),
            values: self
                .values
                .iter()
                .map(|(metric_id, by_object)| {
                    let kept = by_object
                        .iter()
                        .filter(|(measured, _)| breached.contains(*measured))
                        .map(|(measured, fraction)| (measured.clone(), *fraction))
                        .collect();
                    (metric_id.clone(), kept)
                })
                .collect(),
            anchors: self
                .anchors
                .iter()
                .filter(|(measured, _)| breached.contains(*measured))
                .map(|(measured, anchor)| (measured.clone(), anchor.clone()))
                .collect(),
        }
    }

    /// Measured objects whose value for the given metric breaches an
    /// enabled threshold.
    fn breaching_objects<'a>(
        &'a self,
        profile: &'a Profile,
        metric_id: &str,
    ) -> impl Iterator<Item = &'a str> {
        let instance = profile.instance_for(metric_id);
        // A metric present in results but missing from the profile means
        // the profile and catalog have desynchronized, which no user input
        // can cause.
        debug_assert!(
            instance.is_some(),
            "metric '{metric_id}' has results but no profile instance"
        );
        if instance.is_none() {
            debug!("metric '{}' missing from profile '{}'", metric_id, profile.name);
        }

        let instance = instance.filter(|i| i.enabled && i.has_thresholds());
        self.values
            .get(metric_id)
            .into_iter()
            .flat_map(|by_object| by_object.iter())
            .filter(move |(_, fraction)| {
                instance.is_some_and(|i| i.breached_by(fraction.value()))
            })
            .map(|(measured, _)| measured.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{Calculator, VisitEvent};
    use crate::context::RunContext;
    use crate::metric::{MetricCategory, MetricType};
    use crate::profile::MetricInstance;

    #[derive(Default)]
    struct NullCalculator;

    impl Calculator for NullCalculator {
        fn visit(&mut self, _event: &VisitEvent<'_>, _ctx: &mut RunContext<'_, '_>) {}
    }

    fn metric(id: &str, metric_type: MetricType) -> Metric {
        Metric::new(
            id,
            MetricCategory::Class,
            metric_type,
            "T",
            "Test metric",
            || Box::new(NullCalculator),
        )
    }

    #[test]
    fn test_total_is_sum_of_posted_numerators() {
        let m = metric("count", MetricType::Count);
        let mut result = MetricsResult::new();
        result.post_count(&m, "A", 3.0);
        result.post_count(&m, "B", 4.0);
        result.post_count(&m, "C", 0.0);
        assert_eq!(result.total_for("count"), Some(7.0));
        assert_eq!(result.average_for("count"), Some(7.0 / 3.0));
    }

    #[test]
    fn test_total_not_applicable_for_non_count_types() {
        for metric_type in [
            MetricType::Ratio,
            MetricType::RecursiveCount,
            MetricType::RecursiveRatio,
        ] {
            let m = metric("m", metric_type);
            let mut result = MetricsResult::new();
            result.post_value(&m, "A", 1.0, 2.0);
            assert_eq!(result.total_for("m"), None);
        }
    }

    #[test]
    fn test_average_undefined_for_recursive_types() {
        let m = metric("m", MetricType::RecursiveCount);
        let mut result = MetricsResult::new();
        result.post_count(&m, "A", 5.0);
        assert_eq!(result.average_for("m"), None);
        // But extrema stay defined for every type.
        assert_eq!(result.minimum_for("m"), Some(5.0));
        assert_eq!(result.maximum_for("m"), Some(5.0));
    }

    #[test]
    fn test_ratio_average_weights_by_denominator() {
        let m = metric("ratio", MetricType::Ratio);
        let mut result = MetricsResult::new();
        result.post_value(&m, "A", 1.0, 2.0);
        result.post_value(&m, "B", 3.0, 6.0);
        assert_eq!(result.average_for("ratio"), Some(0.5));
    }

    #[test]
    fn test_repost_overwrites() {
        let m = metric("count", MetricType::Count);
        let mut result = MetricsResult::new();
        result.post_count(&m, "A", 3.0);
        result.post_count(&m, "A", 9.0);
        assert_eq!(result.value_for("count", "A"), Some(9.0));
        assert_eq!(result.total_for("count"), Some(9.0));
    }

    #[test]
    fn test_absent_is_distinct_from_zero() {
        let m = metric("count", MetricType::Count);
        let mut result = MetricsResult::new();
        result.post_count(&m, "A", 0.0);
        assert_eq!(result.value_for("count", "A"), Some(0.0));
        assert_eq!(result.value_for("count", "B"), None);
    }

    #[test]
    fn test_empty_measured_key_is_ignored() {
        let m = metric("count", MetricType::Count);
        let mut result = MetricsResult::new();
        result.post_count(&m, "", 3.0);
        assert!(result.is_empty());
        assert_eq!(result.measured_objects().count(), 0);
    }

    fn thresholded_profile(metric: &Metric, upper: f64) -> Profile {
        let mut profile = Profile::new("test");
        let mut instance = MetricInstance::new(metric.clone());
        instance.upper_threshold = upper;
        instance.upper_enabled = true;
        profile.add_instance(instance);
        profile
    }

    #[test]
    fn test_warning_filter_keeps_whole_surviving_row() {
        let m = metric("m", MetricType::Count);
        let other = metric("other", MetricType::Count);
        let mut result = MetricsResult::new();
        result.post_count(&m, "A", 5.0);
        result.post_count(&m, "B", 15.0);
        result.post_count(&other, "A", 1.0);
        result.post_count(&other, "B", 2.0);

        let mut profile = thresholded_profile(&m, 10.0);
        profile.add_instance(MetricInstance::new(other.clone()));

        assert!(result.has_warnings(&profile));
        let filtered = result.filter_rows_without_warnings(&profile);
        let objects: Vec<_> = filtered.measured_objects().collect();
        assert_eq!(objects, vec!["B"]);
        // Every metric's value for the surviving row is preserved.
        assert_eq!(filtered.value_for("m", "B"), Some(15.0));
        assert_eq!(filtered.value_for("other", "B"), Some(2.0));
        assert_eq!(filtered.value_for("m", "A"), None);
    }

    #[test]
    fn test_filter_preserves_original_fractions() {
        let m = metric("ratio", MetricType::Ratio);
        let mut result = MetricsResult::new();
        result.post_value(&m, "A", 9.0, 12.0);

        let profile = thresholded_profile(&m, 0.5);
        let filtered = result.filter_rows_without_warnings(&profile);
        assert_eq!(
            filtered.fraction_for("ratio", "A"),
            Some(Fraction::new(9.0, 12.0))
        );
    }

    #[test]
    fn test_no_warnings_without_enabled_thresholds() {
        let m = metric("m", MetricType::Count);
        let mut result = MetricsResult::new();
        result.post_count(&m, "A", 1e6);

        let mut profile = Profile::new("lax");
        profile.add_instance(MetricInstance::new(m.clone()));
        assert!(!result.has_warnings(&profile));
        assert!(
            result
                .filter_rows_without_warnings(&profile)
                .measured_objects()
                .count()
                == 0
        );
    }
}
