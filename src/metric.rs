//! Metric identity
//!
//! A [`Metric`] is the immutable identity of one measurement: what it is
//! called, which granularity it measures at, how its numbers aggregate, and
//! how to produce a fresh calculator for a run. User-configurable state
//! (enabled flag, thresholds) lives on [`crate::profile::MetricInstance`],
//! never here.

use std::fmt;

use crate::calculator::Calculator;

/// Granularity level a metric is recorded at.
///
/// Every run owns one result per category; the order here is the storage
/// and serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricCategory {
    Project,
    Module,
    Package,
    FileType,
    Class,
    Interface,
    Method,
}

impl MetricCategory {
    /// All categories, in storage order.
    pub const ALL: [MetricCategory; 7] = [
        MetricCategory::Project,
        MetricCategory::Module,
        MetricCategory::Package,
        MetricCategory::FileType,
        MetricCategory::Class,
        MetricCategory::Interface,
        MetricCategory::Method,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricCategory::Project => write!(f, "Project"),
            MetricCategory::Module => write!(f, "Module"),
            MetricCategory::Package => write!(f, "Package"),
            MetricCategory::FileType => write!(f, "File type"),
            MetricCategory::Class => write!(f, "Class"),
            MetricCategory::Interface => write!(f, "Interface"),
            MetricCategory::Method => write!(f, "Method"),
        }
    }
}

/// Numeric behavior of a metric's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Plain counts; totals and averages are meaningful.
    Count,
    /// Numerator/denominator pairs; averages are meaningful, totals are not.
    Ratio,
    /// Counts where nested entities are counted into every enclosing one.
    /// Totals and averages would double-count, so neither is offered.
    RecursiveCount,
    /// Ratios with the same double-counting caveat.
    RecursiveRatio,
}

impl MetricType {
    /// Whether summing values across measured objects is meaningful.
    pub fn has_total(self) -> bool {
        matches!(self, MetricType::Count)
    }

    /// Whether an average across measured objects is meaningful.
    pub fn has_average(self) -> bool {
        matches!(self, MetricType::Count | MetricType::Ratio)
    }
}

/// Factory producing a fresh calculator for one run.
pub type CalculatorFactory = fn() -> Box<dyn Calculator>;

/// Immutable identity of a metric.
///
/// The id doubles as the portable identity written to snapshots; it must be
/// stable across releases for old snapshots to stay readable.
#[derive(Debug, Clone)]
pub struct Metric {
    id: String,
    category: MetricCategory,
    metric_type: MetricType,
    abbreviation: String,
    display_name: String,
    factory: CalculatorFactory,
}

impl Metric {
    pub fn new(
        id: impl Into<String>,
        category: MetricCategory,
        metric_type: MetricType,
        abbreviation: impl Into<String>,
        display_name: impl Into<String>,
        factory: CalculatorFactory,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            metric_type,
            abbreviation: abbreviation.into(),
            display_name: display_name.into(),
            factory,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> MetricCategory {
        self.category
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub fn abbreviation(&self) -> &str {
        &self.abbreviation
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// A fresh calculator for one run.
    pub fn new_calculator(&self) -> Box<dyn Calculator> {
        (self.factory)()
    }
}

/// Lookup service mapping portable metric identities back to [`Metric`]s.
///
/// Snapshot reads and profile loads resolve identity strings through this;
/// the built-in catalog provides the default implementation.
pub trait MetricRepository {
    fn metric_for_id(&self, id: &str) -> Option<Metric>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{Calculator, VisitEvent};
    use crate::context::RunContext;

    #[derive(Default)]
    struct NullCalculator;

    impl Calculator for NullCalculator {
        fn visit(&mut self, _event: &VisitEvent<'_>, _ctx: &mut RunContext<'_, '_>) {}
    }

    fn null_factory() -> Box<dyn Calculator> {
        Box::new(NullCalculator)
    }

    #[test]
    fn test_category_order_is_stable() {
        assert_eq!(MetricCategory::Project.index(), 0);
        assert_eq!(MetricCategory::Method.index(), 6);
        for (i, category) in MetricCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_aggregate_applicability() {
        assert!(MetricType::Count.has_total());
        assert!(!MetricType::Ratio.has_total());
        assert!(!MetricType::RecursiveCount.has_total());
        assert!(MetricType::Ratio.has_average());
        assert!(!MetricType::RecursiveRatio.has_average());
    }

    #[test]
    fn test_metric_identity() {
        let metric = Metric::new(
            "statement_count",
            MetricCategory::Method,
            MetricType::Count,
            "STMT",
            "Statements per method",
            null_factory,
        );
        assert_eq!(metric.id(), "statement_count");
        assert_eq!(metric.category(), MetricCategory::Method);
        assert_eq!(metric.metric_type(), MetricType::Count);
        assert_eq!(metric.abbreviation(), "STMT");
    }
}
