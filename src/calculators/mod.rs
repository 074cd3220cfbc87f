//! Built-in metric catalog
//!
//! A representative set of structural, complexity, coupling and cohesion
//! metrics, each a small instance of the calculator framework. The catalog
//! also provides the default [`MetricRepository`] used to resolve metric
//! identities when reading snapshots and profiles.

mod cohesion;
mod counts;
mod coupling;

use std::collections::HashMap;

use crate::metric::{Metric, MetricCategory, MetricRepository, MetricType};
use crate::profile::{MetricInstance, Profile};

pub use cohesion::LackOfCohesionCalculator;
pub use counts::{
    ClassCountCalculator, ClassesPerModuleCalculator, CyclomaticComplexityCalculator,
    LinesPerFileTypeCalculator, MethodCountCalculator, RecursiveStatementCountCalculator,
    StatementCountCalculator,
};
pub use coupling::{
    AbstractnessCalculator, AfferentCouplingCalculator, EfferentCouplingCalculator,
    FanInCalculator, InstabilityCalculator, MainSequenceDistanceCalculator,
};

pub fn class_count() -> Metric {
    Metric::new(
        "class_count",
        MetricCategory::Project,
        MetricType::Count,
        "nC",
        "Number of classes",
        || Box::new(ClassCountCalculator::default()),
    )
}

pub fn classes_per_module() -> Metric {
    Metric::new(
        "classes_per_module",
        MetricCategory::Module,
        MetricType::Count,
        "nCM",
        "Classes per module",
        || Box::new(ClassesPerModuleCalculator::default()),
    )
}

pub fn abstractness() -> Metric {
    Metric::new(
        "abstractness",
        MetricCategory::Package,
        MetricType::Ratio,
        "A",
        "Abstractness",
        || Box::new(AbstractnessCalculator::default()),
    )
}

pub fn instability() -> Metric {
    Metric::new(
        "instability",
        MetricCategory::Package,
        MetricType::Ratio,
        "I",
        "Instability",
        || Box::new(InstabilityCalculator::default()),
    )
}

pub fn main_sequence_distance() -> Metric {
    Metric::new(
        "main_sequence_distance",
        MetricCategory::Package,
        MetricType::Ratio,
        "D",
        "Distance from the main sequence",
        || Box::new(MainSequenceDistanceCalculator::default()),
    )
}

pub fn lines_per_file_type() -> Metric {
    Metric::new(
        "lines_per_file_type",
        MetricCategory::FileType,
        MetricType::Count,
        "LOC",
        "Lines of code per file type",
        || Box::new(LinesPerFileTypeCalculator::default()),
    )
}

pub fn methods_per_class() -> Metric {
    Metric::new(
        "methods_per_class",
        MetricCategory::Class,
        MetricType::Count,
        "nM",
        "Methods per class",
        || Box::new(MethodCountCalculator::for_classes()),
    )
}

pub fn statements_per_class() -> Metric {
    Metric::new(
        "statements_per_class",
        MetricCategory::Class,
        MetricType::RecursiveCount,
        "stmtC",
        "Statements per class",
        || Box::new(RecursiveStatementCountCalculator::default()),
    )
}

pub fn afferent_coupling() -> Metric {
    Metric::new(
        "afferent_coupling",
        MetricCategory::Class,
        MetricType::Count,
        "Ca",
        "Afferent coupling",
        || Box::new(AfferentCouplingCalculator::default()),
    )
}

pub fn efferent_coupling() -> Metric {
    Metric::new(
        "efferent_coupling",
        MetricCategory::Class,
        MetricType::Count,
        "Ce",
        "Efferent coupling",
        || Box::new(EfferentCouplingCalculator::default()),
    )
}

pub fn lack_of_cohesion() -> Metric {
    Metric::new(
        "lack_of_cohesion",
        MetricCategory::Class,
        MetricType::Ratio,
        "LCOM",
        "Lack of cohesion of methods",
        || Box::new(LackOfCohesionCalculator::default()),
    )
}

pub fn methods_per_interface() -> Metric {
    Metric::new(
        "methods_per_interface",
        MetricCategory::Interface,
        MetricType::Count,
        "nM",
        "Methods per interface",
        || Box::new(MethodCountCalculator::for_interfaces()),
    )
}

pub fn statements_per_method() -> Metric {
    Metric::new(
        "statements_per_method",
        MetricCategory::Method,
        MetricType::Count,
        "stmt",
        "Statements per method",
        || Box::new(StatementCountCalculator::default()),
    )
}

pub fn cyclomatic_complexity() -> Metric {
    Metric::new(
        "cyclomatic_complexity",
        MetricCategory::Method,
        MetricType::Count,
        "v(G)",
        "Cyclomatic complexity",
        || Box::new(CyclomaticComplexityCalculator::default()),
    )
}

pub fn fan_in() -> Metric {
    Metric::new(
        "fan_in",
        MetricCategory::Method,
        MetricType::Count,
        "FIN",
        "Fan-in",
        || Box::new(FanInCalculator::default()),
    )
}

/// Every built-in metric, in category order.
pub fn builtin_metrics() -> Vec<Metric> {
    vec![
        class_count(),
        classes_per_module(),
        abstractness(),
        instability(),
        main_sequence_distance(),
        lines_per_file_type(),
        methods_per_class(),
        statements_per_class(),
        afferent_coupling(),
        efferent_coupling(),
        lack_of_cohesion(),
        methods_per_interface(),
        statements_per_method(),
        cyclomatic_complexity(),
        fan_in(),
    ]
}

/// [`MetricRepository`] over the built-in catalog.
#[derive(Debug)]
pub struct BuiltinMetrics {
    by_id: HashMap<String, Metric>,
}

impl Default for BuiltinMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinMetrics {
    pub fn new() -> Self {
        Self {
            by_id: builtin_metrics()
                .into_iter()
                .map(|metric| (metric.id().to_string(), metric))
                .collect(),
        }
    }
}

impl MetricRepository for BuiltinMetrics {
    fn metric_for_id(&self, id: &str) -> Option<Metric> {
        self.by_id.get(id).cloned()
    }
}

/// A profile enabling the whole built-in catalog, thresholds off.
pub fn default_profile() -> Profile {
    let mut profile = Profile::new("default");
    for metric in builtin_metrics() {
        profile.add_instance(MetricInstance::new(metric));
    }
    profile
}
