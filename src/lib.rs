//! # codemetrics - Code Metrics Calculation Core
//!
//! A framework for computing structural, complexity, coupling and cohesion
//! metrics over an object-oriented codebase and aggregating them into
//! browsable, comparable, persistable result sets.
//!
//! ## Overview
//!
//! The crate does not parse source code. A host provider builds a
//! [`ProgramModel`] from its own syntax and symbol infrastructure; an
//! [`ExecutionContext`] then walks that model exactly once per run,
//! dispatching every enabled metric's [`Calculator`] over a single stream
//! of enter/leave events. Calculators post `(metric, measured object)`
//! values into a [`MetricsRun`], which can be aggregated, checked against
//! profile thresholds, diffed against an earlier run, or persisted as a
//! snapshot and reloaded later.
//!
//! ```
//! use codemetrics::{
//!     ExecutionContext, MetricCategory, ModuleUnit, PackageUnit, ProgramModel,
//!     SourceFile, TypeDef, TypeKind, default_profile,
//! };
//!
//! // The host provider builds the program model; here, a tiny one by hand.
//! let mut file = SourceFile::new("Order.java", "java");
//! file.types = vec![TypeDef::new("shop.Order", TypeKind::Class)];
//! let mut package = PackageUnit::new("shop");
//! package.files = vec![file];
//! let mut module = ModuleUnit::new("app");
//! module.packages = vec![package];
//! let model = ProgramModel::new("demo", vec![module]);
//!
//! let profile = default_profile();
//! let run = ExecutionContext::new(&model, &profile)
//!     .unwrap()
//!     .execute()
//!     .completed()
//!     .expect("not cancelled");
//!
//! assert_eq!(
//!     run.results_for(MetricCategory::Class)
//!         .value_for("methods_per_class", "shop.Order"),
//!     Some(0.0)
//! );
//! ```
//!
//! ## Calculator styles
//!
//! 1. **Immediate** - post a value as the measured unit is left, keeping
//!    per-unit state in a [`FrameStack`] so nested units of the same kind
//!    never contaminate each other
//! 2. **Deferred** - accumulate into a [`BucketedCount`] during the
//!    traversal and post everything from `end`, for measurements that need
//!    whole-codebase information
//! 3. **Graph** - read the run-scoped dependency graph shared through the
//!    execution context's cache instead of accumulating anything
//!
//! Interactive UI, exporters, and process orchestration live outside this
//! crate; it exposes the run, diff, warning-filter and snapshot API those
//! layers consume.

pub mod buckets;
pub mod calculator;
pub mod calculators;
pub mod context;
pub mod depgraph;
pub mod metric;
pub mod model;
pub mod profile;
pub mod results;
pub mod run;
pub mod snapshot;

pub use buckets::BucketedCount;
pub use calculator::{Calculator, FrameStack, VisitEvent};
pub use calculators::{BuiltinMetrics, builtin_metrics, default_profile};
pub use context::{
    CancelFlag, ExecutionContext, FieldUsageMap, NullProgress, ProgressSink, RunContext,
    RunOutcome, TypeFieldUsage,
};
pub use depgraph::{DependencyGraph, DependencyPolicy, EdgeMap};
pub use metric::{CalculatorFactory, Metric, MetricCategory, MetricRepository, MetricType};
pub use model::{
    Anchor, Call, Field, Method, ModuleUnit, PROJECT_KEY, PackageUnit, ProgramModel, SourceFile,
    Statement, StatementKind, TypeDef, TypeForm, TypeKind, UnitRef,
};
pub use profile::{AnalysisSettings, CompiledScope, MetricInstance, Profile, ProfileError};
pub use results::{Fraction, MetricsResult};
pub use run::{DiffEntry, DiffState, MetricsRun, RunDiff};
pub use snapshot::SnapshotError;
