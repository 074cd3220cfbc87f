//! Run execution
//!
//! One [`ExecutionContext`] drives exactly one analysis run: a single
//! depth-first traversal of the program model during which every enabled
//! metric's calculator receives every visit event. Expensive derived
//! structures (the dependency graph, the field-usage map) live in a typed,
//! run-scoped cache so calculators that need the same structure never
//! recompute it.
//!
//! Cancellation is cooperative: the traversal checks the flag once per
//! program unit and deferred calculators check it inside their posting
//! loops, so cancellation latency stays bounded regardless of codebase
//! size. A cancelled run discards its partial results; it is a normal
//! outcome, not an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::calculator::{Calculator, VisitEvent};
use crate::depgraph::{DependencyGraph, DependencyPolicy, EdgeMap};
use crate::metric::{Metric, MetricCategory};
use crate::model::{Anchor, Method, ModuleUnit, ProgramModel, Statement, TypeDef};
use crate::profile::{CompiledScope, Profile, ProfileError};
use crate::run::MetricsRun;

/// Cloneable cooperative-cancellation handle.
///
/// The handle can be cancelled from any thread; the run polls it at
/// bounded intervals and unwinds cleanly.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receives traversal progress as visited units over the total known up
/// front.
pub trait ProgressSink {
    fn advance(&mut self, visited: usize, total: usize);
}

/// Discards progress reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn advance(&mut self, _visited: usize, _total: usize) {}
}

/// Terminal outcome of a run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(MetricsRun),
    /// The run was cancelled; partial results were discarded.
    Cancelled,
}

impl RunOutcome {
    pub fn completed(self) -> Option<MetricsRun> {
        match self {
            RunOutcome::Completed(run) => Some(run),
            RunOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Internal unwind marker for a cancelled traversal.
pub(crate) struct Cancelled;

/// Method-to-field usage per type, shared by cohesion calculators.
#[derive(Debug)]
pub struct FieldUsageMap {
    per_type: HashMap<String, TypeFieldUsage>,
}

/// Field usage inside one type.
#[derive(Debug, Clone, Default)]
pub struct TypeFieldUsage {
    /// Number of methods declared by the type.
    pub method_count: usize,
    /// field name → number of methods touching it.
    pub field_methods: HashMap<String, usize>,
}

impl FieldUsageMap {
    fn build(model: &ProgramModel) -> Self {
        let mut per_type = HashMap::new();
        for name in model.named_types() {
            let Some(ty) = model.type_def(name) else {
                continue;
            };
            let mut usage = TypeFieldUsage {
                method_count: ty.methods.len(),
                field_methods: HashMap::new(),
            };
            for method in &ty.methods {
                let mut touched: Vec<&str> = method
                    .field_touches
                    .iter()
                    .map(String::as_str)
                    .filter(|touched| ty.fields.iter().any(|f| f.name == *touched))
                    .collect();
                touched.sort_unstable();
                touched.dedup();
                for field in touched {
                    *usage.field_methods.entry(field.to_string()).or_insert(0) += 1;
                }
            }
            per_type.insert(name.clone(), usage);
        }
        Self { per_type }
    }

    pub fn usage_for(&self, type_name: &str) -> Option<&TypeFieldUsage> {
        self.per_type.get(type_name)
    }
}

/// Run-scoped cache of derived structures shared across calculators.
///
/// Each entry is lazily initialized on first access and dies with the run.
#[derive(Debug, Default)]
struct SharedCaches {
    dependency_graph: Option<DependencyGraph>,
    field_usage: Option<FieldUsageMap>,
}

impl SharedCaches {
    fn dependency_graph_mut(&mut self, policy: &DependencyPolicy) -> &mut DependencyGraph {
        self.dependency_graph
            .get_or_insert_with(|| DependencyGraph::new(policy.clone()))
    }

    fn field_usage(&mut self, model: &ProgramModel) -> &FieldUsageMap {
        self.field_usage
            .get_or_insert_with(|| FieldUsageMap::build(model))
    }
}

/// Everything a calculator may touch during a run.
pub struct RunContext<'r, 'm> {
    model: &'m ProgramModel,
    run: &'r mut MetricsRun,
    caches: &'r mut SharedCaches,
    policy: &'r DependencyPolicy,
    cancel: &'r CancelFlag,
    current_anchor: Option<Anchor>,
}

impl<'r, 'm> RunContext<'r, 'm> {
    pub fn model(&self) -> &'m ProgramModel {
        self.model
    }

    /// Record a value, attaching the current traversal position as the
    /// measured object's anchor when none is recorded yet.
    pub fn post_value(&mut self, metric: &Metric, measured: &str, numerator: f64, denominator: f64) {
        let result = self.run.results_for_mut(metric.category());
        result.post_value(metric, measured, numerator, denominator);
        if !measured.is_empty() && result.anchor_for(measured).is_none() {
            if let Some(anchor) = &self.current_anchor {
                result.set_anchor(measured, anchor.clone());
            }
        }
    }

    /// Record a plain count, denominator 1.
    pub fn post_count(&mut self, metric: &Metric, measured: &str, value: f64) {
        self.post_value(metric, measured, value, 1.0);
    }

    /// Remember the current traversal position as the anchor for a
    /// measured object. Deferred calculators call this during `visit` so
    /// their `end`-time posts still navigate.
    pub fn record_anchor(&mut self, category: MetricCategory, measured: &str) {
        if let Some(anchor) = &self.current_anchor {
            let result = self.run.results_for_mut(category);
            if result.anchor_for(measured).is_none() {
                result.set_anchor(measured, anchor.clone());
            }
        }
    }

    /// Types the given type depends on, from the shared dependency graph.
    pub fn class_dependencies(&mut self, type_name: &str) -> &EdgeMap {
        self.caches
            .dependency_graph_mut(self.policy)
            .dependencies_of(self.model, type_name)
    }

    /// Types depending on the given type.
    pub fn class_dependents(&mut self, type_name: &str) -> &EdgeMap {
        self.caches
            .dependency_graph_mut(self.policy)
            .dependents_of(self.model, type_name)
    }

    /// Packages the given package depends on.
    pub fn package_dependencies(&mut self, package: &str) -> &EdgeMap {
        self.caches
            .dependency_graph_mut(self.policy)
            .package_dependencies_of(self.model, package)
    }

    /// Packages depending on the given package.
    pub fn package_dependents(&mut self, package: &str) -> &EdgeMap {
        self.caches
            .dependency_graph_mut(self.policy)
            .package_dependents_of(self.model, package)
    }

    /// The shared method-to-field usage map.
    pub fn field_usage(&mut self) -> &FieldUsageMap {
        self.caches.field_usage(self.model)
    }

    /// Whether cancellation has been requested. Long loops inside
    /// calculators should poll this and bail out early.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn set_current_anchor(&mut self, anchor: Option<Anchor>) {
        self.current_anchor = anchor;
    }
}

/// Drives one analysis run over one program model.
///
/// A context instance runs once; `execute` consumes it.
pub struct ExecutionContext<'a> {
    model: &'a ProgramModel,
    profile: &'a Profile,
    scope: CompiledScope,
    cancel: CancelFlag,
    progress: Box<dyn ProgressSink + 'a>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(model: &'a ProgramModel, profile: &'a Profile) -> Result<Self, ProfileError> {
        Ok(Self {
            model,
            profile,
            scope: profile.compile_scope()?,
            cancel: CancelFlag::new(),
            progress: Box::new(NullProgress),
        })
    }

    /// A handle for requesting cancellation from outside the run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink + 'a>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the traversal and every enabled calculator over it.
    pub fn execute(mut self) -> RunOutcome {
        info!(
            "analyzing scope '{}' with profile '{}'",
            self.model.name(),
            self.profile.name
        );

        let mut run = MetricsRun::new(self.profile.name.clone(), self.model.name());
        let mut calculators: Vec<(Metric, Box<dyn Calculator>)> = self
            .profile
            .enabled_instances()
            .map(|instance| (instance.metric().clone(), instance.metric().new_calculator()))
            .collect();
        debug!(
            "{} calculators over {} program units",
            calculators.len(),
            self.model.unit_count()
        );

        let mut caches = SharedCaches::default();
        let policy = self.profile.dependency_policy.clone();
        let cancel = self.cancel.clone();
        let mut ctx = RunContext {
            model: self.model,
            run: &mut run,
            caches: &mut caches,
            policy: &policy,
            cancel: &cancel,
            current_anchor: None,
        };

        for (metric, calculator) in calculators.iter_mut() {
            calculator.begin(metric, &mut ctx);
        }

        let total = self.model.unit_count();
        let mut walker = Walker {
            calculators: &mut calculators,
            scope: &self.scope,
            progress: self.progress.as_mut(),
            visited: 0,
            total,
            path: Vec::new(),
        };
        if walker.walk(&mut ctx, self.model).is_err() {
            info!("analysis run cancelled, discarding partial results");
            return RunOutcome::Cancelled;
        }

        ctx.set_current_anchor(None);
        for (_, calculator) in calculators.iter_mut() {
            calculator.end(&mut ctx);
            if cancel.is_cancelled() {
                info!("analysis run cancelled, discarding partial results");
                return RunOutcome::Cancelled;
            }
        }

        RunOutcome::Completed(run)
    }
}

/// The single depth-first traversal, dispatching balanced enter/leave
/// events to every calculator and maintaining the anchor path.
struct Walker<'w, 'p> {
    calculators: &'w mut [(Metric, Box<dyn Calculator>)],
    scope: &'w CompiledScope,
    progress: &'w mut (dyn ProgressSink + 'p),
    visited: usize,
    total: usize,
    path: Vec<u32>,
}

impl Walker<'_, '_> {
    fn dispatch<'m>(&mut self, ctx: &mut RunContext<'_, 'm>, event: VisitEvent<'m>) {
        for (_, calculator) in self.calculators.iter_mut() {
            calculator.visit(&event, ctx);
        }
    }

    fn anchor_here(&self, ctx: &mut RunContext<'_, '_>) {
        let anchor = if self.path.is_empty() {
            None
        } else {
            Some(Anchor::new(&self.path))
        };
        ctx.set_current_anchor(anchor);
    }

    /// Per-unit cancellation check and progress tick.
    fn tick(&mut self, ctx: &RunContext<'_, '_>) -> Result<(), Cancelled> {
        if ctx.is_cancelled() {
            return Err(Cancelled);
        }
        self.visited += 1;
        self.progress.advance(self.visited, self.total);
        Ok(())
    }

    fn walk<'m>(
        &mut self,
        ctx: &mut RunContext<'_, 'm>,
        model: &'m ProgramModel,
    ) -> Result<(), Cancelled> {
        for (index, module) in model.modules().iter().enumerate() {
            self.walk_module(ctx, index, module)?;
        }
        Ok(())
    }

    fn walk_module<'m>(
        &mut self,
        ctx: &mut RunContext<'_, 'm>,
        index: usize,
        module: &'m ModuleUnit,
    ) -> Result<(), Cancelled> {
        self.path.push(index as u32);
        self.anchor_here(ctx);
        self.tick(ctx)?;
        self.dispatch(ctx, VisitEvent::EnterModule(module));

        for (package_index, package) in module.packages.iter().enumerate() {
            if self.scope.excludes(&package.name) {
                continue;
            }
            self.path.push(package_index as u32);
            self.anchor_here(ctx);
            self.tick(ctx)?;
            self.dispatch(ctx, VisitEvent::EnterPackage(package));

            for (file_index, file) in package.files.iter().enumerate() {
                if self.scope.excludes(&file.name) {
                    continue;
                }
                self.path.push(file_index as u32);
                self.anchor_here(ctx);
                self.tick(ctx)?;
                self.dispatch(ctx, VisitEvent::EnterFile(file));

                for (type_index, ty) in file.types.iter().enumerate() {
                    if self.scope.excludes(&ty.name) {
                        continue;
                    }
                    self.walk_type(ctx, type_index, ty)?;
                }

                self.anchor_here(ctx);
                self.dispatch(ctx, VisitEvent::LeaveFile(file));
                self.path.pop();
            }

            self.anchor_here(ctx);
            self.dispatch(ctx, VisitEvent::LeavePackage(package));
            self.path.pop();
        }

        self.anchor_here(ctx);
        self.dispatch(ctx, VisitEvent::LeaveModule(module));
        self.path.pop();
        Ok(())
    }

    fn walk_type<'m>(
        &mut self,
        ctx: &mut RunContext<'_, 'm>,
        segment: usize,
        ty: &'m TypeDef,
    ) -> Result<(), Cancelled> {
        self.path.push(segment as u32);
        self.anchor_here(ctx);
        self.tick(ctx)?;
        self.dispatch(ctx, VisitEvent::EnterType(ty));

        for (nested_index, nested) in ty.nested.iter().enumerate() {
            if self.scope.excludes(&nested.name) {
                continue;
            }
            self.walk_type(ctx, nested_index, nested)?;
        }
        for (method_index, method) in ty.methods.iter().enumerate() {
            self.walk_method(ctx, ty.nested.len() + method_index, method)?;
        }

        self.anchor_here(ctx);
        self.dispatch(ctx, VisitEvent::LeaveType(ty));
        self.path.pop();
        Ok(())
    }

    fn walk_method<'m>(
        &mut self,
        ctx: &mut RunContext<'_, 'm>,
        segment: usize,
        method: &'m Method,
    ) -> Result<(), Cancelled> {
        self.path.push(segment as u32);
        self.anchor_here(ctx);
        self.tick(ctx)?;
        self.dispatch(ctx, VisitEvent::EnterMethod(method));

        if let Some(body) = &method.body {
            // Anchor segments for anonymous classes index into the
            // method's flattened anonymous-type list, so the counter spans
            // the whole body.
            let mut anonymous_index = 0usize;
            for statement in body {
                self.walk_statement(ctx, statement, &mut anonymous_index)?;
            }
        }

        self.anchor_here(ctx);
        self.dispatch(ctx, VisitEvent::LeaveMethod(method));
        self.path.pop();
        Ok(())
    }

    fn walk_statement<'m>(
        &mut self,
        ctx: &mut RunContext<'_, 'm>,
        statement: &'m Statement,
        anonymous_index: &mut usize,
    ) -> Result<(), Cancelled> {
        self.dispatch(ctx, VisitEvent::EnterStatement(statement));

        for anonymous in &statement.anonymous {
            let segment = *anonymous_index;
            *anonymous_index += 1;
            if self.scope.excludes(&anonymous.name) {
                continue;
            }
            self.walk_type(ctx, segment, anonymous)?;
        }
        for child in &statement.children {
            self.walk_statement(ctx, child, anonymous_index)?;
        }

        self.dispatch(ctx, VisitEvent::LeaveStatement(statement));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::post_with;
    use crate::metric::MetricType;
    use crate::model::{PackageUnit, SourceFile, TypeKind};
    use crate::profile::MetricInstance;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Immediate calculator counting types per package, for wiring tests.
    #[derive(Default)]
    struct TypesPerPackage {
        metric: Option<Metric>,
        current: Option<(String, u32)>,
    }

    impl Calculator for TypesPerPackage {
        fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
            self.metric = Some(metric.clone());
        }

        fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
            match *event {
                VisitEvent::EnterPackage(package) => {
                    self.current = Some((package.name.clone(), 0));
                }
                VisitEvent::EnterType(_) => {
                    if let Some((_, count)) = &mut self.current {
                        *count += 1;
                    }
                }
                VisitEvent::LeavePackage(_) => {
                    if let Some((name, count)) = self.current.take() {
                        post_with(ctx, &self.metric, &name, count as f64, 1.0);
                    }
                }
                _ => {}
            }
        }
    }

    fn types_per_package_metric() -> Metric {
        Metric::new(
            "types_per_package",
            MetricCategory::Package,
            MetricType::Count,
            "TPP",
            "Types per package",
            || Box::new(TypesPerPackage::default()),
        )
    }

    fn two_package_model() -> ProgramModel {
        let mut core_file = SourceFile::new("Core.java", "java");
        core_file.types = vec![
            TypeDef::new("core.A", TypeKind::Class),
            TypeDef::new("core.B", TypeKind::Class),
        ];
        let mut core = PackageUnit::new("core");
        core.files = vec![core_file];

        let mut util_file = SourceFile::new("Util.java", "java");
        util_file.types = vec![TypeDef::new("util.C", TypeKind::Class)];
        let mut util = PackageUnit::new("util");
        util.files = vec![util_file];

        let mut module = ModuleUnit::new("app");
        module.packages = vec![core, util];
        ProgramModel::new("demo", vec![module])
    }

    fn profile_with(metric: Metric) -> Profile {
        let mut profile = Profile::new("test");
        profile.add_instance(MetricInstance::new(metric));
        profile
    }

    #[test]
    fn test_execute_produces_a_completed_run() {
        let model = two_package_model();
        let profile = profile_with(types_per_package_metric());
        let context = ExecutionContext::new(&model, &profile).unwrap();

        let run = context.execute().completed().expect("run completes");
        let packages = run.results_for(MetricCategory::Package);
        assert_eq!(packages.value_for("types_per_package", "core"), Some(2.0));
        assert_eq!(packages.value_for("types_per_package", "util"), Some(1.0));
        assert_eq!(run.profile_name(), "test");
        assert_eq!(run.scope(), "demo");
    }

    #[test]
    fn test_posted_values_carry_anchors() {
        let model = two_package_model();
        let profile = profile_with(types_per_package_metric());
        let run = ExecutionContext::new(&model, &profile)
            .unwrap()
            .execute()
            .completed()
            .expect("run completes");

        let anchor = run
            .results_for(MetricCategory::Package)
            .anchor_for("core")
            .expect("anchor recorded");
        match model.resolve(anchor) {
            Some(crate::model::UnitRef::Package(p)) => assert_eq!(p.name, "core"),
            other => panic!("expected package anchor, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_metrics_do_not_run() {
        let model = two_package_model();
        let mut profile = profile_with(types_per_package_metric());
        profile
            .instance_for_mut("types_per_package")
            .unwrap()
            .enabled = false;

        let run = ExecutionContext::new(&model, &profile)
            .unwrap()
            .execute()
            .completed()
            .expect("run completes");
        assert!(run.is_empty());
    }

    #[test]
    fn test_excluded_packages_are_skipped_whole() {
        let model = two_package_model();
        let mut profile = profile_with(types_per_package_metric());
        profile.analysis.exclude = vec!["util".to_string()];

        let run = ExecutionContext::new(&model, &profile)
            .unwrap()
            .execute()
            .completed()
            .expect("run completes");
        let packages = run.results_for(MetricCategory::Package);
        assert_eq!(packages.value_for("types_per_package", "core"), Some(2.0));
        assert_eq!(packages.value_for("types_per_package", "util"), None);
    }

    #[test]
    fn test_progress_reaches_total() {
        struct Recording(Rc<RefCell<Vec<(usize, usize)>>>);

        impl ProgressSink for Recording {
            fn advance(&mut self, visited: usize, total: usize) {
                self.0.borrow_mut().push((visited, total));
            }
        }

        let model = two_package_model();
        let profile = profile_with(types_per_package_metric());
        let reports = Rc::new(RefCell::new(Vec::new()));
        let outcome = ExecutionContext::new(&model, &profile)
            .unwrap()
            .with_progress(Box::new(Recording(Rc::clone(&reports))))
            .execute();
        assert!(!outcome.is_cancelled());

        let reports = reports.borrow();
        let total = model.unit_count();
        assert_eq!(reports.first(), Some(&(1, total)));
        assert_eq!(reports.last(), Some(&(total, total)));
    }

    #[test]
    fn test_cancellation_discards_partial_results() {
        /// Cancels the run as soon as the first unit has been visited.
        struct CancelEarly(CancelFlag);

        impl ProgressSink for CancelEarly {
            fn advance(&mut self, _visited: usize, _total: usize) {
                self.0.cancel();
            }
        }

        let model = two_package_model();
        let profile = profile_with(types_per_package_metric());
        let context = ExecutionContext::new(&model, &profile).unwrap();
        let flag = context.cancel_flag();
        let outcome = context
            .with_progress(Box::new(CancelEarly(flag)))
            .execute();

        assert!(outcome.is_cancelled());
        assert!(outcome.completed().is_none());
    }

    #[test]
    fn test_field_usage_map() {
        let ty = TypeDef {
            fields: vec![
                crate::model::Field::new("total", None),
                crate::model::Field::new("lines", None),
            ],
            methods: vec![
                Method {
                    field_touches: vec!["total".to_string(), "lines".to_string()],
                    ..Method::new("sum", "shop.Cart.sum()")
                },
                Method {
                    field_touches: vec!["total".to_string(), "total".to_string()],
                    ..Method::new("reset", "shop.Cart.reset()")
                },
                Method::new("noop", "shop.Cart.noop()"),
            ],
            ..TypeDef::new("shop.Cart", TypeKind::Class)
        };
        let mut file = SourceFile::new("Cart.java", "java");
        file.types = vec![ty];
        let mut package = PackageUnit::new("shop");
        package.files = vec![file];
        let mut module = ModuleUnit::new("app");
        module.packages = vec![package];
        let model = ProgramModel::new("demo", vec![module]);

        let usage = FieldUsageMap::build(&model);
        let cart = usage.usage_for("shop.Cart").expect("usage recorded");
        assert_eq!(cart.method_count, 3);
        // Duplicate touches inside one method count once.
        assert_eq!(cart.field_methods.get("total"), Some(&2));
        assert_eq!(cart.field_methods.get("lines"), Some(&1));
    }
}
