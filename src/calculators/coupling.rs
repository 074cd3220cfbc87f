//! Coupling calculators
//!
//! The class-level calculators read the shared dependency graph directly;
//! the package-level ones combine the package rollups with abstractness to
//! place each package relative to the main sequence. Fan-in is the one
//! deferred calculator here: the number of call sites targeting a method
//! is only known once every unit has been visited.

use crate::buckets::BucketedCount;
use crate::calculator::{Calculator, VisitEvent, post_with};
use crate::context::RunContext;
use crate::metric::{Metric, MetricCategory};
use crate::model::{PackageUnit, TypeForm};

/// Number of types that depend on each named class.
#[derive(Debug, Default)]
pub struct AfferentCouplingCalculator {
    metric: Option<Metric>,
}

impl Calculator for AfferentCouplingCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterType(ty) = *event {
            if ty.is_class() && !ty.is_anonymous() {
                let dependents = ctx.class_dependents(&ty.name).len();
                post_with(ctx, &self.metric, &ty.name, dependents as f64, 1.0);
            }
        }
    }
}

/// Number of types each named class depends on.
#[derive(Debug, Default)]
pub struct EfferentCouplingCalculator {
    metric: Option<Metric>,
}

impl Calculator for EfferentCouplingCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterType(ty) = *event {
            if ty.is_class() && !ty.is_anonymous() {
                let dependencies = ctx.class_dependencies(&ty.name).len();
                post_with(ctx, &self.metric, &ty.name, dependencies as f64, 1.0);
            }
        }
    }
}

/// Outgoing and incoming reference strength of a package.
fn package_coupling(ctx: &mut RunContext<'_, '_>, package: &str) -> (f64, f64) {
    let efferent: u32 = ctx.package_dependencies(package).values().sum();
    let afferent: u32 = ctx.package_dependents(package).values().sum();
    (efferent.into(), afferent.into())
}

/// Instability per package: efferent strength over total coupling
/// strength. A package with no cross-package coupling posts nothing.
#[derive(Debug, Default)]
pub struct InstabilityCalculator {
    metric: Option<Metric>,
}

impl Calculator for InstabilityCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterPackage(package) = *event {
            let (efferent, afferent) = package_coupling(ctx, &package.name);
            if efferent + afferent > 0.0 {
                post_with(ctx, &self.metric, &package.name, efferent, efferent + afferent);
            }
        }
    }
}

/// Ratio of abstract types among a package's named types.
fn abstractness_of(package: &PackageUnit) -> Option<(u32, u32)> {
    let mut total = 0u32;
    let mut abstract_count = 0u32;
    for ty in package.all_types() {
        if ty.form == TypeForm::Anonymous {
            continue;
        }
        total += 1;
        if ty.is_abstract() {
            abstract_count += 1;
        }
    }
    (total > 0).then_some((abstract_count, total))
}

/// Abstractness per package.
#[derive(Debug, Default)]
pub struct AbstractnessCalculator {
    metric: Option<Metric>,
}

impl Calculator for AbstractnessCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterPackage(package) = *event {
            if let Some((abstract_count, total)) = abstractness_of(package) {
                post_with(
                    ctx,
                    &self.metric,
                    &package.name,
                    f64::from(abstract_count),
                    f64::from(total),
                );
            }
        }
    }
}

/// Normalized distance from the main sequence: |A + I - 1| per package.
///
/// A package with no cross-package coupling is treated as maximally
/// stable (I = 0), so a concrete, uncoupled package sits at distance 1.
#[derive(Debug, Default)]
pub struct MainSequenceDistanceCalculator {
    metric: Option<Metric>,
}

impl Calculator for MainSequenceDistanceCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterPackage(package) = *event {
            let Some((abstract_count, total)) = abstractness_of(package) else {
                return;
            };
            let abstractness = f64::from(abstract_count) / f64::from(total);
            let (efferent, afferent) = package_coupling(ctx, &package.name);
            let instability = if efferent + afferent > 0.0 {
                efferent / (efferent + afferent)
            } else {
                0.0
            };
            let distance = (abstractness + instability - 1.0).abs();
            post_with(ctx, &self.metric, &package.name, distance, 1.0);
        }
    }
}

/// Number of call sites targeting each method, across the whole scope.
///
/// Every visited method gets a bucket up front so that an uncalled method
/// still appears with fan-in 0 instead of being absent from the result.
#[derive(Debug, Default)]
pub struct FanInCalculator {
    metric: Option<Metric>,
    call_sites: BucketedCount<String>,
}

impl Calculator for FanInCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterMethod(method) = *event {
            self.call_sites.create_bucket(method.signature.clone());
            ctx.record_anchor(MetricCategory::Method, &method.signature);
            for call in &method.calls {
                // Unresolved calls and calls leaving the scope contribute
                // nothing.
                let Some(target) = &call.target else {
                    continue;
                };
                if ctx.model().has_method(target) {
                    self.call_sites.increment_bucket(target.clone());
                }
            }
        }
    }

    fn end(&mut self, ctx: &mut RunContext<'_, '_>) {
        for (signature, count) in self.call_sites.buckets() {
            if ctx.is_cancelled() {
                return;
            }
            post_with(ctx, &self.metric, signature, count as f64, 1.0);
        }
    }
}
