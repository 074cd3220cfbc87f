//! Cohesion calculators

use crate::calculator::{Calculator, VisitEvent, post_with};
use crate::context::RunContext;
use crate::metric::Metric;

/// Lack of cohesion of methods (Henderson-Sellers variant) per class.
///
/// `(m - sum(mf)/f) / (m - 1)` where `m` is the method count, `f` the
/// field count, and `mf` the number of methods touching each field. 0
/// means every method touches every field; values around 1 mean the
/// methods share almost no state. Classes with fewer than two methods or
/// no fields have no meaningful cohesion and post nothing.
///
/// The field-usage map is computed once per run and shared through the
/// execution context's cache, since other cohesion-style metrics consult
/// the same structure.
#[derive(Debug, Default)]
pub struct LackOfCohesionCalculator {
    metric: Option<Metric>,
}

impl Calculator for LackOfCohesionCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterType(ty) = *event {
            if !ty.is_class() || ty.is_anonymous() {
                return;
            }
            let fields = ty.fields.len();
            let methods = ty.methods.len();
            if fields == 0 || methods < 2 {
                return;
            }

            let used_sum: usize = ctx
                .field_usage()
                .usage_for(&ty.name)
                .map(|usage| usage.field_methods.values().sum())
                .unwrap_or(0);

            let average_users = used_sum as f64 / fields as f64;
            let lcom = ((methods as f64 - average_users) / (methods as f64 - 1.0)).max(0.0);
            post_with(ctx, &self.metric, &ty.name, lcom, 1.0);
        }
    }
}
