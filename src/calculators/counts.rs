//! Size and complexity calculators
//!
//! All of these are plain counting calculators. The immediate ones keep a
//! frame stack so that a nested measurement window (an anonymous class
//! inside the method being measured, a nested class inside a class) never
//! bleeds into the enclosing one; the deferred ones accumulate into
//! buckets and post from `end`.

use crate::buckets::BucketedCount;
use crate::calculator::{Calculator, FrameStack, VisitEvent, post_with};
use crate::context::RunContext;
use crate::metric::{Metric, MetricCategory};
use crate::model::{PROJECT_KEY, StatementKind, TypeKind};

/// Counts methods per class or per interface, depending on the filter.
///
/// A frame is pushed for every type so that methods of a nested or
/// anonymous type are attributed to it and never to the enclosing type;
/// only named types matching the filter post a value.
#[derive(Debug, Default)]
pub struct MethodCountCalculator {
    metric: Option<Metric>,
    filter: Option<TypeKind>,
    frames: FrameStack<(String, bool, u32)>,
}

impl MethodCountCalculator {
    pub fn for_classes() -> Self {
        Self {
            filter: Some(TypeKind::Class),
            ..Self::default()
        }
    }

    pub fn for_interfaces() -> Self {
        Self {
            filter: Some(TypeKind::Interface),
            ..Self::default()
        }
    }
}

impl Calculator for MethodCountCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        match *event {
            VisitEvent::EnterType(ty) => {
                let posts = Some(ty.kind) == self.filter && !ty.is_anonymous();
                self.frames.push((ty.name.clone(), posts, 0));
            }
            VisitEvent::EnterMethod(_) => {
                if let Some((_, _, count)) = self.frames.top_mut() {
                    *count += 1;
                }
            }
            VisitEvent::LeaveType(_) => {
                if let Some((name, posts, count)) = self.frames.pop() {
                    if posts {
                        post_with(ctx, &self.metric, &name, f64::from(count), 1.0);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Counts statements per method.
///
/// The classic nesting trap: a method containing an anonymous class whose
/// methods contain statements of their own. Each method body opens its own
/// frame, so the inner statements never leak into the outer count.
#[derive(Debug, Default)]
pub struct StatementCountCalculator {
    metric: Option<Metric>,
    frames: FrameStack<(String, u32)>,
}

impl Calculator for StatementCountCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        match *event {
            VisitEvent::EnterMethod(method) => {
                if method.body.is_some() {
                    self.frames.push((method.signature.clone(), 0));
                }
            }
            VisitEvent::EnterStatement(_) => {
                if let Some((_, count)) = self.frames.top_mut() {
                    *count += 1;
                }
            }
            VisitEvent::LeaveMethod(method) => {
                if method.body.is_some() {
                    if let Some((signature, count)) = self.frames.pop() {
                        post_with(ctx, &self.metric, &signature, f64::from(count), 1.0);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Cyclomatic complexity per method: 1 plus the number of branch points.
#[derive(Debug, Default)]
pub struct CyclomaticComplexityCalculator {
    metric: Option<Metric>,
    frames: FrameStack<(String, u32)>,
}

impl Calculator for CyclomaticComplexityCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        match *event {
            VisitEvent::EnterMethod(method) => {
                if method.body.is_some() {
                    self.frames.push((method.signature.clone(), 1));
                }
            }
            VisitEvent::EnterStatement(statement) => {
                if matches!(
                    statement.kind,
                    StatementKind::Conditional | StatementKind::Loop
                ) {
                    if let Some((_, count)) = self.frames.top_mut() {
                        *count += 1;
                    }
                }
            }
            VisitEvent::LeaveMethod(method) => {
                if method.body.is_some() {
                    if let Some((signature, count)) = self.frames.pop() {
                        post_with(ctx, &self.metric, &signature, f64::from(count), 1.0);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Counts statements per class, recursively: a statement inside a nested
/// or anonymous type counts into every enclosing class as well, which is
/// why the metric type is recursive and offers no total or average.
#[derive(Debug, Default)]
pub struct RecursiveStatementCountCalculator {
    metric: Option<Metric>,
    frames: FrameStack<(String, bool, u32)>,
}

impl Calculator for RecursiveStatementCountCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        match *event {
            VisitEvent::EnterType(ty) => {
                let posts = ty.is_class() && !ty.is_anonymous();
                self.frames.push((ty.name.clone(), posts, 0));
            }
            VisitEvent::EnterStatement(_) => {
                for (_, _, count) in self.frames.iter_mut() {
                    *count += 1;
                }
            }
            VisitEvent::LeaveType(_) => {
                if let Some((name, posts, count)) = self.frames.pop() {
                    if posts {
                        post_with(ctx, &self.metric, &name, f64::from(count), 1.0);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Counts named classes across the whole scope, posted against the
/// project key once the traversal is complete.
#[derive(Debug, Default)]
pub struct ClassCountCalculator {
    metric: Option<Metric>,
    count: u64,
}

impl Calculator for ClassCountCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, _ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterType(ty) = *event {
            if ty.is_class() && !ty.is_anonymous() {
                self.count += 1;
            }
        }
    }

    fn end(&mut self, ctx: &mut RunContext<'_, '_>) {
        post_with(ctx, &self.metric, PROJECT_KEY, self.count as f64, 1.0);
    }
}

/// Counts named classes per module. A module with no classes still posts
/// zero, which is what the explicit bucket creation is for.
#[derive(Debug, Default)]
pub struct ClassesPerModuleCalculator {
    metric: Option<Metric>,
    current_module: Option<String>,
    counts: BucketedCount<String>,
}

impl Calculator for ClassesPerModuleCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        match *event {
            VisitEvent::EnterModule(module) => {
                self.counts.create_bucket(module.name.clone());
                ctx.record_anchor(MetricCategory::Module, &module.name);
                self.current_module = Some(module.name.clone());
            }
            VisitEvent::LeaveModule(_) => {
                self.current_module = None;
            }
            VisitEvent::EnterType(ty) => {
                if ty.is_class() && !ty.is_anonymous() {
                    if let Some(module) = &self.current_module {
                        self.counts.increment_bucket(module.clone());
                    }
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, ctx: &mut RunContext<'_, '_>) {
        for (module, count) in self.counts.buckets() {
            if ctx.is_cancelled() {
                return;
            }
            post_with(ctx, &self.metric, module, count as f64, 1.0);
        }
    }
}

/// Sums source lines per file type label.
#[derive(Debug, Default)]
pub struct LinesPerFileTypeCalculator {
    metric: Option<Metric>,
    lines: BucketedCount<String>,
}

impl Calculator for LinesPerFileTypeCalculator {
    fn begin(&mut self, metric: &Metric, _ctx: &mut RunContext<'_, '_>) {
        self.metric = Some(metric.clone());
    }

    fn visit(&mut self, event: &VisitEvent<'_>, ctx: &mut RunContext<'_, '_>) {
        if let VisitEvent::EnterFile(file) = *event {
            ctx.record_anchor(MetricCategory::FileType, &file.file_type);
            self.lines
                .increment_bucket_by(file.file_type.clone(), i64::from(file.line_count));
        }
    }

    fn end(&mut self, ctx: &mut RunContext<'_, '_>) {
        for (file_type, lines) in self.lines.buckets() {
            if ctx.is_cancelled() {
                return;
            }
            post_with(ctx, &self.metric, file_type, lines as f64, 1.0);
        }
    }
}
