//! Dependency graph construction for coupling metrics
//!
//! Coupling calculators (afferent/efferent coupling, instability, distance
//! from the main sequence) all ask the same questions — which types does
//! this type reference, and which types reference it — so the answers are
//! computed once per run and memoized in the shared cache bag rather than
//! recomputed per metric.
//!
//! Edge strength counts distinct referencing sites: a type referenced by
//! two fields and one parameter yields strength 3. References to types the
//! model does not define are unresolved and contribute no edge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{ProgramModel, Statement, TypeDef};

fn default_true() -> bool {
    true
}

/// Which reference kinds count as dependency edges.
///
/// The exact inclusion policy differs between coupling-metric definitions
/// in the literature, so it is the one configurable point of the builder.
/// Every kind is counted by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyPolicy {
    #[serde(default = "default_true")]
    pub supertypes: bool,
    #[serde(default = "default_true")]
    pub field_types: bool,
    #[serde(default = "default_true")]
    pub parameter_types: bool,
    #[serde(default = "default_true")]
    pub return_types: bool,
    #[serde(default = "default_true")]
    pub thrown_types: bool,
    #[serde(default = "default_true")]
    pub local_variable_types: bool,
    /// Count a call site as a reference to the target method's owner.
    #[serde(default = "default_true")]
    pub call_targets: bool,
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self {
            supertypes: true,
            field_types: true,
            parameter_types: true,
            return_types: true,
            thrown_types: true,
            local_variable_types: true,
            call_targets: true,
        }
    }
}

/// Weighted edge set keyed by target name.
pub type EdgeMap = HashMap<String, u32>;

/// Class- and package-level dependency/dependent maps for one run.
///
/// Per-type dependency sets are computed lazily and memoized by type name;
/// dependent sets require every type's dependencies, so the first dependents
/// query materializes the full graph. Package maps are derived by summing
/// member-type edges, skipping edges whose endpoints share a package —
/// self-dependency is not coupling.
#[derive(Debug)]
pub struct DependencyGraph {
    policy: DependencyPolicy,
    dependencies: HashMap<String, EdgeMap>,
    dependents: Option<HashMap<String, EdgeMap>>,
    package_dependencies: Option<HashMap<String, EdgeMap>>,
    package_dependents: Option<HashMap<String, EdgeMap>>,
}

impl DependencyGraph {
    pub fn new(policy: DependencyPolicy) -> Self {
        Self {
            policy,
            dependencies: HashMap::new(),
            dependents: None,
            package_dependencies: None,
            package_dependents: None,
        }
    }

    /// Types `type_name` depends on, with reference-site strengths.
    pub fn dependencies_of(&mut self, model: &ProgramModel, type_name: &str) -> &EdgeMap {
        if !self.dependencies.contains_key(type_name) {
            let edges = compute_dependencies(model, &self.policy, type_name);
            self.dependencies.insert(type_name.to_string(), edges);
        }
        &self.dependencies[type_name]
    }

    /// Types that depend on `type_name`, with the same strengths as the
    /// forward edges.
    pub fn dependents_of(&mut self, model: &ProgramModel, type_name: &str) -> &EdgeMap {
        self.ensure_dependents(model);
        self.dependents
            .get_or_insert_with(HashMap::new)
            .entry(type_name.to_string())
            .or_default()
    }

    /// Packages the given package depends on, intra-package edges excluded.
    pub fn package_dependencies_of(&mut self, model: &ProgramModel, package: &str) -> &EdgeMap {
        self.ensure_packages(model);
        self.package_dependencies
            .get_or_insert_with(HashMap::new)
            .entry(package.to_string())
            .or_default()
    }

    /// Packages that depend on the given package.
    pub fn package_dependents_of(&mut self, model: &ProgramModel, package: &str) -> &EdgeMap {
        self.ensure_packages(model);
        self.package_dependents
            .get_or_insert_with(HashMap::new)
            .entry(package.to_string())
            .or_default()
    }

    fn ensure_dependents(&mut self, model: &ProgramModel) {
        if self.dependents.is_some() {
            return;
        }

        let mut dependents: HashMap<String, EdgeMap> = HashMap::new();
        for name in model.named_types() {
            dependents.entry(name.clone()).or_default();
        }
        for name in model.named_types().to_vec() {
            let edges = self.dependencies_of(model, &name).clone();
            for (target, strength) in edges {
                *dependents.entry(target).or_default().entry(name.clone()).or_insert(0) +=
                    strength;
            }
        }
        self.dependents = Some(dependents);
    }

    fn ensure_packages(&mut self, model: &ProgramModel) {
        if self.package_dependencies.is_some() {
            return;
        }

        let mut forward: HashMap<String, EdgeMap> = HashMap::new();
        let mut reverse: HashMap<String, EdgeMap> = HashMap::new();

        for name in model.named_types().to_vec() {
            let Some(from_package) = model.package_of(&name).map(str::to_string) else {
                continue;
            };
            forward.entry(from_package.clone()).or_default();
            reverse.entry(from_package.clone()).or_default();

            let edges = self.dependencies_of(model, &name).clone();
            for (target, strength) in edges {
                let Some(to_package) = model.package_of(&target).map(str::to_string) else {
                    continue;
                };
                if to_package == from_package {
                    continue;
                }
                *forward
                    .entry(from_package.clone())
                    .or_default()
                    .entry(to_package.clone())
                    .or_insert(0) += strength;
                *reverse
                    .entry(to_package)
                    .or_default()
                    .entry(from_package.clone())
                    .or_insert(0) += strength;
            }
        }

        self.package_dependencies = Some(forward);
        self.package_dependents = Some(reverse);
    }
}

/// Collect one type's outgoing edges under the given policy.
///
/// Anonymous classes are implementation details of their declaring type, so
/// their references are attributed to it; named nested types are nodes of
/// their own.
fn compute_dependencies(model: &ProgramModel, policy: &DependencyPolicy, type_name: &str) -> EdgeMap {
    let mut edges = EdgeMap::new();
    let Some(ty) = model.type_def(type_name) else {
        return edges;
    };
    collect_type_references(model, policy, ty, type_name, &mut edges);
    edges
}

fn collect_type_references(
    model: &ProgramModel,
    policy: &DependencyPolicy,
    ty: &TypeDef,
    origin: &str,
    edges: &mut EdgeMap,
) {
    let mut add = |target: &str, edges: &mut EdgeMap| {
        // Self-references and unresolved targets contribute nothing.
        if target == origin || !model.has_type(target) {
            return;
        }
        *edges.entry(target.to_string()).or_insert(0) += 1;
    };

    if policy.supertypes {
        for supertype in &ty.supertypes {
            add(supertype, edges);
        }
    }
    if policy.field_types {
        for field in &ty.fields {
            if let Some(declared) = &field.declared_type {
                add(declared, edges);
            }
        }
    }

    for method in &ty.methods {
        if policy.parameter_types {
            for parameter in method.parameter_types.iter().flatten() {
                add(parameter, edges);
            }
        }
        if policy.return_types {
            if let Some(returned) = &method.return_type {
                add(returned, edges);
            }
        }
        if policy.thrown_types {
            for thrown in &method.thrown_types {
                add(thrown, edges);
            }
        }
        if let Some(body) = &method.body {
            collect_statement_references(model, policy, body, origin, edges, &mut |t, e| {
                add(t, e)
            });
        }
        if policy.call_targets {
            for call in &method.calls {
                if let Some(target) = &call.target {
                    if let Some(owner) = model.owner_of_method(target) {
                        let owner = owner.to_string();
                        add(&owner, edges);
                    }
                }
            }
        }
    }
}

fn collect_statement_references(
    model: &ProgramModel,
    policy: &DependencyPolicy,
    statements: &[Statement],
    origin: &str,
    edges: &mut EdgeMap,
    add: &mut dyn FnMut(&str, &mut EdgeMap),
) {
    for statement in statements {
        if policy.local_variable_types {
            for local in &statement.locals {
                add(local, edges);
            }
        }
        for anon in &statement.anonymous {
            collect_type_references(model, policy, anon, origin, edges);
        }
        collect_statement_references(model, policy, &statement.children, origin, edges, add);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Field, Method, ModuleUnit, PackageUnit, SourceFile, Statement, StatementKind, TypeDef,
        TypeKind,
    };

    fn model_with_cycle() -> ProgramModel {
        // P references Q from three sites; Q references P back once.
        let p = TypeDef {
            fields: vec![
                Field::new("first", Some("app.Q".to_string())),
                Field::new("second", Some("app.Q".to_string())),
            ],
            methods: vec![Method {
                return_type: Some("app.Q".to_string()),
                ..Method::new("make", "app.P.make()")
            }],
            ..TypeDef::new("app.P", TypeKind::Class)
        };
        let q = TypeDef {
            methods: vec![Method {
                parameter_types: vec![Some("app.P".to_string())],
                ..Method::new("accept", "app.Q.accept(app.P)")
            }],
            ..TypeDef::new("app.Q", TypeKind::Class)
        };

        let mut file = SourceFile::new("PQ.java", "java");
        file.types = vec![p, q];
        let mut package = PackageUnit::new("app");
        package.files = vec![file];
        let mut module = ModuleUnit::new("app");
        module.packages = vec![package];
        ProgramModel::new("cycle", vec![module])
    }

    #[test]
    fn test_dependency_dependent_symmetry() {
        let model = model_with_cycle();
        let mut graph = DependencyGraph::new(DependencyPolicy::default());

        assert_eq!(graph.dependencies_of(&model, "app.P").get("app.Q"), Some(&3));
        assert_eq!(graph.dependents_of(&model, "app.Q").get("app.P"), Some(&3));
        assert_eq!(graph.dependencies_of(&model, "app.Q").get("app.P"), Some(&1));
        assert_eq!(graph.dependents_of(&model, "app.P").get("app.Q"), Some(&1));
    }

    #[test]
    fn test_unresolved_reference_contributes_no_edge() {
        let ty = TypeDef {
            fields: vec![Field::new("gone", Some("lib.Missing".to_string()))],
            ..TypeDef::new("app.Lone", TypeKind::Class)
        };
        let mut file = SourceFile::new("Lone.java", "java");
        file.types = vec![ty];
        let mut package = PackageUnit::new("app");
        package.files = vec![file];
        let mut module = ModuleUnit::new("app");
        module.packages = vec![package];
        let model = ProgramModel::new("lone", vec![module]);

        let mut graph = DependencyGraph::new(DependencyPolicy::default());
        assert!(graph.dependencies_of(&model, "app.Lone").is_empty());
    }

    #[test]
    fn test_policy_can_disable_reference_kinds() {
        let model = model_with_cycle();
        let policy = DependencyPolicy {
            field_types: false,
            return_types: false,
            ..DependencyPolicy::default()
        };
        let mut graph = DependencyGraph::new(policy);
        // Only Q's parameter reference to P remains.
        assert!(graph.dependencies_of(&model, "app.P").is_empty());
        assert_eq!(graph.dependencies_of(&model, "app.Q").get("app.P"), Some(&1));
    }

    #[test]
    fn test_local_variable_references_counted() {
        let user = TypeDef {
            methods: vec![Method {
                body: Some(vec![Statement::new(StatementKind::Simple)
                    .with_locals(vec!["app.Helper".to_string()])]),
                ..Method::new("run", "app.User.run()")
            }],
            ..TypeDef::new("app.User", TypeKind::Class)
        };
        let helper = TypeDef::new("app.Helper", TypeKind::Class);

        let mut file = SourceFile::new("User.java", "java");
        file.types = vec![user, helper];
        let mut package = PackageUnit::new("app");
        package.files = vec![file];
        let mut module = ModuleUnit::new("app");
        module.packages = vec![package];
        let model = ProgramModel::new("locals", vec![module]);

        let mut graph = DependencyGraph::new(DependencyPolicy::default());
        assert_eq!(
            graph.dependencies_of(&model, "app.User").get("app.Helper"),
            Some(&1)
        );
    }

    #[test]
    fn test_package_rollup_excludes_intra_package_edges() {
        // core.A -> core.B (same package) and core.A -> util.C (cross).
        let a = TypeDef {
            fields: vec![
                Field::new("b", Some("core.B".to_string())),
                Field::new("c", Some("util.C".to_string())),
            ],
            ..TypeDef::new("core.A", TypeKind::Class)
        };
        let b = TypeDef::new("core.B", TypeKind::Class);
        let c = TypeDef::new("util.C", TypeKind::Class);

        let mut core_file = SourceFile::new("AB.java", "java");
        core_file.types = vec![a, b];
        let mut core = PackageUnit::new("core");
        core.files = vec![core_file];

        let mut util_file = SourceFile::new("C.java", "java");
        util_file.types = vec![c];
        let mut util = PackageUnit::new("util");
        util.files = vec![util_file];

        let mut module = ModuleUnit::new("app");
        module.packages = vec![core, util];
        let model = ProgramModel::new("pkgs", vec![module]);

        let mut graph = DependencyGraph::new(DependencyPolicy::default());
        let forward = graph.package_dependencies_of(&model, "core").clone();
        assert_eq!(forward.get("util"), Some(&1));
        assert_eq!(forward.get("core"), None);
        assert_eq!(
            graph.package_dependents_of(&model, "util").get("core"),
            Some(&1)
        );
        assert!(graph.package_dependencies_of(&model, "util").is_empty());
    }
}
