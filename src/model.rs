//! Abstract program model consumed by the calculators
//!
//! The crate does not parse source code or resolve symbols itself; the host
//! provider builds this tree from its own syntax/symbol infrastructure and
//! hands it to an [`crate::context::ExecutionContext`] for one analysis run.
//! Program units are a tagged tree (module → package → file → type → method
//! → statement) and the traversal is a single function matching on the
//! variants, so a missing unit kind is a compile-time error rather than a
//! forgotten visitor override.
//!
//! Absence is always representable: an unresolved call has no target, an
//! unresolvable declared type is `None`, an abstract method has no body.
//! Calculators treat all of these as "contributes nothing".

use std::collections::HashMap;

/// Measured-object key used for project-level values.
pub const PROJECT_KEY: &str = "project";

/// Whether a type is a class or an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
}

/// Concreteness of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeForm {
    #[default]
    Concrete,
    Abstract,
    /// A class expression nested inside a method body.
    Anonymous,
}

/// Statement classification, as coarse as the metrics need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    #[default]
    Simple,
    /// A branching point (if, switch arm, conditional expression).
    Conditional,
    Loop,
    Return,
}

/// One statement in a method body.
///
/// Statements nest, declare local variables, and may contain anonymous
/// classes — the anonymous classes are what make the nested measurement
/// window of immediate calculators reachable.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub kind: StatementKind,
    /// Declared types of local variables introduced by this statement.
    pub locals: Vec<String>,
    pub children: Vec<Statement>,
    pub anonymous: Vec<TypeDef>,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<Statement>) -> Self {
        self.children = children;
        self
    }

    pub fn with_locals(mut self, locals: Vec<String>) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_anonymous(mut self, anonymous: Vec<TypeDef>) -> Self {
        self.anonymous = anonymous;
        self
    }
}

/// A call expression, resolved by the provider on a best-effort basis.
#[derive(Debug, Clone)]
pub struct Call {
    /// Signature of the target method, or `None` when resolution failed.
    pub target: Option<String>,
}

impl Call {
    pub fn resolved(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    pub fn unresolved() -> Self {
        Self { target: None }
    }
}

/// A field declaration.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    /// Qualified name of the declared type, `None` when unresolvable.
    pub declared_type: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, declared_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            declared_type,
        }
    }
}

/// A method or constructor.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    /// Qualified signature, used as the measured-object key for
    /// method-category metrics. Unique within the model.
    pub signature: String,
    /// Declared parameter types; `None` entries are unresolvable.
    pub parameter_types: Vec<Option<String>>,
    pub return_type: Option<String>,
    pub thrown_types: Vec<String>,
    /// Names of fields of the enclosing type this method touches.
    pub field_touches: Vec<String>,
    pub calls: Vec<Call>,
    /// `None` models a missing body (abstract or interface method).
    pub body: Option<Vec<Statement>>,
}

impl Method {
    pub fn new(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            parameter_types: Vec::new(),
            return_type: None,
            thrown_types: Vec::new(),
            field_touches: Vec::new(),
            calls: Vec::new(),
            body: None,
        }
    }

    /// Anonymous classes declared anywhere in this method's body, in
    /// statement order. The ordering is part of the anchor scheme.
    pub fn anonymous_types(&self) -> Vec<&TypeDef> {
        fn collect<'a>(statements: &'a [Statement], out: &mut Vec<&'a TypeDef>) {
            for statement in statements {
                out.extend(statement.anonymous.iter());
                collect(&statement.children, out);
            }
        }

        let mut out = Vec::new();
        if let Some(body) = &self.body {
            collect(body, &mut out);
        }
        out
    }
}

/// A class or interface definition.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Qualified name, used as the measured-object key for class and
    /// interface metrics. Unique within the model.
    pub name: String,
    pub kind: TypeKind,
    pub form: TypeForm,
    /// Qualified names of extended/implemented types.
    pub supertypes: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Named types declared inside this one.
    pub nested: Vec<TypeDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            form: TypeForm::default(),
            supertypes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == TypeKind::Class
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    pub fn is_anonymous(&self) -> bool {
        self.form == TypeForm::Anonymous
    }

    /// Interfaces and abstract classes count as abstract.
    pub fn is_abstract(&self) -> bool {
        self.is_interface() || self.form == TypeForm::Abstract
    }
}

/// A source file, carrying the types it declares.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    /// File type label, the measured-object key for file-type metrics
    /// (typically the extension).
    pub file_type: String,
    pub line_count: u32,
    pub types: Vec<TypeDef>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: file_type.into(),
            line_count: 0,
            types: Vec::new(),
        }
    }
}

/// A package of source files.
#[derive(Debug, Clone)]
pub struct PackageUnit {
    /// Qualified package name, the measured-object key for package metrics.
    pub name: String,
    pub files: Vec<SourceFile>,
}

impl PackageUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    /// Every type declared in this package, including nested and anonymous
    /// ones. Callers filter by [`TypeDef::form`] where anonymous types are
    /// not wanted.
    pub fn all_types(&self) -> Vec<&TypeDef> {
        let mut out = Vec::new();
        for file in &self.files {
            for ty in &file.types {
                collect_types(ty, &mut out);
            }
        }
        out
    }
}

fn collect_types<'a>(ty: &'a TypeDef, out: &mut Vec<&'a TypeDef>) {
    out.push(ty);
    for nested in &ty.nested {
        collect_types(nested, out);
    }
    for method in &ty.methods {
        for anon in method.anonymous_types() {
            collect_types(anon, out);
        }
    }
}

/// A module grouping packages.
#[derive(Debug, Clone)]
pub struct ModuleUnit {
    pub name: String,
    pub packages: Vec<PackageUnit>,
}

impl ModuleUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: Vec::new(),
        }
    }
}

/// An opaque reference from a measured object back into the program model,
/// used for navigation from a results table. Anchors are only valid while
/// the model they were recorded against is; a run reloaded from a snapshot
/// has none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    path: Box<[u32]>,
}

impl Anchor {
    pub(crate) fn new(path: &[u32]) -> Self {
        Self { path: path.into() }
    }
}

/// A resolved anchor target.
#[derive(Debug, Clone, Copy)]
pub enum UnitRef<'a> {
    Module(&'a ModuleUnit),
    Package(&'a PackageUnit),
    File(&'a SourceFile),
    Type(&'a TypeDef),
    Method(&'a Method),
}

/// The complete program model for one analysis scope.
///
/// Construction walks the tree once to build the symbol index used by the
/// dependency graph builder and the anchor resolver; the tree is immutable
/// afterwards.
#[derive(Debug)]
pub struct ProgramModel {
    name: String,
    modules: Vec<ModuleUnit>,
    index: ModelIndex,
}

#[derive(Debug, Default)]
struct ModelIndex {
    /// Qualified type name → anchor of its definition.
    type_anchors: HashMap<String, Anchor>,
    /// Qualified type name → containing package name.
    type_packages: HashMap<String, String>,
    /// Method signature → anchor of its definition.
    method_anchors: HashMap<String, Anchor>,
    /// Method signature → qualified name of the owning type.
    method_owners: HashMap<String, String>,
    /// Named (non-anonymous) types, for whole-model sweeps.
    named_types: Vec<String>,
    /// Total count of traversal units, known up front for progress.
    unit_count: usize,
}

impl ProgramModel {
    pub fn new(name: impl Into<String>, modules: Vec<ModuleUnit>) -> Self {
        let index = ModelIndex::build(&modules);
        Self {
            name: name.into(),
            modules,
            index,
        }
    }

    /// Name of the analysis scope this model covers.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &[ModuleUnit] {
        &self.modules
    }

    /// Total number of traversal units (modules, packages, files, types,
    /// methods), known before the traversal starts.
    pub fn unit_count(&self) -> usize {
        self.index.unit_count
    }

    /// Whether a qualified type name is defined in this model. References
    /// to unknown types are treated as unresolved.
    pub fn has_type(&self, name: &str) -> bool {
        self.index.type_anchors.contains_key(name)
    }

    /// Whether a method signature is defined in this model.
    pub fn has_method(&self, signature: &str) -> bool {
        self.index.method_anchors.contains_key(signature)
    }

    /// Containing package of a type, when the type is known.
    pub fn package_of(&self, type_name: &str) -> Option<&str> {
        self.index.type_packages.get(type_name).map(String::as_str)
    }

    /// Owning type of a method, when the signature is known.
    pub fn owner_of_method(&self, signature: &str) -> Option<&str> {
        self.index.method_owners.get(signature).map(String::as_str)
    }

    /// Qualified names of every named (non-anonymous) type in the model.
    pub fn named_types(&self) -> &[String] {
        &self.index.named_types
    }

    /// Definition of a named type, looked up through the index.
    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        match self.resolve(self.index.type_anchors.get(name)?)? {
            UnitRef::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// Follow an anchor back to the unit it was recorded against.
    pub fn resolve(&self, anchor: &Anchor) -> Option<UnitRef<'_>> {
        let mut segments = anchor.path.iter().map(|s| *s as usize);

        let module = self.modules.get(segments.next()?)?;
        let Some(package_idx) = segments.next() else {
            return Some(UnitRef::Module(module));
        };
        let package = module.packages.get(package_idx)?;
        let Some(file_idx) = segments.next() else {
            return Some(UnitRef::Package(package));
        };
        let file = package.files.get(file_idx)?;
        let Some(type_idx) = segments.next() else {
            return Some(UnitRef::File(file));
        };

        let mut current = UnitRef::Type(file.types.get(type_idx)?);
        for segment in segments {
            current = match current {
                // A type's child index space covers nested types first,
                // then methods.
                UnitRef::Type(ty) => {
                    if segment < ty.nested.len() {
                        UnitRef::Type(&ty.nested[segment])
                    } else {
                        UnitRef::Method(ty.methods.get(segment - ty.nested.len())?)
                    }
                }
                // A method's children are its anonymous classes in
                // statement order.
                UnitRef::Method(method) => {
                    UnitRef::Type(*method.anonymous_types().get(segment)?)
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl ModelIndex {
    fn build(modules: &[ModuleUnit]) -> Self {
        let mut index = Self::default();
        let mut path: Vec<u32> = Vec::new();

        for (mi, module) in modules.iter().enumerate() {
            path.push(mi as u32);
            index.unit_count += 1;
            for (pi, package) in module.packages.iter().enumerate() {
                path.push(pi as u32);
                index.unit_count += 1;
                for (fi, file) in package.files.iter().enumerate() {
                    path.push(fi as u32);
                    index.unit_count += 1;
                    for (ti, ty) in file.types.iter().enumerate() {
                        path.push(ti as u32);
                        index.index_type(ty, &package.name, &mut path);
                        path.pop();
                    }
                    path.pop();
                }
                path.pop();
            }
            path.pop();
        }
        index
    }

    fn index_type(&mut self, ty: &TypeDef, package: &str, path: &mut Vec<u32>) {
        self.unit_count += 1;
        self.type_anchors
            .insert(ty.name.clone(), Anchor::new(path));
        self.type_packages
            .insert(ty.name.clone(), package.to_string());
        if !ty.is_anonymous() {
            self.named_types.push(ty.name.clone());
        }

        for (ni, nested) in ty.nested.iter().enumerate() {
            path.push(ni as u32);
            self.index_type(nested, package, path);
            path.pop();
        }
        for (mi, method) in ty.methods.iter().enumerate() {
            path.push((ty.nested.len() + mi) as u32);
            self.unit_count += 1;
            self.method_anchors
                .insert(method.signature.clone(), Anchor::new(path));
            self.method_owners
                .insert(method.signature.clone(), ty.name.clone());
            for (ai, anon) in method.anonymous_types().into_iter().enumerate() {
                path.push(ai as u32);
                self.index_type(anon, package, path);
                path.pop();
            }
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> ProgramModel {
        let anon = TypeDef {
            form: TypeForm::Anonymous,
            methods: vec![Method::new("run", "shop.Order$1.run()")],
            ..TypeDef::new("shop.Order$1", TypeKind::Class)
        };
        let order = TypeDef {
            fields: vec![Field::new("total", Some("shop.Money".to_string()))],
            methods: vec![Method {
                body: Some(vec![
                    Statement::new(StatementKind::Simple).with_anonymous(vec![anon]),
                ]),
                ..Method::new("submit", "shop.Order.submit()")
            }],
            ..TypeDef::new("shop.Order", TypeKind::Class)
        };
        let money = TypeDef::new("shop.Money", TypeKind::Class);

        let mut file = SourceFile::new("Order.java", "java");
        file.line_count = 120;
        file.types = vec![order, money];

        let mut package = PackageUnit::new("shop");
        package.files = vec![file];
        let mut module = ModuleUnit::new("app");
        module.packages = vec![package];

        ProgramModel::new("demo", vec![module])
    }

    #[test]
    fn test_index_lookups() {
        let model = sample_model();
        assert!(model.has_type("shop.Order"));
        assert!(model.has_type("shop.Order$1"));
        assert!(!model.has_type("shop.Missing"));
        assert_eq!(model.package_of("shop.Order"), Some("shop"));
        assert_eq!(
            model.owner_of_method("shop.Order.submit()"),
            Some("shop.Order")
        );
        assert_eq!(model.owner_of_method("shop.Order$1.run()"), Some("shop.Order$1"));
    }

    #[test]
    fn test_named_types_exclude_anonymous() {
        let model = sample_model();
        let named = model.named_types();
        assert!(named.contains(&"shop.Order".to_string()));
        assert!(!named.contains(&"shop.Order$1".to_string()));
    }

    #[test]
    fn test_unit_count_known_up_front() {
        let model = sample_model();
        // module + package + file + 3 types + 2 methods
        assert_eq!(model.unit_count(), 8);
    }

    #[test]
    fn test_anchor_round_trip_through_anonymous_class() {
        let model = sample_model();
        let def = model.type_def("shop.Order$1").expect("anonymous type");
        assert!(def.is_anonymous());

        match model.resolve(&Anchor::new(&[0, 0, 0, 0, 0])) {
            Some(UnitRef::Method(m)) => assert_eq!(m.signature, "shop.Order.submit()"),
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_anchor_resolves_to_none() {
        let model = sample_model();
        assert!(model.resolve(&Anchor::new(&[4, 2])).is_none());
    }
}
