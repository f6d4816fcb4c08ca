//! Signature-type evaluation
//!
//! Declared type expressions are turned into flow vertices. Named types are
//! resolved through chains of static reads created when the declaration is
//! defined and dropped when it is undefined.

use crate::env::{CRef, EntityRef, Follower, GlobalEnv};
use crate::error::{AnalysisError, Result};
use crate::graph::ChangeSet;
use crate::ids::{ModuleId, StaticReadId, VertexId};
use crate::types::Type;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigLiteral {
    Symbol(String),
    Integer(i64),
    String(String),
    Bool(bool),
}

/// A possibly qualified type name such as `::A::B[Integer]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedType {
    pub namespace: Vec<String>,
    pub name: String,
    /// Written with a leading `::`
    pub absolute: bool,
    pub args: Vec<TypeNode>,
    /// Reads resolving the name, the last one names the type itself
    reads: Vec<StaticReadId>,
}

impl NamedType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: Vec::new(),
            name: name.into(),
            absolute: false,
            args: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// Split a `A::B::C` path, a leading `::` marks it absolute
    pub fn path(path: &str) -> Self {
        let (absolute, path) = match path.strip_prefix("::") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let mut segments: Vec<String> = path.split("::").map(str::to_string).collect();
        let name = segments.pop().unwrap_or_default();
        Self {
            namespace: segments,
            name,
            absolute,
            args: Vec::new(),
            reads: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<TypeNode>) -> Self {
        self.args = args;
        self
    }

    fn full_path(&self) -> Vec<String> {
        let mut path = self.namespace.clone();
        path.push(self.name.clone());
        path
    }

    fn display_path(&self) -> String {
        let path = self.full_path().join("::");
        if self.absolute {
            format!("::{path}")
        } else {
            path
        }
    }

    pub fn reads(&self) -> &[StaticReadId] {
        &self.reads
    }
}

/// A declared type expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Bool,
    Nil,
    SelfType,
    Void,
    Any,
    Top,
    Bottom,
    /// `instance`
    BaseInstance,
    Literal(SigLiteral),
    Union(Vec<TypeNode>),
    Intersection(Vec<TypeNode>),
    Interface { name: String },
    Proc(Box<SigFunction>),
    Var(String),
    Optional(Box<TypeNode>),
    Tuple(Vec<TypeNode>),
    Instance(NamedType),
    /// `singleton(C)`
    Module(NamedType),
    Alias(NamedType),
}

/// Parameter and return types of a method or block signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigFunction {
    pub required_positionals: Vec<TypeNode>,
    pub return_type: TypeNode,
}

impl SigFunction {
    pub fn new(required_positionals: Vec<TypeNode>, return_type: TypeNode) -> Self {
        Self {
            required_positionals,
            return_type,
        }
    }

    pub fn define(&mut self, genv: &mut GlobalEnv, cref: &Rc<CRef>) {
        for ty in &mut self.required_positionals {
            ty.define(genv, cref);
        }
        self.return_type.define(genv, cref);
    }

    pub fn undefine(&self, genv: &mut GlobalEnv) {
        for ty in &self.required_positionals {
            ty.undefine(genv);
        }
        self.return_type.undefine(genv);
    }
}

/// Bindings of `self` and type variables used while evaluating a signature
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    pub self_vertex: Option<VertexId>,
    vars: HashMap<String, VertexId>,
    /// Aliases currently being expanded, with their target vertex
    expanding: Vec<(EntityRef, VertexId)>,
}

impl Substitution {
    pub fn with_self(self_vertex: VertexId) -> Self {
        Self {
            self_vertex: Some(self_vertex),
            ..Self::default()
        }
    }

    pub fn bind(&mut self, name: &str, vertex: VertexId) {
        self.vars.insert(name.to_string(), vertex);
    }

    pub fn get(&self, name: &str) -> Option<VertexId> {
        self.vars.get(name).copied()
    }
}

impl TypeNode {
    pub fn instance(name: &str) -> Self {
        TypeNode::Instance(NamedType::path(name))
    }

    pub fn generic(name: &str, args: Vec<TypeNode>) -> Self {
        TypeNode::Instance(NamedType::path(name).with_args(args))
    }

    pub fn optional(inner: TypeNode) -> Self {
        TypeNode::Optional(Box::new(inner))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            TypeNode::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Create the static reads of every named type in this expression
    pub fn define(&mut self, genv: &mut GlobalEnv, cref: &Rc<CRef>) {
        match self {
            TypeNode::Instance(named) | TypeNode::Module(named) => {
                for arg in &mut named.args {
                    arg.define(genv, cref);
                }
                drop_reads(genv, std::mem::take(&mut named.reads));
                named.reads = genv.define_const_chain(cref, &named.full_path(), named.absolute);
            }
            TypeNode::Alias(named) => {
                for arg in &mut named.args {
                    arg.define(genv, cref);
                }
                drop_reads(genv, std::mem::take(&mut named.reads));
                named.reads =
                    genv.define_alias_chain(cref, &named.namespace, &named.name, named.absolute);
            }
            TypeNode::Union(types) | TypeNode::Intersection(types) | TypeNode::Tuple(types) => {
                for ty in types {
                    ty.define(genv, cref);
                }
            }
            TypeNode::Optional(inner) => inner.define(genv, cref),
            TypeNode::Proc(function) => function.define(genv, cref),
            _ => {}
        }
    }

    pub fn undefine(&self, genv: &mut GlobalEnv) {
        match self {
            TypeNode::Instance(named) | TypeNode::Module(named) | TypeNode::Alias(named) => {
                drop_reads(genv, named.reads.clone());
                for arg in &named.args {
                    arg.undefine(genv);
                }
            }
            TypeNode::Union(types) | TypeNode::Intersection(types) | TypeNode::Tuple(types) => {
                for ty in types {
                    ty.undefine(genv);
                }
            }
            TypeNode::Optional(inner) => inner.undefine(genv),
            TypeNode::Proc(function) => function.undefine(genv),
            _ => {}
        }
    }

    /// Evaluate into a vertex; `None` for types that cannot be materialized
    /// (interfaces)
    pub fn materialize(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        subst: &Substitution,
        key: &str,
    ) -> Result<Option<VertexId>> {
        match self {
            TypeNode::Interface { .. } => Ok(None),
            _ => self.get_vertex(genv, changes, subst, key).map(Some),
        }
    }

    /// Evaluate into a vertex keyed by `key` in `changes`
    pub fn get_vertex(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        subst: &Substitution,
        key: &str,
    ) -> Result<VertexId> {
        // a bound variable is its binding, so flows into it reach the binder
        if let Some(bound) = self.as_var().and_then(|name| subst.get(name)) {
            return Ok(bound);
        }
        let vtx = changes.new_vertex(&mut genv.graph, key.to_string(), "sig");
        self.contribute(genv, changes, vtx, subst, key)?;
        Ok(vtx)
    }

    /// Add the types this expression denotes to `vtx`
    pub fn contribute(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        vtx: VertexId,
        subst: &Substitution,
        key: &str,
    ) -> Result<()> {
        match self {
            TypeNode::Bool => {
                let types = vec![genv.true_type(), genv.false_type()];
                changes.add_source(&mut genv.graph, types, vtx);
            }
            TypeNode::Nil => {
                let nil = genv.nil_type();
                changes.add_source(&mut genv.graph, vec![nil], vtx);
            }
            TypeNode::SelfType => {
                if let Some(self_vertex) = subst.self_vertex {
                    changes.add_edge(&mut genv.graph, self_vertex, vtx);
                }
            }
            TypeNode::Void | TypeNode::Any | TypeNode::Top | TypeNode::Interface { .. } => {}
            TypeNode::Bottom => changes.add_source(&mut genv.graph, vec![Type::Bot], vtx),
            TypeNode::BaseInstance => {
                return Err(AnalysisError::Unsupported("instance".to_string()));
            }
            TypeNode::Literal(lit) => {
                let ty = match lit {
                    SigLiteral::Symbol(name) => Type::Symbol(name.clone()),
                    SigLiteral::Integer(_) => genv.int_type(),
                    SigLiteral::String(_) => genv.str_type(),
                    SigLiteral::Bool(true) => genv.true_type(),
                    SigLiteral::Bool(false) => genv.false_type(),
                };
                changes.add_source(&mut genv.graph, vec![ty], vtx);
            }
            TypeNode::Union(types) => {
                for (i, ty) in types.iter().enumerate() {
                    ty.contribute(genv, changes, vtx, subst, &format!("{key}/u{i}"))?;
                }
            }
            TypeNode::Intersection(_) if genv.config.strict_signatures => {
                return Err(AnalysisError::Unsupported("intersection".to_string()));
            }
            TypeNode::Proc(_) if genv.config.strict_signatures => {
                return Err(AnalysisError::Unsupported("proc".to_string()));
            }
            TypeNode::Intersection(_) | TypeNode::Proc(_) => {}
            TypeNode::Var(name) => {
                if let Some(bound) = subst.get(name) {
                    changes.add_edge(&mut genv.graph, bound, vtx);
                }
            }
            TypeNode::Optional(inner) => {
                inner.contribute(genv, changes, vtx, subst, &format!("{key}/opt"))?;
                let nil = genv.nil_type();
                changes.add_source(&mut genv.graph, vec![nil], vtx);
            }
            TypeNode::Tuple(types) => {
                let unified =
                    changes.new_vertex(&mut genv.graph, format!("{key}/unified"), "ary-unified");
                let mut elems = Vec::with_capacity(types.len());
                for (i, ty) in types.iter().enumerate() {
                    let elem = ty.get_vertex(genv, changes, subst, &format!("{key}/e{i}"))?;
                    changes.add_edge(&mut genv.graph, elem, unified);
                    elems.push(elem);
                }
                let array = Type::Array {
                    elems: Some(elems),
                    unified,
                    base: genv.builtins.array,
                };
                changes.add_source(&mut genv.graph, vec![array], vtx);
            }
            TypeNode::Instance(named) => named.contribute_instance(genv, changes, vtx, subst, key)?,
            TypeNode::Module(named) => {
                if let Some(module) = resolved_module(genv, changes, named) {
                    changes.add_source(&mut genv.graph, vec![Type::module(module)], vtx);
                }
            }
            TypeNode::Alias(named) => named.contribute_alias(genv, changes, vtx, subst, key)?,
        }
        Ok(())
    }
}

impl NamedType {
    fn contribute_instance(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        vtx: VertexId,
        subst: &Substitution,
        key: &str,
    ) -> Result<()> {
        let Some(module) = resolved_module(genv, changes, self) else {
            return Ok(());
        };
        let builtins = genv.builtins;
        let ty = if module == builtins.array || module == builtins.set {
            let [elem] = self.type_args::<1>(genv, changes, subst, key)?;
            Type::Array {
                elems: None,
                unified: elem,
                base: module,
            }
        } else if module == builtins.hash {
            let [key_vtx, value_vtx] = self.type_args::<2>(genv, changes, subst, key)?;
            Type::Hash {
                key: key_vtx,
                value: value_vtx,
                base: module,
            }
        } else {
            // type arguments of other generics are not tracked
            Type::instance(module)
        };
        changes.add_source(&mut genv.graph, vec![ty], vtx);
        Ok(())
    }

    fn type_args<const N: usize>(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        subst: &Substitution,
        key: &str,
    ) -> Result<[VertexId; N]> {
        if self.args.len() != N {
            return Err(AnalysisError::GenericArity {
                path: self.display_path(),
                expected: N,
                found: self.args.len(),
            });
        }
        let mut vertices = [VertexId::default(); N];
        for (i, arg) in self.args.iter().enumerate() {
            vertices[i] = arg.get_vertex(genv, changes, subst, &format!("{key}/t{i}"))?;
        }
        Ok(vertices)
    }

    fn contribute_alias(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        vtx: VertexId,
        subst: &Substitution,
        key: &str,
    ) -> Result<()> {
        let Some(&read) = self.reads.last() else {
            return Ok(());
        };
        follow(genv, changes, read);
        let Some(entity) = genv.type_alias_read_entity(read) else {
            return Ok(());
        };
        if let Some(&(_, target)) = subst.expanding.iter().find(|(e, _)| *e == entity) {
            changes.add_edge(&mut genv.graph, target, vtx);
            return Ok(());
        }
        let Some(ty) = genv
            .module(entity.module)
            .type_alias(&entity.name)
            .and_then(|alias| alias.first_type())
        else {
            return Ok(());
        };
        let mut inner = subst.clone();
        inner.expanding.push((entity, vtx));
        ty.contribute(genv, changes, vtx, &inner, &format!("{key}/alias"))
    }
}

/// Module the last read of `named` resolves to; the running site follows
/// that read
fn resolved_module(
    genv: &mut GlobalEnv,
    changes: &ChangeSet,
    named: &NamedType,
) -> Option<ModuleId> {
    let &read = named.reads.last()?;
    follow(genv, changes, read);
    genv.const_read_module(read)
}

fn follow(genv: &mut GlobalEnv, changes: &ChangeSet, read: StaticReadId) {
    if let Some(site) = changes.owner() {
        genv.add_static_read_follower(read, Follower::Site(site));
    }
}

fn drop_reads(genv: &mut GlobalEnv, reads: Vec<StaticReadId>) {
    for read in reads.into_iter().rev() {
        genv.drop_static_read(read);
    }
}

impl GlobalEnv {
    /// `A::B::C` as a base read of `A` followed by scoped reads
    pub(crate) fn define_const_chain(
        &mut self,
        cref: &Rc<CRef>,
        path: &[String],
        absolute: bool,
    ) -> Vec<StaticReadId> {
        let Some((first, rest)) = path.split_first() else {
            return Vec::new();
        };
        let scope = if absolute { CRef::toplevel() } else { Rc::clone(cref) };
        let mut reads = vec![self.new_base_const_read(scope, first)];
        for name in rest {
            let cbase = reads[reads.len() - 1];
            reads.push(self.new_scoped_const_read(cbase, name));
        }
        reads
    }

    /// Const reads for the namespace, then a type-alias read for the name
    pub(crate) fn define_alias_chain(
        &mut self,
        cref: &Rc<CRef>,
        namespace: &[String],
        name: &str,
        absolute: bool,
    ) -> Vec<StaticReadId> {
        let mut reads = self.define_const_chain(cref, namespace, absolute);
        let alias = match reads.last() {
            Some(&cbase) => self.new_scoped_type_alias_read(cbase, name),
            None => {
                let scope = if absolute { CRef::toplevel() } else { Rc::clone(cref) };
                self.new_base_type_alias_read(scope, name)
            }
        };
        reads.push(alias);
        reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::ids::NodeId;

    fn eval(genv: &mut GlobalEnv, ty: &mut TypeNode) -> Result<VertexId> {
        ty.define(genv, &CRef::toplevel());
        genv.run().unwrap();
        let mut changes = ChangeSet::new(None, NodeId(9));
        changes.begin();
        let vtx = ty.get_vertex(genv, &mut changes, &Substitution::default(), "t");
        changes.commit(&mut genv.graph);
        vtx
    }

    #[test]
    fn test_named_type_path() {
        let named = NamedType::path("::A::B");
        assert!(named.absolute);
        assert_eq!(named.namespace, vec!["A".to_string()]);
        assert_eq!(named.name, "B");
        assert_eq!(named.display_path(), "::A::B");
    }

    #[test]
    fn test_literals_and_bool() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default());
        let mut ty = TypeNode::Union(vec![
            TypeNode::Literal(SigLiteral::Symbol("ok".to_string())),
            TypeNode::Literal(SigLiteral::Integer(3)),
            TypeNode::Bool,
        ]);
        let vtx = eval(&mut genv, &mut ty).unwrap();
        assert_eq!(
            genv.graph.types(vtx),
            vec![
                Type::Symbol("ok".to_string()),
                genv.int_type(),
                genv.true_type(),
                genv.false_type()
            ]
        );
    }

    #[test]
    fn test_unmodeled_types_contribute_nothing() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default());
        for mut ty in [
            TypeNode::Void,
            TypeNode::Any,
            TypeNode::Top,
            TypeNode::Interface {
                name: "_Each".to_string(),
            },
            TypeNode::Intersection(vec![TypeNode::Nil]),
            TypeNode::Proc(Box::new(SigFunction::new(vec![], TypeNode::Nil))),
            TypeNode::Var("Unbound".to_string()),
            TypeNode::instance("Missing"),
        ] {
            let vtx = eval(&mut genv, &mut ty).unwrap();
            assert!(genv.graph.types(vtx).is_empty(), "{ty:?}");
        }
    }

    #[test]
    fn test_strict_mode_rejects_proc() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default().strict());
        let mut ty = TypeNode::Proc(Box::new(SigFunction::new(vec![], TypeNode::Nil)));
        assert_eq!(
            eval(&mut genv, &mut ty),
            Err(AnalysisError::Unsupported("proc".to_string()))
        );
    }

    #[test]
    fn test_base_instance_is_unsupported() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default());
        assert!(matches!(
            eval(&mut genv, &mut TypeNode::BaseInstance),
            Err(AnalysisError::Unsupported(_))
        ));
    }

    #[test]
    fn test_generic_arity() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default());
        let mut ty = TypeNode::generic("Hash", vec![TypeNode::Nil]);
        assert_eq!(
            eval(&mut genv, &mut ty),
            Err(AnalysisError::GenericArity {
                path: "Hash".to_string(),
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_tuple_unifies_elements() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default());
        let mut ty =
            TypeNode::Tuple(vec![TypeNode::instance("Integer"), TypeNode::instance("String")]);
        let vtx = eval(&mut genv, &mut ty).unwrap();

        let types = genv.graph.types(vtx);
        let [Type::Array {
            elems: Some(elems),
            unified,
            ..
        }] = types.as_slice()
        else {
            panic!("expected a tuple, got {types:?}");
        };
        assert_eq!(genv.graph.types(elems[0]), vec![genv.int_type()]);
        assert_eq!(genv.graph.types(*unified), vec![genv.int_type(), genv.str_type()]);
    }

    #[test]
    fn test_recursive_alias_terminates() {
        let mut genv = GlobalEnv::new(AnalyzerConfig::default());
        let object = genv.builtins.object;
        let cref = CRef::toplevel();
        // type list = [Integer, list] | nil
        let body = TypeNode::Union(vec![
            TypeNode::Tuple(vec![
                TypeNode::instance("Integer"),
                TypeNode::Alias(NamedType::new("list")),
            ]),
            TypeNode::Nil,
        ]);
        genv.add_type_alias_decl(object, "list", NodeId(1), &cref, body);

        let mut ty = TypeNode::Alias(NamedType::new("list"));
        let vtx = eval(&mut genv, &mut ty).unwrap();
        let types = genv.graph.types(vtx);
        assert_eq!(types.len(), 2);
        assert!(types.contains(&genv.nil_type()));

        let Some(Type::Array { elems: Some(elems), .. }) = types.first() else {
            panic!("expected a tuple first, got {types:?}");
        };
        assert_eq!(genv.graph.types(elems[1]), types);
    }
}
