//! Method registry and overload matching

use super::builtin::Builtin;
use super::module::CRef;
use super::GlobalEnv;
use crate::error::Result;
use crate::graph::ChangeSet;
use crate::ids::{ModuleId, NodeId, SiteId, VertexId};
use crate::sig::{SigFunction, Substitution, TypeNode};
use crate::types::Type;
use indexmap::{IndexMap, IndexSet};
use std::rc::Rc;
use tracing::debug;

/// Everything known about one method name of one module
#[derive(Debug, Clone, Default)]
pub struct MethodEntity {
    pub builtin: Option<Builtin>,
    decls: IndexMap<NodeId, Rc<MethodDecl>>,
    defs: IndexMap<NodeId, MethodDef>,
    /// Alias node -> name of the aliased method
    aliases: IndexMap<NodeId, String>,
    callsites: IndexSet<SiteId>,
}

impl MethodEntity {
    /// Whether anything answers to this name in this module
    pub fn exist(&self) -> bool {
        self.builtin.is_some()
            || !self.decls.is_empty()
            || !self.defs.is_empty()
            || !self.aliases.is_empty()
    }

    /// Declared signatures, in declaration order
    pub fn decls(&self) -> impl Iterator<Item = &Rc<MethodDecl>> {
        self.decls.values()
    }

    /// Definitions found in the program
    pub fn defs(&self) -> impl Iterator<Item = &MethodDef> {
        self.defs.values()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.values().map(String::as_str)
    }

    /// Sites that looked this name up here and must re-run when it changes
    pub fn callsites(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.callsites.iter().copied()
    }

    pub(crate) fn add_callsite(&mut self, site: SiteId) {
        self.callsites.insert(site);
    }

    pub(crate) fn remove_callsite(&mut self, site: SiteId) {
        self.callsites.swap_remove(&site);
    }
}

/// One declared signature of a method, possibly overloaded
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub node: NodeId,
    pub overloads: Vec<Overload>,
}

#[derive(Debug, Clone)]
pub struct Overload {
    /// Method-local type parameters (`[T] (T) -> T`)
    pub type_params: Vec<String>,
    pub function: SigFunction,
    pub block: Option<SigFunction>,
}

impl Overload {
    pub fn new(function: SigFunction) -> Self {
        Self {
            type_params: Vec::new(),
            function,
            block: None,
        }
    }

    pub fn with_type_params<S: Into<String>>(
        mut self,
        params: impl IntoIterator<Item = S>,
    ) -> Self {
        self.type_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_block(mut self, block: SigFunction) -> Self {
        self.block = Some(block);
        self
    }
}

/// Method defined in the program, with the vertices of its formals
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub node: NodeId,
    pub f_args: Vec<VertexId>,
    pub block: Option<VertexId>,
    pub ret: VertexId,
}

/// Block argument of a call, referred to by `Type::Proc`
#[derive(Debug, Clone)]
pub struct Block {
    pub node: NodeId,
    pub f_args: Vec<VertexId>,
    pub ret: VertexId,
}

impl MethodDecl {
    pub fn new(node: NodeId, overloads: Vec<Overload>) -> Self {
        Self { node, overloads }
    }

    pub fn define(&mut self, genv: &mut GlobalEnv, cref: &Rc<CRef>) {
        for overload in &mut self.overloads {
            overload.function.define(genv, cref);
            if let Some(block) = &mut overload.block {
                block.define(genv, cref);
            }
        }
    }

    pub fn undefine(&self, genv: &mut GlobalEnv) {
        for overload in &self.overloads {
            overload.function.undefine(genv);
            if let Some(block) = &overload.block {
                block.undefine(genv);
            }
        }
    }

    /// Wire the return type of every overload compatible with the actual
    /// arguments into `ret`. Returns whether any overload matched.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_overloads(
        &self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        subst: &Substitution,
        actual_args: &[VertexId],
        actual_block: Option<VertexId>,
        ret: VertexId,
        key: &str,
    ) -> Result<bool> {
        let mut matched = false;
        for (i, overload) in self.overloads.iter().enumerate() {
            let key = format!("{key}/o{i}");
            let mut subst = subst.clone();
            for param in &overload.type_params {
                let label = format!("type-param:{param}");
                let vtx = changes.new_vertex(&mut genv.graph, format!("{key}/tp:{param}"), &label);
                subst.bind(param, vtx);
            }

            let formals = &overload.function.required_positionals;
            if actual_args.len() != formals.len() {
                debug!(decl = %self.node, overload = i, "arity mismatch");
                continue;
            }
            let mut f_args = Vec::with_capacity(formals.len());
            for (j, formal) in formals.iter().enumerate() {
                f_args.push(formal.materialize(genv, changes, &subst, &format!("{key}/arg{j}"))?);
            }
            // interface types
            let Some(f_args) = f_args.into_iter().collect::<Option<Vec<_>>>() else {
                continue;
            };
            let local_var = |formal: &TypeNode| {
                formal
                    .as_var()
                    .is_some_and(|name| overload.type_params.iter().any(|p| p == name))
            };
            let compatible = formals
                .iter()
                .zip(actual_args.iter().zip(&f_args))
                .all(|(formal, (&a_arg, &f_arg))| {
                    local_var(formal) || genv.vertex_matches(a_arg, f_arg)
                });
            if !compatible {
                debug!(decl = %self.node, overload = i, "argument types rejected");
                continue;
            }

            match (&overload.block, actual_block) {
                (None, None) => {}
                (Some(formal_block), Some(actual_block)) => {
                    wire_block(genv, changes, formal_block, actual_block, &subst, &key)?;
                }
                _ => {
                    debug!(decl = %self.node, overload = i, "block mismatch");
                    continue;
                }
            }

            // method type parameters learn from the arguments bound to them
            for (formal, (&a_arg, &f_arg)) in formals.iter().zip(actual_args.iter().zip(&f_args)) {
                if local_var(formal) {
                    changes.add_edge(&mut genv.graph, a_arg, f_arg);
                }
            }

            let ret_key = format!("{key}/ret");
            let ret_vtx =
                overload.function.return_type.get_vertex(genv, changes, &subst, &ret_key)?;
            changes.add_edge(&mut genv.graph, ret_vtx, ret);
            debug!(decl = %self.node, overload = i, "overload matched");
            matched = true;
        }
        Ok(matched)
    }
}

fn wire_block(
    genv: &mut GlobalEnv,
    changes: &mut ChangeSet,
    formal: &SigFunction,
    actual: VertexId,
    subst: &Substitution,
    key: &str,
) -> Result<()> {
    for ty in genv.graph.types(actual) {
        let Type::Proc(block_id) = ty else {
            continue;
        };
        let Some(block) = genv.block(block_id).cloned() else {
            continue;
        };
        if block.f_args.len() != formal.required_positionals.len() {
            continue;
        }
        let key = format!("{key}/{block_id}");
        let params = formal.required_positionals.iter().zip(&block.f_args);
        for (j, (param, &f_arg)) in params.enumerate() {
            if let Some(param) = param.materialize(genv, changes, subst, &format!("{key}/p{j}"))? {
                changes.add_edge(&mut genv.graph, param, f_arg);
            }
        }
        let formal_ret =
            formal.return_type.get_vertex(genv, changes, subst, &format!("{key}/ret"))?;
        changes.add_edge(&mut genv.graph, block.ret, formal_ret);
    }
    Ok(())
}

impl GlobalEnv {
    pub fn method_entity(
        &self,
        module: ModuleId,
        singleton: bool,
        name: &str,
    ) -> Option<&MethodEntity> {
        self.modules[module.0].methods(singleton).get(name)
    }

    pub(crate) fn method_entity_mut(
        &mut self,
        module: ModuleId,
        singleton: bool,
        name: &str,
    ) -> &mut MethodEntity {
        self.modules[module.0]
            .methods_mut(singleton)
            .entry(name.to_string())
            .or_default()
    }

    /// Register a signature; it replaces an earlier one from the same node
    pub fn add_method_decl(
        &mut self,
        module: ModuleId,
        singleton: bool,
        name: &str,
        cref: &Rc<CRef>,
        mut decl: MethodDecl,
    ) {
        decl.define(self, cref);
        let node = decl.node;
        let previous = self
            .method_entity_mut(module, singleton, name)
            .decls
            .insert(node, Rc::new(decl));
        if let Some(previous) = previous {
            previous.undefine(self);
        }
        self.add_run_all_callsites(module, singleton, name);
    }

    pub fn remove_method_decl(
        &mut self,
        module: ModuleId,
        singleton: bool,
        name: &str,
        node: NodeId,
    ) {
        let removed = self.method_entity_mut(module, singleton, name).decls.shift_remove(&node);
        if let Some(decl) = removed {
            decl.undefine(self);
        }
        self.add_run_all_callsites(module, singleton, name);
    }

    pub fn add_method_def(
        &mut self,
        module: ModuleId,
        singleton: bool,
        name: &str,
        def: MethodDef,
    ) {
        self.method_entity_mut(module, singleton, name).defs.insert(def.node, def);
        self.add_run_all_callsites(module, singleton, name);
    }

    pub fn remove_method_def(
        &mut self,
        module: ModuleId,
        singleton: bool,
        name: &str,
        node: NodeId,
    ) {
        self.method_entity_mut(module, singleton, name).defs.shift_remove(&node);
        self.add_run_all_callsites(module, singleton, name);
    }

    /// `alias new_name old_name`
    pub fn add_method_alias(
        &mut self,
        module: ModuleId,
        singleton: bool,
        new_name: &str,
        node: NodeId,
        old_name: &str,
    ) {
        self.method_entity_mut(module, singleton, new_name)
            .aliases
            .insert(node, old_name.to_string());
        self.add_run_all_callsites(module, singleton, new_name);
    }

    pub fn remove_method_alias(
        &mut self,
        module: ModuleId,
        singleton: bool,
        new_name: &str,
        node: NodeId,
    ) {
        self.method_entity_mut(module, singleton, new_name).aliases.shift_remove(&node);
        self.add_run_all_callsites(module, singleton, new_name);
    }

    pub fn set_builtin(&mut self, module: ModuleId, singleton: bool, name: &str, builtin: Builtin) {
        self.method_entity_mut(module, singleton, name).builtin = Some(builtin);
        self.add_run_all_callsites(module, singleton, name);
    }

    pub fn add_run_all_callsites(&mut self, module: ModuleId, singleton: bool, name: &str) {
        let sites: Vec<SiteId> = self
            .method_entity(module, singleton, name)
            .map(|me| me.callsites().collect())
            .unwrap_or_default();
        for site in sites {
            self.add_run(site);
        }
    }
}
