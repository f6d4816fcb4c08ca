//! Runnable dependents: method calls, constant reads and `is_a?` filters
//!
//! A site is re-run whenever one of its watched vertices gains a type or a
//! static read or method entity it consulted changes. Each run rebuilds the
//! site's edges through its [`ChangeSet`].

use super::method::{MethodDecl, MethodDef};
use super::static_read::Follower;
use super::GlobalEnv;
use crate::error::Result;
use crate::graph::ChangeSet;
use crate::ids::{ModuleId, NodeId, SiteId, StaticReadId, VertexId};
use crate::sig::Substitution;
use crate::types::Type;
use indexmap::IndexSet;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Alias chains longer than this are treated as unresolved
const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct CallSite {
    pub recv: VertexId,
    pub mid: String,
    pub args: Vec<VertexId>,
    pub block: Option<VertexId>,
    pub ret: VertexId,
}

/// Reads the value of a constant into `ret`
#[derive(Debug, Clone)]
pub struct ConstReadSite {
    pub read: StaticReadId,
    pub ret: VertexId,
}

/// Narrows `input` to the types that are (or, negated, are not) instances
/// of the module `read` resolves to
#[derive(Debug, Clone)]
pub struct IsAFilter {
    pub input: VertexId,
    pub read: StaticReadId,
    pub output: VertexId,
    pub negated: bool,
}

#[derive(Debug, Clone)]
pub enum SiteKind {
    Call(CallSite),
    ConstRead(ConstReadSite),
    IsA(IsAFilter),
}

#[derive(Debug)]
pub struct Site {
    pub node: NodeId,
    pub kind: SiteKind,
    changes: ChangeSet,
    /// Method entities this site registered itself on
    method_refs: IndexSet<(ModuleId, bool, String)>,
    runs: usize,
}

impl Site {
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }
}

impl GlobalEnv {
    /// `None` once the site was removed
    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(id.0).and_then(Option::as_ref)
    }

    fn push_site(&mut self, node: NodeId, kind: SiteKind) -> SiteId {
        let id = SiteId(self.sites.len());
        self.sites.push(Some(Site {
            node,
            kind,
            changes: ChangeSet::new(Some(id), node),
            method_refs: IndexSet::new(),
            runs: 0,
        }));
        id
    }

    /// Register a call and schedule its first run. It re-runs whenever the
    /// receiver, an argument or the block gains a type.
    pub fn add_call_site(&mut self, node: NodeId, call: CallSite) -> SiteId {
        let watched: Vec<VertexId> = std::iter::once(call.recv)
            .chain(call.args.iter().copied())
            .chain(call.block)
            .collect();
        let id = self.push_site(node, SiteKind::Call(call));
        for vertex in watched {
            self.graph.watch(vertex, id);
        }
        self.add_run(id);
        id
    }

    /// Site delivering the value of the constant `read` resolves to into `ret`
    pub fn add_const_read_site(
        &mut self,
        node: NodeId,
        read: StaticReadId,
        ret: VertexId,
    ) -> SiteId {
        let id = self.push_site(node, SiteKind::ConstRead(ConstReadSite { read, ret }));
        self.add_static_read_follower(read, Follower::Site(id));
        self.add_run(id);
        id
    }

    pub fn add_is_a_filter(&mut self, node: NodeId, filter: IsAFilter) -> SiteId {
        let (input, read) = (filter.input, filter.read);
        let id = self.push_site(node, SiteKind::IsA(filter));
        self.graph.watch(input, id);
        self.add_static_read_follower(read, Follower::Site(id));
        self.add_run(id);
        id
    }

    /// Retire everything the site installed and stop scheduling it
    pub fn remove_site(&mut self, id: SiteId) {
        let Some(mut site) = self.sites.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        site.changes.retire(&mut self.graph);
        match &site.kind {
            SiteKind::Call(call) => {
                let watched = std::iter::once(call.recv)
                    .chain(call.args.iter().copied())
                    .chain(call.block);
                for vertex in watched {
                    self.graph.unwatch(vertex, id);
                }
            }
            SiteKind::ConstRead(read) => {
                self.remove_static_read_follower(read.read, Follower::Site(id))
            }
            SiteKind::IsA(filter) => {
                self.graph.unwatch(filter.input, id);
                self.remove_static_read_follower(filter.read, Follower::Site(id));
            }
        }
        for (module, singleton, name) in site.method_refs {
            self.method_entity_mut(module, singleton, &name).remove_callsite(id);
        }
        self.in_run_queue.remove(&id);
    }

    /// Re-run a site. Returns whether its installed edges changed.
    pub(crate) fn run_site(&mut self, id: SiteId) -> Result<bool> {
        let Some(site) = self.sites.get_mut(id.0).and_then(Option::as_mut) else {
            return Ok(false);
        };
        site.runs += 1;
        let kind = site.kind.clone();
        let mut changes = std::mem::take(&mut site.changes);

        changes.begin();
        let result = match &kind {
            SiteKind::Call(call) => self.run_call_site(id, call, &mut changes),
            SiteKind::ConstRead(read) => self.run_const_read_site(read, &mut changes),
            SiteKind::IsA(filter) => self.run_is_a_filter(filter, &mut changes),
        };
        let changed = changes.commit(&mut self.graph);
        debug!(%id, changed, vertices = changes.vertex_count(), "site ran");

        if let Some(site) = self.sites.get_mut(id.0).and_then(Option::as_mut) {
            site.changes = changes;
        }
        result.map(|()| changed)
    }

    fn run_call_site(
        &mut self,
        id: SiteId,
        call: &CallSite,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        for (i, recv) in self.graph.types(call.recv).iter().enumerate() {
            let key = format!("r{i}");
            let self_vtx = changes.new_vertex(&mut self.graph, format!("{key}/self"), "self");
            changes.add_source(&mut self.graph, vec![recv.clone()], self_vtx);
            let mut subst = Substitution::with_self(self_vtx);
            self.bind_receiver_params(recv, &mut subst);
            self.dispatch(id, call, recv, &call.mid, &subst, changes, &key, 0)?;
        }
        Ok(())
    }

    /// Bind the type parameters of the receiver's module to its argument
    /// vertices (`Array[Elem]`, `Hash[K, V]`)
    fn bind_receiver_params(&self, recv: &Type, subst: &mut Substitution) {
        let (module, args): (ModuleId, Vec<VertexId>) = match recv {
            Type::Instance { module, args } => (*module, args.to_vec()),
            Type::Array { unified, base, .. } => (*base, vec![*unified]),
            Type::Hash { key, value, base } => (*base, vec![*key, *value]),
            _ => return,
        };
        for (param, vtx) in self.module(module).type_params().iter().zip(args) {
            subst.bind(param, vtx);
        }
    }

    /// Modules searched for a method of `recv`, with the singleton flag
    fn method_lookup_chain(&self, recv: &Type) -> Vec<(ModuleId, bool)> {
        let mut chain = Vec::new();
        if let Type::Module { module, .. } = recv {
            chain.extend(self.ancestors(*module).into_iter().map(|m| (m, true)));
        }
        if let Some(base) = recv.base_module(self) {
            chain.extend(self.ancestors(base).into_iter().map(|m| (m, false)));
        }
        chain
    }

    fn ancestors(&self, module: ModuleId) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(module);
        while let Some(m) = current {
            if !visited.insert(m) {
                break;
            }
            chain.push(m);
            current = self.module(m).superclass();
        }
        chain
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &mut self,
        id: SiteId,
        call: &CallSite,
        recv: &Type,
        mid: &str,
        subst: &Substitution,
        changes: &mut ChangeSet,
        key: &str,
        depth: usize,
    ) -> Result<()> {
        for (module, singleton) in self.method_lookup_chain(recv) {
            self.register_callsite(id, module, singleton, mid);
            let Some(me) = self.method_entity(module, singleton, mid).filter(|me| me.exist()) else {
                continue;
            };
            let builtin = me.builtin;
            let decls: Vec<Rc<MethodDecl>> = me.decls().cloned().collect();
            let defs: Vec<MethodDef> = me.defs().cloned().collect();
            let aliases: Vec<String> = me.aliases().map(str::to_string).collect();

            if let Some(builtin) = builtin {
                if builtin.run(self, changes, recv, call, key) {
                    return Ok(());
                }
            }
            for (j, decl) in decls.iter().enumerate() {
                let key = format!("{key}/d{j}");
                let (args, block, ret) = (&call.args, call.block, call.ret);
                decl.resolve_overloads(self, changes, subst, args, block, ret, &key)?;
            }
            for def in &defs {
                if call.args.len() == def.f_args.len() {
                    for (&a_arg, &f_arg) in call.args.iter().zip(&def.f_args) {
                        changes.add_edge(&mut self.graph, a_arg, f_arg);
                    }
                }
                if let (Some(a_block), Some(f_block)) = (call.block, def.block) {
                    changes.add_edge(&mut self.graph, a_block, f_block);
                }
                changes.add_edge(&mut self.graph, def.ret, call.ret);
            }
            if decls.is_empty() && defs.is_empty() && depth < MAX_ALIAS_DEPTH {
                for old in aliases {
                    let key = format!("{key}/alias:{old}");
                    self.dispatch(id, call, recv, &old, subst, changes, &key, depth + 1)?;
                }
            }
            return Ok(());
        }
        debug!(site = %id, %mid, "no method found");
        Ok(())
    }

    fn register_callsite(&mut self, id: SiteId, module: ModuleId, singleton: bool, mid: &str) {
        self.method_entity_mut(module, singleton, mid).add_callsite(id);
        if let Some(site) = self.sites.get_mut(id.0).and_then(Option::as_mut) {
            site.method_refs.insert((module, singleton, mid.to_string()));
        }
    }

    fn run_const_read_site(&mut self, site: &ConstReadSite, changes: &mut ChangeSet) -> Result<()> {
        if let Some(module) = self.const_read_module(site.read) {
            let vtx = changes.new_vertex(&mut self.graph, format!("module:{module}"), "const");
            changes.add_source(&mut self.graph, vec![Type::module(module)], vtx);
            changes.add_edge(&mut self.graph, vtx, site.ret);
            return Ok(());
        }
        let Some(cdef) = self.const_read_cdef(site.read) else {
            return Ok(());
        };
        let Some(entity) = self.module(cdef.module).constant(&cdef.name).cloned() else {
            return Ok(());
        };
        for (node, ty) in entity.decls() {
            let subst = Substitution::default();
            let vtx = ty.get_vertex(self, changes, &subst, &format!("decl:{node}"))?;
            changes.add_edge(&mut self.graph, vtx, site.ret);
        }
        for value in entity.defs() {
            changes.add_edge(&mut self.graph, value, site.ret);
        }
        Ok(())
    }

    fn run_is_a_filter(&mut self, filter: &IsAFilter, changes: &mut ChangeSet) -> Result<()> {
        let target = self.const_read_module(filter.read);
        let passing: Vec<Type> = self
            .graph
            .types(filter.input)
            .into_iter()
            .filter(|ty| {
                let hit = target.is_some_and(|t| {
                    ty.base_module(self).is_some_and(|m| self.is_ancestor(t, m))
                });
                hit != filter.negated
            })
            .collect();

        let key = match target {
            Some(module) => format!("pass:{module}"),
            None => "pass".to_string(),
        };
        let vtx = changes.new_vertex(&mut self.graph, key, "is_a");
        changes.add_source(&mut self.graph, passing, vtx);
        changes.add_edge(&mut self.graph, vtx, filter.output);
        Ok(())
    }
}
