//! Module registry: classes, modules, constants and type aliases
//!
//! Every mutation of a module (constant added or removed, alias declared,
//! superclass changed) re-queues the static reads registered against the
//! touched name so their resolution is recomputed.

use super::method::MethodEntity;
use super::static_read::Follower;
use super::{GlobalEnv, StaticEvalItem};
use crate::ids::{ModuleId, NodeId, StaticReadId, VertexId};
use crate::sig::TypeNode;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Fully qualified constant path; the empty path is the root (`Object`)
pub type CPath = Vec<String>;

/// Name of the root class as a constant of itself
pub const OBJECT: &str = "Object";

/// Canonical form of a path: `Object::A` names the same module as `A`
pub(crate) fn cpath_key<S: AsRef<str>>(cpath: &[S]) -> CPath {
    cpath
        .iter()
        .map(|s| s.as_ref())
        .skip_while(|&s| s == OBJECT)
        .map(str::to_string)
        .collect()
}

/// Immutable lexical scope chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CRef {
    pub cpath: CPath,
    /// Inside `class << self` or a singleton method body
    pub singleton: bool,
    pub outer: Option<Rc<CRef>>,
}

impl CRef {
    pub fn new(cpath: CPath, singleton: bool, outer: Option<Rc<CRef>>) -> Rc<Self> {
        Rc::new(Self {
            cpath,
            singleton,
            outer,
        })
    }

    pub fn toplevel() -> Rc<Self> {
        Self::new(Vec::new(), false, None)
    }

    /// Scope of a class or module body nested inside `self`
    pub fn nested(self: &Rc<Self>, name: &str) -> Rc<Self> {
        let mut cpath = self.cpath.clone();
        cpath.push(name.to_string());
        Self::new(cpath, false, Some(Rc::clone(self)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Class,
    Module,
}

/// Everything that currently defines one constant name inside a module
#[derive(Debug, Clone, Default)]
pub struct ConstEntity {
    /// Class/module declarations named by this constant
    pub(crate) module_decls: IndexSet<NodeId>,
    /// Signature declarations (`X: Integer`)
    pub(crate) decls: IndexMap<NodeId, Rc<TypeNode>>,
    /// Assignments in the program, with the vertex of the assigned value
    pub(crate) defs: IndexMap<NodeId, VertexId>,
}

impl ConstEntity {
    pub fn exist(&self) -> bool {
        !self.module_decls.is_empty() || !self.decls.is_empty() || !self.defs.is_empty()
    }

    pub fn decls(&self) -> impl Iterator<Item = (NodeId, &Rc<TypeNode>)> {
        self.decls.iter().map(|(&node, ty)| (node, ty))
    }

    pub fn defs(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.defs.values().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeAliasEntity {
    pub(crate) decls: IndexMap<NodeId, Rc<TypeNode>>,
}

impl TypeAliasEntity {
    pub fn exist(&self) -> bool {
        !self.decls.is_empty()
    }

    /// The type the alias currently stands for
    pub fn first_type(&self) -> Option<Rc<TypeNode>> {
        self.decls.values().next().cloned()
    }
}

#[derive(Debug)]
pub struct ModuleEntity {
    pub cpath: CPath,
    pub kind: ModuleKind,
    pub(crate) decls: IndexSet<NodeId>,
    pub(crate) consts: IndexMap<String, ConstEntity>,
    pub(crate) type_aliases: IndexMap<String, TypeAliasEntity>,
    /// Static reads that visited this module, per name they look for
    pub(crate) static_reads: IndexMap<String, IndexSet<StaticReadId>>,
    pub(crate) superclass: Option<ModuleId>,
    pub(crate) superclass_read: Option<StaticReadId>,
    pub(crate) default_superclass: Option<ModuleId>,
    pub(crate) subclasses: IndexSet<ModuleId>,
    pub(crate) type_params: Vec<String>,
    pub(crate) instance_methods: IndexMap<String, MethodEntity>,
    pub(crate) singleton_methods: IndexMap<String, MethodEntity>,
}

impl ModuleEntity {
    fn new(cpath: CPath) -> Self {
        Self {
            cpath,
            kind: ModuleKind::Module,
            decls: IndexSet::new(),
            consts: IndexMap::new(),
            type_aliases: IndexMap::new(),
            static_reads: IndexMap::new(),
            superclass: None,
            superclass_read: None,
            default_superclass: None,
            subclasses: IndexSet::new(),
            type_params: Vec::new(),
            instance_methods: IndexMap::new(),
            singleton_methods: IndexMap::new(),
        }
    }

    /// Declared somewhere, as opposed to merely referenced
    pub fn exist(&self) -> bool {
        !self.decls.is_empty()
    }

    pub fn superclass(&self) -> Option<ModuleId> {
        self.superclass
    }

    pub fn subclasses(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.subclasses.iter().copied()
    }

    pub fn constant(&self, name: &str) -> Option<&ConstEntity> {
        self.consts.get(name)
    }

    pub fn type_alias(&self, name: &str) -> Option<&TypeAliasEntity> {
        self.type_aliases.get(name)
    }

    pub fn type_params(&self) -> &[String] {
        &self.type_params
    }

    pub fn static_reads(&self, name: &str) -> impl Iterator<Item = StaticReadId> + '_ {
        self.static_reads.get(name).into_iter().flatten().copied()
    }

    pub(crate) fn methods(&self, singleton: bool) -> &IndexMap<String, MethodEntity> {
        if singleton {
            &self.singleton_methods
        } else {
            &self.instance_methods
        }
    }

    pub(crate) fn methods_mut(&mut self, singleton: bool) -> &mut IndexMap<String, MethodEntity> {
        if singleton {
            &mut self.singleton_methods
        } else {
            &mut self.instance_methods
        }
    }
}

impl GlobalEnv {
    /// The entity behind a handle. Module handles are never freed.
    pub fn module(&self, id: ModuleId) -> &ModuleEntity {
        &self.modules[id.0]
    }

    /// The entity for a path if one was ever created
    pub fn lookup_cpath<S: AsRef<str>>(&self, cpath: &[S]) -> Option<ModuleId> {
        self.module_index.get(&cpath_key(cpath)).copied()
    }

    /// The entity for a path, created on first use
    pub fn resolve_cpath<S: AsRef<str>>(&mut self, cpath: &[S]) -> ModuleId {
        let key = cpath_key(cpath);
        if let Some(&id) = self.module_index.get(&key) {
            return id;
        }
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleEntity::new(key.clone()));
        self.module_index.insert(key, id);
        id
    }

    pub fn resolve_type_alias<S: AsRef<str>>(
        &mut self,
        cpath: &[S],
        name: &str,
    ) -> Option<&TypeAliasEntity> {
        let module = self.resolve_cpath(cpath);
        self.modules[module.0].type_aliases.get(name)
    }

    pub fn module_name(&self, id: ModuleId) -> String {
        let cpath = &self.modules[id.0].cpath;
        if cpath.is_empty() {
            "Object".to_string()
        } else {
            cpath.join("::")
        }
    }

    /// Declare a class or module body at `cpath`
    pub fn add_module_decl<S: AsRef<str>>(
        &mut self,
        cpath: &[S],
        kind: ModuleKind,
        node: NodeId,
    ) -> ModuleId {
        let id = self.resolve_cpath(cpath);
        let became_class = {
            let entity = &mut self.modules[id.0];
            entity.decls.insert(node);
            let became_class = kind == ModuleKind::Class && entity.kind != ModuleKind::Class;
            if became_class {
                entity.kind = ModuleKind::Class;
            }
            became_class
        };
        if became_class {
            let default = if id == self.builtins.basic_object {
                None
            } else if id == self.builtins.object {
                Some(self.builtins.basic_object)
            } else {
                Some(self.builtins.object)
            };
            self.modules[id.0].default_superclass = default;
            self.on_parent_modules_changed(id);
        }

        if let Some((name, parent_path)) = cpath.split_last() {
            let parent = self.resolve_cpath(parent_path);
            let name = name.as_ref().to_string();
            self.modules[parent.0]
                .consts
                .entry(name.clone())
                .or_default()
                .module_decls
                .insert(node);
            self.on_const_changed(parent, &name);
        }
        debug!(module = %self.module_name(id), ?kind, "module declared");
        id
    }

    pub fn remove_module_decl<S: AsRef<str>>(&mut self, cpath: &[S], node: NodeId) {
        let id = self.resolve_cpath(cpath);
        self.modules[id.0].decls.swap_remove(&node);
        if let Some((name, parent_path)) = cpath.split_last() {
            let parent = self.resolve_cpath(parent_path);
            let name = name.as_ref().to_string();
            if let Some(cdef) = self.modules[parent.0].consts.get_mut(&name) {
                cdef.module_decls.swap_remove(&node);
            }
            self.on_const_changed(parent, &name);
        }
    }

    /// Constant assignment `name = value` inside `module`
    pub fn add_const_def(&mut self, module: ModuleId, name: &str, node: NodeId, value: VertexId) {
        self.modules[module.0]
            .consts
            .entry(name.to_string())
            .or_default()
            .defs
            .insert(node, value);
        self.on_const_changed(module, name);
    }

    pub fn remove_const_def(&mut self, module: ModuleId, name: &str, node: NodeId) {
        if let Some(cdef) = self.modules[module.0].consts.get_mut(name) {
            cdef.defs.swap_remove(&node);
        }
        self.on_const_changed(module, name);
    }

    /// Constant declared with a signature type (`name: type`)
    pub fn add_const_decl(
        &mut self,
        module: ModuleId,
        name: &str,
        node: NodeId,
        cref: &Rc<CRef>,
        mut ty: TypeNode,
    ) {
        ty.define(self, cref);
        let previous = self.modules[module.0]
            .consts
            .entry(name.to_string())
            .or_default()
            .decls
            .insert(node, Rc::new(ty));
        if let Some(previous) = previous {
            previous.undefine(self);
        }
        self.on_const_changed(module, name);
    }

    pub fn remove_const_decl(&mut self, module: ModuleId, name: &str, node: NodeId) {
        let removed = self.modules[module.0]
            .consts
            .get_mut(name)
            .and_then(|cdef| cdef.decls.shift_remove(&node));
        if let Some(ty) = removed {
            ty.undefine(self);
        }
        self.on_const_changed(module, name);
    }

    pub fn add_type_alias_decl(
        &mut self,
        module: ModuleId,
        name: &str,
        node: NodeId,
        cref: &Rc<CRef>,
        mut ty: TypeNode,
    ) {
        ty.define(self, cref);
        let previous = self.modules[module.0]
            .type_aliases
            .entry(name.to_string())
            .or_default()
            .decls
            .insert(node, Rc::new(ty));
        if let Some(previous) = previous {
            previous.undefine(self);
        }
        self.on_const_changed(module, name);
    }

    pub fn remove_type_alias_decl(&mut self, module: ModuleId, name: &str, node: NodeId) {
        let removed = self.modules[module.0]
            .type_aliases
            .get_mut(name)
            .and_then(|alias| alias.decls.shift_remove(&node));
        if let Some(ty) = removed {
            ty.undefine(self);
        }
        self.on_const_changed(module, name);
    }

    /// Attach the static read naming the superclass of a class declaration
    pub fn set_superclass_read(&mut self, module: ModuleId, read: Option<StaticReadId>) {
        if let Some(old) = self.modules[module.0].superclass_read {
            self.remove_static_read_follower(old, Follower::Module(module));
        }
        self.modules[module.0].superclass_read = read;
        if let Some(read) = read {
            self.add_static_read_follower(read, Follower::Module(module));
        }
        self.add_static_eval_queue(StaticEvalItem::ParentModulesChanged(module));
    }

    /// Superclass used while no superclass read resolves
    pub fn set_default_superclass(&mut self, module: ModuleId, superclass: Option<ModuleId>) {
        self.modules[module.0].default_superclass = superclass;
        self.on_parent_modules_changed(module);
    }

    /// Names bound to the type arguments of instances of `module`
    pub fn set_type_params(&mut self, module: ModuleId, params: Vec<String>) {
        self.modules[module.0].type_params = params;
    }

    fn compute_superclass(&mut self, module: ModuleId) -> Option<ModuleId> {
        let entity = &self.modules[module.0];
        if entity.kind != ModuleKind::Class {
            return None;
        }
        let default = entity.default_superclass;
        match entity.superclass_read.and_then(|read| self.const_read_cpath(read)) {
            Some(cpath) => {
                let superclass = self.resolve_cpath(&cpath);
                if superclass == module {
                    default
                } else {
                    Some(superclass)
                }
            }
            None => default,
        }
    }

    pub(crate) fn on_parent_modules_changed(&mut self, module: ModuleId) {
        let new = self.compute_superclass(module);
        let old = self.modules[module.0].superclass;
        if new == old {
            return;
        }
        if let Some(old) = old {
            self.modules[old.0].subclasses.swap_remove(&module);
        }
        if let Some(new) = new {
            self.modules[new.0].subclasses.insert(module);
        }
        self.modules[module.0].superclass = new;
        debug!(
            module = %self.module_name(module),
            superclass = ?new.map(|m| self.module_name(m)),
            "superclass changed"
        );
        self.invalidate_hierarchy(module);
    }

    /// Re-queue every static read and call site that depends on the ancestry
    /// of `module` or of one of its descendants
    fn invalidate_hierarchy(&mut self, module: ModuleId) {
        let mut visited = HashSet::new();
        let mut stack = vec![module];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let entity = &self.modules[current.0];
            let reads: Vec<StaticReadId> =
                entity.static_reads.values().flatten().copied().collect();
            let sites: Vec<_> = entity
                .instance_methods
                .values()
                .chain(entity.singleton_methods.values())
                .flat_map(|me| me.callsites())
                .collect();
            stack.extend(entity.subclasses.iter().copied());

            for read in reads {
                self.add_static_eval_queue(StaticEvalItem::ReadChanged(read));
            }
            for site in sites {
                self.add_run(site);
            }
        }
    }

    fn on_const_changed(&mut self, module: ModuleId, name: &str) {
        let reads: Vec<StaticReadId> = self.modules[module.0].static_reads(name).collect();
        for read in reads {
            self.add_static_eval_queue(StaticEvalItem::ReadChanged(read));
            // the resolution may stay the same while what it points to changed
            if self.static_read_targets(read, module, name) {
                self.propagate_static_read(read);
            }
        }
    }
}
