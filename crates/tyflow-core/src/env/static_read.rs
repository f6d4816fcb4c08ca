//! Incremental constant and type-alias resolution
//!
//! A [`StaticRead`] is one lookup of a name. Resolving it walks the lexical
//! scope chain, and for the innermost scope also the superclass chain,
//! registering the read on every module it visits. Any later mutation of one
//! of those modules re-queues the read. Followers are notified only when the
//! result actually changes.

use super::module::{cpath_key, CPath, CRef};
use super::{GlobalEnv, StaticEvalItem};
use crate::ids::{ModuleId, SiteId, StaticReadId};
use indexmap::IndexSet;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Dependent of a static read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Follower {
    /// A class whose superclass is named by the read
    Module(ModuleId),
    /// A scoped read (`A::B`) whose base is the read
    StaticRead(StaticReadId),
    Site(SiteId),
}

#[derive(Debug, Clone)]
pub enum ReadScope {
    /// Lookup starting from a lexical scope
    Base { cref: Rc<CRef> },
    /// Lookup inside whatever module another read resolved to
    Scoped { cbase: StaticReadId },
}

/// A named entry of a module: a constant or a type alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub module: ModuleId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPayload {
    Const {
        /// Path of the module the constant names, if it names one
        cpath: Option<CPath>,
        cdef: Option<EntityRef>,
    },
    TypeAlias { entity: Option<EntityRef> },
}

impl ReadPayload {
    fn unresolved(&self) -> Self {
        match self {
            ReadPayload::Const { .. } => ReadPayload::Const { cpath: None, cdef: None },
            ReadPayload::TypeAlias { .. } => ReadPayload::TypeAlias { entity: None },
        }
    }

    fn target(&self) -> Option<&EntityRef> {
        match self {
            ReadPayload::Const { cdef, .. } => cdef.as_ref(),
            ReadPayload::TypeAlias { entity } => entity.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticRead {
    pub name: String,
    pub(crate) followers: IndexSet<Follower>,
    /// Modules this read is currently registered on
    pub(crate) source_modules: IndexSet<ModuleId>,
    pub(crate) scope: ReadScope,
    pub(crate) payload: ReadPayload,
}

impl StaticRead {
    pub fn payload(&self) -> &ReadPayload {
        &self.payload
    }

    pub fn scope(&self) -> &ReadScope {
        &self.scope
    }

    pub fn followers(&self) -> impl Iterator<Item = Follower> + '_ {
        self.followers.iter().copied()
    }

    pub fn source_modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.source_modules.iter().copied()
    }
}

impl GlobalEnv {
    /// Read of `name` looked up lexically from `cref`, queued for resolution
    pub fn new_base_const_read(&mut self, cref: Rc<CRef>, name: &str) -> StaticReadId {
        let payload = ReadPayload::Const { cpath: None, cdef: None };
        self.push_static_read(name, ReadScope::Base { cref }, payload)
    }

    /// Read of `cbase::name`; re-resolved whenever `cbase` changes
    pub fn new_scoped_const_read(&mut self, cbase: StaticReadId, name: &str) -> StaticReadId {
        let payload = ReadPayload::Const { cpath: None, cdef: None };
        let id = self.push_static_read(name, ReadScope::Scoped { cbase }, payload);
        self.add_static_read_follower(cbase, Follower::StaticRead(id));
        id
    }

    pub fn new_base_type_alias_read(&mut self, cref: Rc<CRef>, name: &str) -> StaticReadId {
        let payload = ReadPayload::TypeAlias { entity: None };
        self.push_static_read(name, ReadScope::Base { cref }, payload)
    }

    pub fn new_scoped_type_alias_read(&mut self, cbase: StaticReadId, name: &str) -> StaticReadId {
        let payload = ReadPayload::TypeAlias { entity: None };
        let id = self.push_static_read(name, ReadScope::Scoped { cbase }, payload);
        self.add_static_read_follower(cbase, Follower::StaticRead(id));
        id
    }

    fn push_static_read(
        &mut self,
        name: &str,
        scope: ReadScope,
        payload: ReadPayload,
    ) -> StaticReadId {
        let id = StaticReadId(self.static_reads.len());
        self.static_reads.push(Some(StaticRead {
            name: name.to_string(),
            followers: IndexSet::new(),
            source_modules: IndexSet::new(),
            scope,
            payload,
        }));
        self.add_static_eval_queue(StaticEvalItem::ReadChanged(id));
        id
    }

    /// `None` once the read was dropped
    pub fn static_read(&self, id: StaticReadId) -> Option<&StaticRead> {
        self.static_reads.get(id.0).and_then(Option::as_ref)
    }

    fn static_read_mut(&mut self, id: StaticReadId) -> Option<&mut StaticRead> {
        self.static_reads.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Path of the module a constant read names, if it currently names one
    pub fn const_read_cpath(&self, id: StaticReadId) -> Option<CPath> {
        match self.static_read(id)?.payload {
            ReadPayload::Const { ref cpath, .. } => cpath.clone(),
            ReadPayload::TypeAlias { .. } => None,
        }
    }

    pub fn const_read_module(&self, id: StaticReadId) -> Option<ModuleId> {
        self.const_read_cpath(id).and_then(|cpath| self.lookup_cpath(&cpath))
    }

    pub fn const_read_cdef(&self, id: StaticReadId) -> Option<EntityRef> {
        match self.static_read(id)?.payload {
            ReadPayload::Const { ref cdef, .. } => cdef.clone(),
            ReadPayload::TypeAlias { .. } => None,
        }
    }

    pub fn type_alias_read_entity(&self, id: StaticReadId) -> Option<EntityRef> {
        match self.static_read(id)?.payload {
            ReadPayload::TypeAlias { ref entity } => entity.clone(),
            ReadPayload::Const { .. } => None,
        }
    }

    pub fn add_static_read_follower(&mut self, id: StaticReadId, follower: Follower) {
        if let Some(read) = self.static_read_mut(id) {
            read.followers.insert(follower);
        }
    }

    pub fn remove_static_read_follower(&mut self, id: StaticReadId, follower: Follower) {
        if let Some(read) = self.static_read_mut(id) {
            read.followers.swap_remove(&follower);
        }
    }

    /// Unregister the read from every module it visited
    pub fn destroy_static_read(&mut self, id: StaticReadId) {
        let Some(read) = self.static_read_mut(id) else {
            return;
        };
        let modules = std::mem::take(&mut read.source_modules);
        let name = read.name.clone();
        for module in modules {
            if let Some(reads) = self.modules[module.0].static_reads.get_mut(&name) {
                reads.swap_remove(&id);
            }
        }
    }

    /// Destroy the read and free its slot
    pub fn drop_static_read(&mut self, id: StaticReadId) {
        self.destroy_static_read(id);
        if let Some(read) = self.static_reads.get_mut(id.0).and_then(Option::take) {
            if let ReadScope::Scoped { cbase } = read.scope {
                self.remove_static_read_follower(cbase, Follower::StaticRead(id));
            }
        }
    }

    pub(crate) fn reresolve_static_read(&mut self, id: StaticReadId) {
        let Some(read) = self.static_read(id) else {
            return;
        };
        match read.scope.clone() {
            ReadScope::Base { cref } => self.resolve_static_read(id, &cref, false),
            ReadScope::Scoped { cbase } => match self.const_read_cpath(cbase) {
                Some(cpath) => {
                    let cref = CRef::new(cpath, false, None);
                    self.resolve_static_read(id, &cref, true);
                }
                None => {
                    self.destroy_static_read(id);
                    self.resolution_failed(id);
                }
            },
        }
    }

    fn resolve_static_read(&mut self, id: StaticReadId, cref: &Rc<CRef>, break_object: bool) {
        self.destroy_static_read(id);
        let Some(name) = self.static_read(id).map(|read| read.name.clone()) else {
            return;
        };

        let mut first = true;
        let mut current = Some(Rc::clone(cref));
        while let Some(scope) = current {
            let start = self.resolve_cpath(&scope.cpath);
            let mut module = Some(start);
            let mut visited = HashSet::new();
            while let Some(m) = module {
                // `A::X` does not see constants of `Object`, `Object::X` does
                if break_object && m == self.builtins.object && m != start {
                    break;
                }
                if !visited.insert(m) {
                    break;
                }
                self.register_static_read(m, &name, id);
                if self.check_module(id, m, &name) {
                    return;
                }
                // only the innermost lexical scope contributes its ancestors
                if !first || m == self.builtins.basic_object {
                    break;
                }
                module = self.modules[m.0].superclass;
            }
            first = false;
            current = scope.outer.clone();
        }
        self.resolution_failed(id);
    }

    fn register_static_read(&mut self, module: ModuleId, name: &str, id: StaticReadId) {
        self.modules[module.0]
            .static_reads
            .entry(name.to_string())
            .or_default()
            .insert(id);
        if let Some(read) = self.static_read_mut(id) {
            read.source_modules.insert(module);
        }
    }

    fn check_module(&mut self, id: StaticReadId, module: ModuleId, name: &str) -> bool {
        let Some(read) = self.static_read(id) else {
            return false;
        };
        let entity = &self.modules[module.0];
        let payload = match read.payload {
            ReadPayload::Const { .. } => {
                if !entity.constant(name).is_some_and(|cdef| cdef.exist()) {
                    return false;
                }
                let mut path = entity.cpath.clone();
                path.push(name.to_string());
                let path = cpath_key(&path);
                let cpath = self
                    .lookup_cpath(&path)
                    .filter(|&inner| self.modules[inner.0].exist())
                    .map(|_| path);
                ReadPayload::Const {
                    cpath,
                    cdef: Some(EntityRef {
                        module,
                        name: name.to_string(),
                    }),
                }
            }
            ReadPayload::TypeAlias { .. } => {
                if !entity.type_alias(name).is_some_and(|alias| alias.exist()) {
                    return false;
                }
                ReadPayload::TypeAlias {
                    entity: Some(EntityRef {
                        module,
                        name: name.to_string(),
                    }),
                }
            }
        };
        self.update_static_read(id, payload);
        true
    }

    fn resolution_failed(&mut self, id: StaticReadId) {
        let Some(read) = self.static_read(id) else {
            return;
        };
        let payload = read.payload.unresolved();
        self.update_static_read(id, payload);
    }

    fn update_static_read(&mut self, id: StaticReadId, payload: ReadPayload) {
        let Some(read) = self.static_read_mut(id) else {
            return;
        };
        if read.payload == payload {
            return;
        }
        debug!(read = %id, name = %read.name, resolved = ?payload.target(), "static read changed");
        read.payload = payload;
        self.propagate_static_read(id);
    }

    pub(crate) fn propagate_static_read(&mut self, id: StaticReadId) {
        let Some(read) = self.static_read(id) else {
            return;
        };
        let followers: Vec<Follower> = read.followers().collect();
        for follower in followers {
            match follower {
                Follower::Module(module) => {
                    self.add_static_eval_queue(StaticEvalItem::ParentModulesChanged(module))
                }
                Follower::StaticRead(read) => {
                    self.add_static_eval_queue(StaticEvalItem::ReadChanged(read))
                }
                Follower::Site(site) => self.add_run(site),
            }
        }
    }

    /// Whether the read currently resolves to `name` inside `module`
    pub(crate) fn static_read_targets(
        &self,
        id: StaticReadId,
        module: ModuleId,
        name: &str,
    ) -> bool {
        self.static_read(id)
            .and_then(|read| read.payload.target())
            .is_some_and(|target| target.module == module && target.name == name)
    }
}
