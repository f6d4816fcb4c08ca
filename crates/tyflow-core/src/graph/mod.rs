//! Type-flow graph
//!
//! A vertex holds the set of types that may reach one program position. An
//! edge `a -> b` means every type at `a` is also at `b`. Propagation is
//! monotonic: a type is pushed onward only the first time it reaches a vertex,
//! which is what makes cyclic graphs reach a fixpoint.

mod change_set;

pub use change_set::ChangeSet;

use crate::ids::{NodeId, SiteId, VertexId};
use crate::types::Type;
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use tracing::trace;

/// Where a type at a vertex came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Vertex(VertexId),
    Source(usize),
}

#[derive(Debug, Clone)]
/// One program position and the types that may reach it
pub struct Vertex {
    pub label: String,
    pub owner: NodeId,
    types: IndexMap<Type, IndexSet<Origin>>,
    next: IndexSet<VertexId>,
    prev: IndexSet<VertexId>,
    watchers: IndexSet<SiteId>,
}

impl Vertex {
    fn new(label: String, owner: NodeId) -> Self {
        Self {
            label,
            owner,
            types: IndexMap::new(),
            next: IndexSet::new(),
            prev: IndexSet::new(),
            watchers: IndexSet::new(),
        }
    }

    /// Types in insertion order
    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.keys()
    }

    pub fn has_type(&self, ty: &Type) -> bool {
        self.types.contains_key(ty)
    }

    /// Where `ty` reached this vertex from
    pub fn origins(&self, ty: &Type) -> Option<&IndexSet<Origin>> {
        self.types.get(ty)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn successors(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.next.iter().copied()
    }

    pub fn predecessors(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.prev.iter().copied()
    }
}

/// Counters reported when a run reaches quiescence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub live_vertices: usize,
    pub edges: usize,
    pub type_additions: usize,
}

/// Arena of vertices
#[derive(Debug, Default)]
pub struct FlowGraph {
    vertices: Vec<Option<Vertex>>,
    next_source: usize,
    edge_count: usize,
    type_additions: usize,
    /// Sites whose watched vertices gained a type since the last drain
    triggered: IndexSet<SiteId>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty vertex owned by the program node `owner`
    pub fn new_vertex(&mut self, label: impl Into<String>, owner: NodeId) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(Some(Vertex::new(label.into(), owner)));
        id
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0).and_then(Option::as_ref)
    }

    pub fn is_alive(&self, id: VertexId) -> bool {
        self.vertex(id).is_some()
    }

    /// Snapshot of the types at a vertex, empty for destroyed vertices
    pub fn types(&self, id: VertexId) -> Vec<Type> {
        self.vertex(id).map(|v| v.types().cloned().collect()).unwrap_or_default()
    }

    pub fn has_type(&self, id: VertexId, ty: &Type) -> bool {
        self.vertex(id).is_some_and(|v| v.has_type(ty))
    }

    /// Add a flow edge. Returns false when the edge already existed or either
    /// end is gone.
    pub fn add_edge(&mut self, src: VertexId, dst: VertexId) -> bool {
        if !self.is_alive(src) || !self.is_alive(dst) {
            return false;
        }
        let types: Vec<Type> = {
            let Some(source) = self.vertices[src.0].as_mut() else {
                return false;
            };
            if !source.next.insert(dst) {
                return false;
            }
            source.types.keys().cloned().collect()
        };
        if let Some(target) = self.vertices[dst.0].as_mut() {
            target.prev.insert(src);
        }
        self.edge_count += 1;
        self.push(Origin::Vertex(src), dst, types);
        true
    }

    /// Detach an edge. Types already delivered through it stay where they are.
    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId) -> bool {
        let removed = self
            .vertices
            .get_mut(src.0)
            .and_then(Option::as_mut)
            .is_some_and(|source| source.next.swap_remove(&dst));
        if let Some(Some(target)) = self.vertices.get_mut(dst.0) {
            target.prev.swap_remove(&src);
        }
        if removed {
            self.edge_count -= 1;
        }
        removed
    }

    /// Detach every edge of a vertex and free it
    pub fn destroy_vertex(&mut self, id: VertexId) {
        let Some(vertex) = self.vertices.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for next in &vertex.next {
            if let Some(Some(target)) = self.vertices.get_mut(next.0) {
                target.prev.swap_remove(&id);
            }
        }
        for prev in &vertex.prev {
            if let Some(Some(source)) = self.vertices.get_mut(prev.0) {
                source.next.swap_remove(&id);
            }
        }
        self.edge_count -= vertex.next.len() + vertex.prev.len();
        // a self-loop was counted on both sides
        if vertex.next.contains(&id) {
            self.edge_count += 1;
        }
    }

    /// Re-run `site` whenever `id` gains a type
    pub fn watch(&mut self, id: VertexId, site: SiteId) {
        if let Some(Some(vertex)) = self.vertices.get_mut(id.0) {
            vertex.watchers.insert(site);
        }
    }

    pub fn unwatch(&mut self, id: VertexId, site: SiteId) {
        if let Some(Some(vertex)) = self.vertices.get_mut(id.0) {
            vertex.watchers.swap_remove(&site);
        }
    }

    pub(crate) fn take_triggered(&mut self) -> IndexSet<SiteId> {
        std::mem::take(&mut self.triggered)
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            live_vertices: self.vertices.iter().filter(|v| v.is_some()).count(),
            edges: self.edge_count,
            type_additions: self.type_additions,
        }
    }

    /// A fresh provenance tag for injected types
    pub(crate) fn new_source_origin(&mut self) -> Origin {
        let origin = Origin::Source(self.next_source);
        self.next_source += 1;
        origin
    }

    pub(crate) fn inject_from(&mut self, origin: Origin, types: Vec<Type>, dst: VertexId) {
        self.push(origin, dst, types);
    }

    fn inject(&mut self, types: Vec<Type>, dst: VertexId) {
        let origin = self.new_source_origin();
        self.inject_from(origin, types, dst);
    }

    /// Breadth-first propagation; a type that is already present is not pushed
    /// further.
    fn push(&mut self, origin: Origin, dst: VertexId, types: Vec<Type>) {
        let mut worklist: VecDeque<(Origin, VertexId, Type)> =
            types.into_iter().map(|ty| (origin, dst, ty)).collect();

        while let Some((origin, id, ty)) = worklist.pop_front() {
            let Some(Some(vertex)) = self.vertices.get_mut(id.0) else {
                continue;
            };
            match vertex.types.entry(ty) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().insert(origin);
                }
                Entry::Vacant(entry) => {
                    let ty = entry.key().clone();
                    entry.insert(IndexSet::from([origin]));
                    trace!(vertex = %id, label = %vertex.label, ?ty, "type added");
                    self.type_additions += 1;
                    self.triggered.extend(vertex.watchers.iter().copied());
                    for &next in &vertex.next {
                        worklist.push_back((Origin::Vertex(id), next, ty.clone()));
                    }
                }
            }
        }
    }
}

/// One-shot injection of fixed types into a vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    types: Vec<Type>,
}

impl Source {
    pub fn new(types: Vec<Type>) -> Self {
        Self { types }
    }

    /// Push the types into `dst` and everything downstream of it
    pub fn add_edge(self, graph: &mut FlowGraph, dst: VertexId) {
        graph.inject(self.types, dst);
    }
}
