//! Edges and vertices installed by one run of a re-runnable site

use super::{FlowGraph, Origin};
use crate::ids::{NodeId, SiteId, VertexId};
use crate::types::Type;
use indexmap::{IndexMap, IndexSet};

/// Tracks what a site installed into the graph so a re-run can reuse the
/// same vertices and retire what it no longer needs.
///
/// Vertices are requested by key. Asking for a key the previous run created
/// returns the same vertex, so re-running a site whose inputs did not change
/// introduces no new type anywhere.
#[derive(Debug, Default)]
pub struct ChangeSet {
    owner: Option<SiteId>,
    node: NodeId,
    vertices: IndexMap<String, VertexId>,
    edges: IndexSet<(VertexId, VertexId)>,
    /// Vertices from earlier runs that were not requested again. They stay
    /// alive because types already delivered downstream may refer to them.
    dormant: IndexMap<String, VertexId>,
    previous_edges: IndexSet<(VertexId, VertexId)>,
    /// Origin of every source injected into a destination vertex
    sources: IndexMap<VertexId, Origin>,
}

impl ChangeSet {
    pub fn new(owner: Option<SiteId>, node: NodeId) -> Self {
        Self {
            owner,
            node,
            ..Self::default()
        }
    }

    /// The site this change set belongs to, if any
    pub fn owner(&self) -> Option<SiteId> {
        self.owner
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Start a new run; everything installed so far becomes reusable
    pub fn begin(&mut self) {
        let vertices = std::mem::take(&mut self.vertices);
        self.dormant.extend(vertices);
        self.previous_edges = std::mem::take(&mut self.edges);
    }

    /// The vertex for `key`, reused from an earlier run when there is one
    pub fn new_vertex(&mut self, graph: &mut FlowGraph, key: String, label: &str) -> VertexId {
        if let Some(&id) = self.vertices.get(&key) {
            return id;
        }
        let id = match self.dormant.swap_remove(&key) {
            Some(id) if graph.is_alive(id) => id,
            _ => graph.new_vertex(label, self.node),
        };
        self.vertices.insert(key, id);
        id
    }

    /// Add an edge that is detached again unless the next run re-adds it
    pub fn add_edge(&mut self, graph: &mut FlowGraph, src: VertexId, dst: VertexId) {
        self.edges.insert((src, dst));
        graph.add_edge(src, dst);
    }

    /// Inject fixed types into `dst`. Re-runs inject under the same origin,
    /// so provenance does not grow with the number of runs.
    pub fn add_source(&mut self, graph: &mut FlowGraph, types: Vec<Type>, dst: VertexId) {
        let origin = *self.sources.entry(dst).or_insert_with(|| graph.new_source_origin());
        graph.inject_from(origin, types, dst);
    }

    /// Finish the run: detach edges that were not re-added. Vertices that
    /// were not requested again become dormant, keeping the types they hold.
    /// Returns whether the installed edge set differs from the previous run.
    pub fn commit(&mut self, graph: &mut FlowGraph) -> bool {
        let mut changed = false;
        for &(src, dst) in &self.previous_edges {
            if !self.edges.contains(&(src, dst)) {
                graph.remove_edge(src, dst);
                changed = true;
            }
        }
        if self.edges.iter().any(|edge| !self.previous_edges.contains(edge)) {
            changed = true;
        }
        self.previous_edges.clear();
        changed
    }

    /// Remove everything this change set ever installed
    pub fn retire(&mut self, graph: &mut FlowGraph) {
        self.begin();
        self.commit(graph);
        for (_, id) in self.dormant.drain(..) {
            graph.destroy_vertex(id);
        }
        self.sources.clear();
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.edges.iter().copied()
    }
}
