//! Global environment
//!
//! `GlobalEnv` owns every arena (vertices, modules, static reads, sites,
//! blocks) and the two work queues of the fixpoint driver:
//! - the static-evaluation queue: static reads to re-resolve and modules whose
//!   parents must be refreshed
//! - the run queue: sites (calls, constant reads, filters) to re-run
//!
//! Processing order inside a queue does not change the final fixpoint because
//! every component only propagates on change.
//!
//! Handles stay valid for the lifetime of the environment. A removed vertex,
//! read, site or block leaves an empty slot that is never handed out again:
//! follower sets, watcher lists and types already delivered downstream may
//! still name it and must not start referring to a different entity. Memory
//! therefore grows with the number of entities ever created, so one
//! `GlobalEnv` covers one analysis session.

mod builtin;
mod method;
mod module;
mod site;
mod static_read;

pub use builtin::Builtin;
pub use method::{Block, MethodDecl, MethodDef, MethodEntity, Overload};
pub use module::{CPath, CRef, ConstEntity, ModuleEntity, ModuleKind, TypeAliasEntity};
pub use site::{CallSite, ConstReadSite, IsAFilter, Site, SiteKind};
pub use static_read::{EntityRef, Follower, ReadPayload, ReadScope, StaticRead};

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::graph::{FlowGraph, GraphStats};
use crate::ids::{BlockId, ModuleId, NodeId, SiteId, StaticReadId, VertexId};
use crate::types::Type;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, warn};

/// Work item of the static-evaluation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticEvalItem {
    /// Re-resolve a static read
    ReadChanged(StaticReadId),
    /// Recompute a module's superclass and invalidate its hierarchy
    ParentModulesChanged(ModuleId),
}

/// Handles of the modules the environment declares for itself
#[derive(Debug, Clone, Copy, Default)]
pub struct Builtins {
    pub basic_object: ModuleId,
    pub object: ModuleId,
    pub module: ModuleId,
    pub class: ModuleId,
    pub integer: ModuleId,
    pub float: ModuleId,
    pub string: ModuleId,
    pub symbol: ModuleId,
    pub nil: ModuleId,
    pub true_class: ModuleId,
    pub false_class: ModuleId,
    pub array: ModuleId,
    pub hash: ModuleId,
    pub set: ModuleId,
    pub proc: ModuleId,
}

/// Result of draining both queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Queue items processed
    pub iterations: usize,
    pub static_evals: usize,
    pub site_runs: usize,
    /// Site runs whose installed edges differed from their previous run
    pub recomputations: usize,
    pub graph: GraphStats,
}

#[derive(Debug)]
pub struct GlobalEnv {
    pub graph: FlowGraph,
    pub config: AnalyzerConfig,
    pub builtins: Builtins,
    modules: Vec<ModuleEntity>,
    module_index: HashMap<CPath, ModuleId>,
    static_reads: Vec<Option<StaticRead>>,
    sites: Vec<Option<Site>>,
    blocks: Vec<Option<Block>>,
    static_eval_queue: VecDeque<StaticEvalItem>,
    in_static_eval_queue: HashSet<StaticEvalItem>,
    run_queue: VecDeque<SiteId>,
    in_run_queue: HashSet<SiteId>,
}

impl GlobalEnv {
    pub fn new(config: AnalyzerConfig) -> Self {
        let mut genv = Self {
            graph: FlowGraph::new(),
            config,
            builtins: Builtins::default(),
            modules: Vec::new(),
            module_index: HashMap::new(),
            static_reads: Vec::new(),
            sites: Vec::new(),
            blocks: Vec::new(),
            static_eval_queue: VecDeque::new(),
            in_static_eval_queue: HashSet::new(),
            run_queue: VecDeque::new(),
            in_run_queue: HashSet::new(),
        };
        genv.declare_builtins();
        genv
    }

    fn declare_builtins(&mut self) {
        let empty: [&str; 0] = [];
        self.builtins.object = self.resolve_cpath(&empty);
        self.builtins.basic_object = self.resolve_cpath(&["BasicObject"]);
        // the root is also reachable as its own constant `Object`
        self.add_module_decl(&[module::OBJECT], ModuleKind::Class, NodeId::BUILTIN);
        self.add_module_decl(&["BasicObject"], ModuleKind::Class, NodeId::BUILTIN);

        self.builtins.module = self.declare_builtin_class("Module");
        self.builtins.class = self.declare_builtin_class("Class");
        self.builtins.integer = self.declare_builtin_class("Integer");
        self.builtins.float = self.declare_builtin_class("Float");
        self.builtins.string = self.declare_builtin_class("String");
        self.builtins.symbol = self.declare_builtin_class("Symbol");
        self.builtins.nil = self.declare_builtin_class("NilClass");
        self.builtins.true_class = self.declare_builtin_class("TrueClass");
        self.builtins.false_class = self.declare_builtin_class("FalseClass");
        self.builtins.array = self.declare_builtin_class("Array");
        self.builtins.hash = self.declare_builtin_class("Hash");
        self.builtins.set = self.declare_builtin_class("Set");
        self.builtins.proc = self.declare_builtin_class("Proc");

        let (class, module) = (self.builtins.class, self.builtins.module);
        self.set_default_superclass(class, Some(module));

        self.set_type_params(self.builtins.array, vec!["Elem".to_string()]);
        self.set_type_params(self.builtins.set, vec!["A".to_string()]);
        self.set_type_params(self.builtins.hash, vec!["K".to_string(), "V".to_string()]);

        self.set_builtin(self.builtins.basic_object, true, "new", Builtin::ClassNew);
        self.set_builtin(self.builtins.proc, false, "call", Builtin::ProcCall);
        self.set_builtin(self.builtins.array, false, "[]", Builtin::ArrayAref);
        self.set_builtin(self.builtins.hash, false, "[]", Builtin::HashAref);
    }

    fn declare_builtin_class(&mut self, name: &str) -> ModuleId {
        self.add_module_decl(&[name], ModuleKind::Class, NodeId::BUILTIN)
    }

    pub fn obj_type(&self) -> Type {
        Type::instance(self.builtins.object)
    }

    pub fn int_type(&self) -> Type {
        Type::instance(self.builtins.integer)
    }

    pub fn float_type(&self) -> Type {
        Type::instance(self.builtins.float)
    }

    pub fn str_type(&self) -> Type {
        Type::instance(self.builtins.string)
    }

    pub fn sym_type(&self) -> Type {
        Type::instance(self.builtins.symbol)
    }

    pub fn nil_type(&self) -> Type {
        Type::instance(self.builtins.nil)
    }

    pub fn true_type(&self) -> Type {
        Type::instance(self.builtins.true_class)
    }

    pub fn false_type(&self) -> Type {
        Type::instance(self.builtins.false_class)
    }

    /// Register a block literal; pass `Type::Proc(id)` into the call's block
    /// vertex to hand it over
    pub fn new_block(&mut self, node: NodeId, f_args: Vec<VertexId>, ret: VertexId) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Some(Block { node, f_args, ret }));
        id
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0).and_then(Option::as_ref)
    }

    /// Forget a block. Sites still holding its `Proc` type stop wiring it on
    /// their next run.
    pub fn remove_block(&mut self, id: BlockId) -> Option<Block> {
        self.blocks.get_mut(id.0).and_then(Option::take)
    }

    /// Whether `ancestor` is `module` or one of its superclasses
    pub fn is_ancestor(&self, ancestor: ModuleId, module: ModuleId) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(module);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            current = self.modules[id.0].superclass;
        }
        false
    }

    /// Every concrete type at `actual` is acceptable where `formal` is
    /// expected. An empty vertex on either side is unknown and matches.
    pub fn vertex_matches(&self, actual: VertexId, formal: VertexId) -> bool {
        let formal_types = self.graph.types(formal);
        if formal_types.is_empty() {
            return true;
        }
        self.graph
            .types(actual)
            .iter()
            .all(|actual| formal_types.iter().any(|formal| formal.accepts(self, actual)))
    }

    pub fn add_static_eval_queue(&mut self, item: StaticEvalItem) {
        if self.in_static_eval_queue.insert(item) {
            self.static_eval_queue.push_back(item);
        }
    }

    pub fn add_run(&mut self, site: SiteId) {
        if self.site(site).is_none() {
            return;
        }
        if self.in_run_queue.insert(site) {
            self.run_queue.push_back(site);
        }
    }

    pub fn is_quiescent(&self) -> bool {
        self.static_eval_queue.is_empty() && self.run_queue.is_empty()
    }

    /// Drain both queues until nothing changes anymore
    pub fn run(&mut self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        loop {
            for site in self.graph.take_triggered() {
                self.add_run(site);
            }
            if self.is_quiescent() {
                break;
            }
            if stats.iterations >= self.config.max_iterations {
                return Err(AnalysisError::NoFixpoint(stats.iterations));
            }
            stats.iterations += 1;

            if let Some(item) = self.static_eval_queue.pop_front() {
                self.in_static_eval_queue.remove(&item);
                self.process_static_eval(item);
                stats.static_evals += 1;
            } else if let Some(site) = self.run_queue.pop_front() {
                self.in_run_queue.remove(&site);
                match self.run_site(site) {
                    Ok(true) => stats.recomputations += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(%site, %err, "site evaluation aborted");
                        return Err(err);
                    }
                }
                stats.site_runs += 1;
            }
        }

        stats.graph = self.graph.stats();
        info!(
            iterations = stats.iterations,
            site_runs = stats.site_runs,
            vertices = stats.graph.live_vertices,
            edges = stats.graph.edges,
            "reached fixpoint"
        );
        Ok(stats)
    }

    fn process_static_eval(&mut self, item: StaticEvalItem) {
        match item {
            StaticEvalItem::ReadChanged(read) => self.reresolve_static_read(read),
            StaticEvalItem::ParentModulesChanged(module) => self.on_parent_modules_changed(module),
        }
    }
}
