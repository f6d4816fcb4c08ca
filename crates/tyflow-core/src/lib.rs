//! # Tyflow Core
//!
//! Inference core of a static type analyzer for a dynamic object-oriented
//! language. Given already-parsed program and signature nodes, it computes the
//! set of concrete types every program position may hold and checks call sites
//! against declared method signatures.
//!
//! ## Modules
//!
//! - **[`graph`]** - Type-flow graph (vertices, edges, sources) with monotonic,
//!   cycle-safe propagation
//! - **[`env`]** - Global environment: module registry, incremental constant and
//!   type-alias resolution, method/overload registry, runnable sites and the
//!   fixpoint driver
//! - **[`sig`]** - Evaluation of declared signature types into flow vertices
//! - **[`show`]** - Human readable rendering of types for diagnostics
//!
//! ## Quick Start
//!
//! ```rust
//! use tyflow_core::prelude::*;
//!
//! let mut genv = GlobalEnv::new(AnalyzerConfig::default());
//! let a = genv.graph.new_vertex("a", NodeId(1));
//! let b = genv.graph.new_vertex("b", NodeId(2));
//! let int = genv.int_type();
//!
//! Source::new(vec![int]).add_edge(&mut genv.graph, a);
//! genv.graph.add_edge(a, b);
//! genv.graph.add_edge(b, a);
//! genv.run().unwrap();
//!
//! assert_eq!(genv.show_vertex(b), "Integer");
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod graph;
pub mod ids;
pub mod show;
pub mod sig;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::AnalyzerConfig;
    pub use crate::env::{
        Block, Builtin, CRef, GlobalEnv, MethodDecl, MethodDef, ModuleKind, Overload, RunStats,
    };
    pub use crate::error::{AnalysisError, Result};
    pub use crate::graph::{ChangeSet, FlowGraph, Source};
    pub use crate::ids::{BlockId, ModuleId, NodeId, SiteId, StaticReadId, VertexId};
    pub use crate::sig::{NamedType, SigFunction, SigLiteral, Substitution, TypeNode};
    pub use crate::types::Type;
}

pub use config::AnalyzerConfig;
pub use env::GlobalEnv;
pub use error::{AnalysisError, Result};
pub use graph::{FlowGraph, Source};
pub use types::Type;
