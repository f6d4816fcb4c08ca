#![allow(dead_code)]

use tracing_subscriber::EnvFilter;
use tyflow_core::prelude::*;

/// Route analyzer logs to the test harness; `RUST_LOG=tyflow_core=debug`
/// shows resolution and overload decisions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn genv() -> GlobalEnv {
    init_tracing();
    GlobalEnv::new(AnalyzerConfig::default())
}

/// Evaluate a signature type outside of any site
pub fn eval(genv: &mut GlobalEnv, mut ty: TypeNode) -> Result<VertexId> {
    ty.define(genv, &CRef::toplevel());
    genv.run()?;
    let mut changes = ChangeSet::new(None, NodeId(0));
    changes.begin();
    let vtx = ty.get_vertex(genv, &mut changes, &Substitution::default(), "eval");
    changes.commit(&mut genv.graph);
    vtx
}

pub fn vertex_with(genv: &mut GlobalEnv, label: &str, types: Vec<Type>) -> VertexId {
    let vtx = genv.graph.new_vertex(label, NodeId(0));
    if !types.is_empty() {
        Source::new(types).add_edge(&mut genv.graph, vtx);
    }
    vtx
}
