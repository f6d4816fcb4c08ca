//! Methods whose behavior is modeled directly instead of through a signature

use super::site::CallSite;
use super::GlobalEnv;
use crate::graph::ChangeSet;
use crate::types::Type;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    /// `C.new` returns an instance of `C`
    ClassNew,
    /// `proc.call(args)` feeds the block parameters and returns its result
    ProcCall,
    /// `array[i]` returns the unified element
    ArrayAref,
    /// `hash[k]` returns the value
    HashAref,
}

impl Builtin {
    /// Apply the builtin for one receiver type. Returns `false` when the
    /// receiver does not have the expected shape so dispatch falls through to
    /// the declarations.
    pub(crate) fn run(
        self,
        genv: &mut GlobalEnv,
        changes: &mut ChangeSet,
        recv: &Type,
        call: &CallSite,
        key: &str,
    ) -> bool {
        match (self, recv) {
            (Builtin::ClassNew, Type::Module { module, .. }) => {
                let vtx = changes.new_vertex(&mut genv.graph, format!("{key}/new"), "new");
                changes.add_source(&mut genv.graph, vec![Type::instance(*module)], vtx);
                changes.add_edge(&mut genv.graph, vtx, call.ret);
                true
            }
            (Builtin::ProcCall, Type::Proc(block_id)) => {
                let Some(block) = genv.block(*block_id).cloned() else {
                    return false;
                };
                if call.args.len() == block.f_args.len() {
                    for (&a_arg, &f_arg) in call.args.iter().zip(&block.f_args) {
                        changes.add_edge(&mut genv.graph, a_arg, f_arg);
                    }
                }
                changes.add_edge(&mut genv.graph, block.ret, call.ret);
                true
            }
            (Builtin::ArrayAref, Type::Array { unified, .. }) => {
                changes.add_edge(&mut genv.graph, *unified, call.ret);
                true
            }
            (Builtin::HashAref, Type::Hash { value, .. }) => {
                changes.add_edge(&mut genv.graph, *value, call.ret);
                true
            }
            _ => false,
        }
    }
}
