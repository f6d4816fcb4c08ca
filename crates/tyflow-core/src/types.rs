//! Concrete types that flow through the graph
//!
//! Scalars (`Integer`, `String`, `nil`, `true`, ...) are instances of built-in
//! modules; only the container shapes and symbols get dedicated variants.

use crate::env::GlobalEnv;
use crate::ids::{BlockId, ModuleId, VertexId};
use smallvec::SmallVec;

/// Type-argument vertices of an instance or module type
pub type TypeArgs = SmallVec<[VertexId; 2]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Uninhabited type
    Bot,
    /// An instance of a class
    Instance { module: ModuleId, args: TypeArgs },
    /// The class or module object itself
    Module { module: ModuleId, args: TypeArgs },
    /// Array-shaped container. `elems` is set for tuples.
    Array {
        elems: Option<Vec<VertexId>>,
        unified: VertexId,
        base: ModuleId,
    },
    /// Hash-shaped container
    Hash {
        key: VertexId,
        value: VertexId,
        base: ModuleId,
    },
    /// A symbol literal
    Symbol(String),
    /// A block passed to a call
    Proc(BlockId),
}

impl Type {
    /// An instance of `module` without type arguments
    pub fn instance(module: ModuleId) -> Self {
        Type::Instance {
            module,
            args: TypeArgs::new(),
        }
    }

    /// The class or module object itself (`singleton(C)`)
    pub fn module(module: ModuleId) -> Self {
        Type::Module {
            module,
            args: TypeArgs::new(),
        }
    }

    /// The module whose instance methods answer calls on this type
    pub fn base_module(&self, genv: &GlobalEnv) -> Option<ModuleId> {
        match self {
            Type::Bot => None,
            Type::Instance { module, .. } => Some(*module),
            Type::Module { .. } => Some(genv.builtins.class),
            Type::Array { base, .. } | Type::Hash { base, .. } => Some(*base),
            Type::Symbol(_) => Some(genv.builtins.symbol),
            Type::Proc(_) => Some(genv.builtins.proc),
        }
    }

    /// Whether a value of type `actual` is acceptable where `self` is expected
    pub fn accepts(&self, genv: &GlobalEnv, actual: &Type) -> bool {
        match (self, actual) {
            (_, Type::Bot) => true,
            (Type::Bot, _) => false,
            (Type::Symbol(expected), Type::Symbol(found)) => expected == found,
            (Type::Symbol(_), _) => false,
            (Type::Module { module: expected, .. }, Type::Module { module: found, .. }) => {
                genv.is_ancestor(*expected, *found)
            }
            (expected, found) => match (expected.base_module(genv), found.base_module(genv)) {
                (Some(expected), Some(found)) => genv.is_ancestor(expected, found),
                _ => false,
            },
        }
    }
}
