//! Stable arena handles
//!
//! Every entity that takes part in a cycle (vertices, modules, static reads,
//! sites) lives in an arena owned by [`crate::env::GlobalEnv`] and is referred
//! to by one of these copyable indices.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// A vertex of the flow graph
    VertexId,
    "v"
);
arena_id!(
    /// A class or module entity
    ModuleId,
    "m"
);
arena_id!(
    /// A constant or type-alias lookup site
    StaticReadId,
    "sr"
);
arena_id!(
    /// A runnable dependent: call site, constant read site or filter
    SiteId,
    "site"
);
arena_id!(
    /// A block argument descriptor
    BlockId,
    "blk"
);
arena_id!(
    /// An opaque reference to a node of the driver's AST, used for ownership
    /// and diagnostics only
    NodeId,
    "n"
);

impl NodeId {
    /// Owner of everything the environment creates for itself
    pub const BUILTIN: NodeId = NodeId(usize::MAX);
}
