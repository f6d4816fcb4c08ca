//! Rendering of types for diagnostics

use crate::env::GlobalEnv;
use crate::ids::VertexId;
use crate::types::Type;

impl GlobalEnv {
    /// All types of a vertex joined with `|`, or `untyped` when empty
    pub fn show_vertex(&self, vertex: VertexId) -> String {
        self.show_vertex_within(vertex, &mut Vec::new())
    }

    pub fn show_type(&self, ty: &Type) -> String {
        self.show_type_within(ty, &mut Vec::new())
    }

    fn show_vertex_within(&self, vertex: VertexId, visiting: &mut Vec<VertexId>) -> String {
        // a vertex reachable from its own types, e.g. a recursive alias
        if visiting.contains(&vertex) {
            return "untyped".to_string();
        }
        let types = self.graph.types(vertex);
        if types.is_empty() {
            return "untyped".to_string();
        }
        visiting.push(vertex);
        let shown: Vec<String> =
            types.iter().map(|ty| self.show_type_within(ty, visiting)).collect();
        visiting.pop();
        shown.join(" | ")
    }

    fn show_type_within(&self, ty: &Type, visiting: &mut Vec<VertexId>) -> String {
        match ty {
            Type::Bot => "bot".to_string(),
            Type::Instance { module, args } => {
                let b = &self.builtins;
                if *module == b.nil {
                    return "nil".to_string();
                }
                if *module == b.true_class {
                    return "true".to_string();
                }
                if *module == b.false_class {
                    return "false".to_string();
                }
                let name = self.module_name(*module);
                if args.is_empty() {
                    name
                } else {
                    let args: Vec<String> =
                        args.iter().map(|&v| self.show_vertex_within(v, visiting)).collect();
                    format!("{name}[{}]", args.join(", "))
                }
            }
            Type::Module { module, .. } => format!("singleton({})", self.module_name(*module)),
            Type::Array {
                elems: Some(elems), ..
            } => {
                let elems: Vec<String> =
                    elems.iter().map(|&v| self.show_vertex_within(v, visiting)).collect();
                format!("[{}]", elems.join(", "))
            }
            Type::Array { unified, base, .. } => {
                let elem = self.show_vertex_within(*unified, visiting);
                format!("{}[{}]", self.module_name(*base), elem)
            }
            Type::Hash { key, value, base } => format!(
                "{}[{}, {}]",
                self.module_name(*base),
                self.show_vertex_within(*key, visiting),
                self.show_vertex_within(*value, visiting)
            ),
            Type::Symbol(name) => format!(":{name}"),
            Type::Proc(_) => "Proc".to_string(),
        }
    }
}
