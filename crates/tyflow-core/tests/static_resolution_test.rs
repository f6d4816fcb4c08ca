mod common;

use std::rc::Rc;
use tyflow_core::env::EntityRef;
use tyflow_core::prelude::*;

/// class Outer; X = "s"; end
/// class Base; X = 1; end
/// class Outer::Inner < Base; end
struct Nested {
    genv: GlobalEnv,
    outer: ModuleId,
    base: ModuleId,
    inner: ModuleId,
    inner_cref: Rc<CRef>,
}

fn nested() -> Nested {
    let mut genv = common::genv();
    let outer = genv.add_module_decl(&["Outer"], ModuleKind::Class, NodeId(1));
    let base = genv.add_module_decl(&["Base"], ModuleKind::Class, NodeId(2));
    let inner = genv.add_module_decl(&["Outer", "Inner"], ModuleKind::Class, NodeId(3));

    let (string, int) = (genv.str_type(), genv.int_type());
    let outer_x = common::vertex_with(&mut genv, "Outer::X", vec![string]);
    let base_x = common::vertex_with(&mut genv, "Base::X", vec![int]);
    genv.add_const_def(outer, "X", NodeId(4), outer_x);
    genv.add_const_def(base, "X", NodeId(5), base_x);

    let outer_cref = CRef::toplevel().nested("Outer");
    let inner_cref = outer_cref.nested("Inner");
    Nested {
        genv,
        outer,
        base,
        inner,
        inner_cref,
    }
}

fn set_superclass(env: &mut Nested, name: &str) {
    let outer_cref = CRef::toplevel().nested("Outer");
    let read = env.genv.new_base_const_read(outer_cref, name);
    env.genv.set_superclass_read(env.inner, Some(read));
}

#[test]
fn test_superclass_constant_wins_over_outer_scope() {
    let mut env = nested();
    set_superclass(&mut env, "Base");
    let read = env.genv.new_base_const_read(Rc::clone(&env.inner_cref), "X");
    let ret = env.genv.graph.new_vertex("X", NodeId(6));
    env.genv.add_const_read_site(NodeId(6), read, ret);
    env.genv.run().unwrap();

    assert_eq!(env.genv.module(env.inner).superclass(), Some(env.base));
    assert_eq!(
        env.genv.const_read_cdef(read),
        Some(EntityRef {
            module: env.base,
            name: "X".to_string()
        })
    );
    assert_eq!(env.genv.show_vertex(ret), "Integer");
}

#[test]
fn test_outer_scope_used_without_superclass_constant() {
    let mut env = nested();
    let read = env.genv.new_base_const_read(Rc::clone(&env.inner_cref), "X");
    env.genv.run().unwrap();

    assert_eq!(
        env.genv.const_read_cdef(read),
        Some(EntityRef {
            module: env.outer,
            name: "X".to_string()
        })
    );
}

#[test]
fn test_superclass_change_reresolves() {
    let mut env = nested();
    let read = env.genv.new_base_const_read(Rc::clone(&env.inner_cref), "X");
    env.genv.run().unwrap();
    assert_eq!(env.genv.const_read_cdef(read).map(|e| e.module), Some(env.outer));

    set_superclass(&mut env, "Base");
    env.genv.run().unwrap();
    assert_eq!(env.genv.const_read_cdef(read).map(|e| e.module), Some(env.base));
}

#[test]
fn test_superclass_declared_after_use() {
    let mut env = nested();
    set_superclass(&mut env, "Later");
    env.genv.run().unwrap();
    assert_eq!(env.genv.module(env.inner).superclass(), Some(env.genv.builtins.object));

    let later = env.genv.add_module_decl(&["Later"], ModuleKind::Class, NodeId(9));
    env.genv.run().unwrap();
    assert_eq!(env.genv.module(env.inner).superclass(), Some(later));
}

#[test]
fn test_removed_constant_invalidates_followers_once() {
    let mut genv = common::genv();
    let foo = genv.add_module_decl(&["Foo"], ModuleKind::Module, NodeId(1));
    let int = genv.int_type();
    let value = common::vertex_with(&mut genv, "Foo::X", vec![int]);
    genv.add_const_def(foo, "X", NodeId(2), value);

    let cref = CRef::toplevel().nested("Foo");
    let read = genv.new_base_const_read(Rc::clone(&cref), "X");
    let ret = genv.graph.new_vertex("ret", NodeId(3));
    let site = genv.add_const_read_site(NodeId(3), read, ret);
    let base = genv.new_base_const_read(CRef::toplevel(), "Foo");
    let scoped = genv.new_scoped_const_read(base, "X");
    genv.run().unwrap();

    assert!(genv.const_read_cdef(read).is_some());
    assert!(genv.const_read_cdef(scoped).is_some());
    assert_eq!(genv.show_vertex(ret), "Integer");
    let runs = genv.site(site).unwrap().runs();

    genv.remove_const_def(foo, "X", NodeId(2));
    genv.run().unwrap();

    assert_eq!(genv.const_read_cdef(read), None);
    assert_eq!(genv.const_read_cdef(scoped), None);
    assert_eq!(genv.site(site).unwrap().runs(), runs + 1);
    // delivered types stay
    assert_eq!(genv.show_vertex(ret), "Integer");
}

#[test]
fn test_shadowing_constant_added_in_inner_scope() {
    let mut genv = common::genv();
    let object = genv.builtins.object;
    let foo = genv.add_module_decl(&["Foo"], ModuleKind::Module, NodeId(1));
    let (int, string) = (genv.int_type(), genv.str_type());
    let top = common::vertex_with(&mut genv, "X", vec![int]);
    genv.add_const_def(object, "X", NodeId(2), top);

    let read = genv.new_base_const_read(CRef::toplevel().nested("Foo"), "X");
    genv.run().unwrap();
    assert_eq!(genv.const_read_cdef(read).map(|e| e.module), Some(object));

    let inner = common::vertex_with(&mut genv, "Foo::X", vec![string]);
    genv.add_const_def(foo, "X", NodeId(3), inner);
    genv.run().unwrap();
    assert_eq!(genv.const_read_cdef(read).map(|e| e.module), Some(foo));
}

#[test]
fn test_mutually_recursive_constants_terminate() {
    // A = B; B = A
    let mut genv = common::genv();
    let object = genv.builtins.object;
    let a = genv.graph.new_vertex("A", NodeId(1));
    let b = genv.graph.new_vertex("B", NodeId(2));
    genv.add_const_def(object, "A", NodeId(1), a);
    genv.add_const_def(object, "B", NodeId(2), b);

    let read_b = genv.new_base_const_read(CRef::toplevel(), "B");
    let read_a = genv.new_base_const_read(CRef::toplevel(), "A");
    genv.add_const_read_site(NodeId(1), read_b, a);
    genv.add_const_read_site(NodeId(2), read_a, b);
    let int = genv.int_type();
    Source::new(vec![int]).add_edge(&mut genv.graph, a);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(a), "Integer");
    assert_eq!(genv.show_vertex(b), "Integer");
}
