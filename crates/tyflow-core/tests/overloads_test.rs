mod common;

use tyflow_core::env::CallSite;
use tyflow_core::prelude::*;

fn call(
    genv: &mut GlobalEnv,
    recv: VertexId,
    mid: &str,
    args: Vec<VertexId>,
    block: Option<VertexId>,
) -> VertexId {
    let ret = genv.graph.new_vertex(format!("{mid}-ret"), NodeId(100));
    genv.add_call_site(
        NodeId(100),
        CallSite {
            recv,
            mid: mid.to_string(),
            args,
            block,
            ret,
        },
    );
    ret
}

/// `(param) -> ret` over plain class names
fn simple(param: &str, ret: &str) -> Overload {
    Overload::new(SigFunction::new(vec![TypeNode::instance(param)], TypeNode::instance(ret)))
}

fn declare(genv: &mut GlobalEnv, module: ModuleId, mid: &str, overloads: Vec<Overload>) {
    let decl = MethodDecl::new(NodeId(50), overloads);
    genv.add_method_decl(module, false, mid, &CRef::toplevel(), decl);
}

fn foo_instance(genv: &mut GlobalEnv) -> (ModuleId, VertexId) {
    let foo = genv.add_module_decl(&["Foo"], ModuleKind::Class, NodeId(1));
    let recv = common::vertex_with(genv, "recv", vec![Type::instance(foo)]);
    (foo, recv)
}

#[test]
fn test_arity_selects_overload() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    // def m: (Integer) -> String | (Integer, Integer) -> Float
    declare(
        &mut genv,
        foo,
        "m",
        vec![
            simple("Integer", "String"),
            Overload::new(SigFunction::new(
                vec![TypeNode::instance("Integer"), TypeNode::instance("Integer")],
                TypeNode::instance("Float"),
            )),
        ],
    );
    let int = genv.int_type();
    let one = common::vertex_with(&mut genv, "1", vec![int.clone()]);
    let two = common::vertex_with(&mut genv, "2", vec![int]);

    let ret = call(&mut genv, recv, "m", vec![one, two], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "Float");
}

#[test]
fn test_argument_types_filter_overloads() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    // def conv: (Integer) -> String | (String) -> Integer
    declare(
        &mut genv,
        foo,
        "conv",
        vec![
            simple("Integer", "String"),
            simple("String", "Integer"),
        ],
    );
    let string = genv.str_type();
    let arg = common::vertex_with(&mut genv, "s", vec![string]);

    let ret = call(&mut genv, recv, "conv", vec![arg], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "Integer");
}

#[test]
fn test_unknown_argument_matches_every_overload() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    declare(
        &mut genv,
        foo,
        "conv",
        vec![
            simple("Integer", "String"),
            simple("String", "Integer"),
        ],
    );
    let arg = common::vertex_with(&mut genv, "unknown", vec![]);

    let ret = call(&mut genv, recv, "conv", vec![arg], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "String | Integer");
}

#[test]
fn test_interface_parameter_never_matches() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    declare(
        &mut genv,
        foo,
        "each",
        vec![Overload::new(SigFunction::new(
            vec![TypeNode::Interface {
                name: "_Each".to_string(),
            }],
            TypeNode::Nil,
        ))],
    );
    let int = genv.int_type();
    let arg = common::vertex_with(&mut genv, "arg", vec![int]);

    let ret = call(&mut genv, recv, "each", vec![arg], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "untyped");
}

#[test]
fn test_subclass_argument_is_accepted() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    let animal = genv.add_module_decl(&["Animal"], ModuleKind::Class, NodeId(2));
    let dog = genv.add_module_decl(&["Dog"], ModuleKind::Class, NodeId(3));
    genv.set_default_superclass(dog, Some(animal));
    declare(
        &mut genv,
        foo,
        "pet",
        vec![Overload::new(SigFunction::new(vec![TypeNode::instance("Animal")], TypeNode::Bool))],
    );
    let arg = common::vertex_with(&mut genv, "dog", vec![Type::instance(dog)]);

    let ret = call(&mut genv, recv, "pet", vec![arg], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "true | false");
}

#[test]
fn test_receiver_type_parameter_and_block() {
    let mut genv = common::genv();
    let array = genv.builtins.array;
    // def map: [U] () { (Elem) -> U } -> Array[U]
    declare(
        &mut genv,
        array,
        "map",
        vec![Overload::new(SigFunction::new(
            vec![],
            TypeNode::generic("Array", vec![TypeNode::Var("U".to_string())]),
        ))
        .with_type_params(["U"])
        .with_block(SigFunction::new(
            vec![TypeNode::Var("Elem".to_string())],
            TypeNode::Var("U".to_string()),
        ))],
    );

    let int = genv.int_type();
    let elem = common::vertex_with(&mut genv, "elem", vec![int]);
    let ary = Type::Array {
        elems: None,
        unified: elem,
        base: array,
    };
    let recv = common::vertex_with(&mut genv, "ary", vec![ary]);

    // { |x| [x] }
    let x = genv.graph.new_vertex("x", NodeId(10));
    let block_ret = genv.graph.new_vertex("block-ret", NodeId(10));
    let wrapped = Type::Array {
        elems: Some(vec![x]),
        unified: x,
        base: array,
    };
    Source::new(vec![wrapped]).add_edge(&mut genv.graph, block_ret);
    let block = genv.new_block(NodeId(10), vec![x], block_ret);
    let block_vtx = common::vertex_with(&mut genv, "blk", vec![Type::Proc(block)]);

    let ret = call(&mut genv, recv, "map", vec![], Some(block_vtx));
    genv.run().unwrap();

    insta::assert_snapshot!(genv.show_vertex(x), @"Integer");
    insta::assert_snapshot!(genv.show_vertex(ret), @"Array[[Integer]]");
}

#[test]
fn test_missing_block_rejects_block_overload() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    declare(
        &mut genv,
        foo,
        "tap",
        vec![
            Overload::new(SigFunction::new(vec![], TypeNode::SelfType))
                .with_block(SigFunction::new(vec![TypeNode::SelfType], TypeNode::Void)),
            Overload::new(SigFunction::new(vec![], TypeNode::Nil)),
        ],
    );

    let ret = call(&mut genv, recv, "tap", vec![], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "nil");
}

#[test]
fn test_builtins_dispatch() {
    let mut genv = common::genv();
    let (foo, _) = foo_instance(&mut genv);
    let class_recv = common::vertex_with(&mut genv, "Foo", vec![Type::module(foo)]);
    let instance = call(&mut genv, class_recv, "new", vec![], None);

    let (string, int) = (genv.str_type(), genv.int_type());
    let key = common::vertex_with(&mut genv, "k", vec![Type::Symbol("a".to_string())]);
    let value = common::vertex_with(&mut genv, "v", vec![string]);
    let hash = Type::Hash {
        key,
        value,
        base: genv.builtins.hash,
    };
    let hash_recv = common::vertex_with(&mut genv, "h", vec![hash]);
    let index = common::vertex_with(&mut genv, "i", vec![Type::Symbol("a".to_string())]);
    let fetched = call(&mut genv, hash_recv, "[]", vec![index], None);

    let param = genv.graph.new_vertex("p", NodeId(20));
    let block = genv.new_block(NodeId(20), vec![param], param);
    let proc_recv = common::vertex_with(&mut genv, "pr", vec![Type::Proc(block)]);
    let arg = common::vertex_with(&mut genv, "a", vec![int]);
    let called = call(&mut genv, proc_recv, "call", vec![arg], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(instance), "Foo");
    assert_eq!(genv.show_vertex(fetched), "String");
    assert_eq!(genv.show_vertex(called), "Integer");
}

#[test]
fn test_alias_redispatches() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    declare(
        &mut genv,
        foo,
        "size",
        vec![Overload::new(SigFunction::new(vec![], TypeNode::instance("Integer")))],
    );
    genv.add_method_alias(foo, false, "length", NodeId(60), "size");

    let ret = call(&mut genv, recv, "length", vec![], None);
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "Integer");
}

#[test]
fn test_decl_added_later_reruns_call() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    let ret = call(&mut genv, recv, "name", vec![], None);
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "untyped");

    declare(
        &mut genv,
        foo,
        "name",
        vec![Overload::new(SigFunction::new(vec![], TypeNode::instance("String")))],
    );
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "String");
}

#[test]
fn test_inherited_method_found_through_superclass() {
    let mut genv = common::genv();
    let base = genv.add_module_decl(&["Base"], ModuleKind::Class, NodeId(2));
    let (foo, recv) = foo_instance(&mut genv);
    declare(
        &mut genv,
        base,
        "id",
        vec![Overload::new(SigFunction::new(vec![], TypeNode::instance("Integer")))],
    );
    let ret = call(&mut genv, recv, "id", vec![], None);
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "untyped");

    genv.set_default_superclass(foo, Some(base));
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "Integer");
}

#[test]
fn test_object_parameter_and_return() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    // def keep: (Object) -> Object
    declare(
        &mut genv,
        foo,
        "keep",
        vec![simple("Object", "Object")],
    );
    let int = genv.int_type();
    let int_arg = common::vertex_with(&mut genv, "1", vec![int]);
    let basic = Type::instance(genv.builtins.basic_object);
    let basic_arg = common::vertex_with(&mut genv, "basic", vec![basic]);

    let ret = call(&mut genv, recv, "keep", vec![int_arg], None);
    let rejected = call(&mut genv, recv, "keep", vec![basic_arg], None);
    genv.run().unwrap();

    assert_eq!(genv.show_vertex(ret), "Object");
    assert_eq!(genv.show_vertex(rejected), "untyped");
}

#[test]
fn test_rejected_overload_keeps_delivered_elements() {
    let mut genv = common::genv();
    let (foo, recv) = foo_instance(&mut genv);
    // def wrap: (Integer) -> Array[Integer]
    declare(
        &mut genv,
        foo,
        "wrap",
        vec![Overload::new(SigFunction::new(
            vec![TypeNode::instance("Integer")],
            TypeNode::generic("Array", vec![TypeNode::instance("Integer")]),
        ))],
    );
    let int = genv.int_type();
    let arg = common::vertex_with(&mut genv, "arg", vec![int]);
    let ret = call(&mut genv, recv, "wrap", vec![arg], None);
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "Array[Integer]");

    let string = genv.str_type();
    Source::new(vec![string]).add_edge(&mut genv.graph, arg);
    genv.run().unwrap();
    assert_eq!(genv.show_vertex(ret), "Array[Integer]");
}

#[test]
fn test_rerun_does_not_grow_provenance() {
    let mut genv = common::genv();
    let (foo, _) = foo_instance(&mut genv);
    let recv = common::vertex_with(&mut genv, "Foo", vec![Type::module(foo)]);
    let arg = genv.graph.new_vertex("arg", NodeId(0));
    let ret = call(&mut genv, recv, "new", vec![arg], None);
    genv.run().unwrap();

    for i in 0..50 {
        Source::new(vec![Type::Symbol(format!("s{i}"))]).add_edge(&mut genv.graph, arg);
        genv.run().unwrap();
    }

    let instance = Type::instance(foo);
    let ret_vertex = genv.graph.vertex(ret).unwrap();
    assert_eq!(ret_vertex.origins(&instance).unwrap().len(), 1);
    for pred in ret_vertex.predecessors() {
        let origins = genv.graph.vertex(pred).unwrap().origins(&instance).unwrap();
        assert_eq!(origins.len(), 1);
    }
}
