mod common;

use common::*;
use sable::ast::expressions::LiteralValue;
use sable::ir::lowering::{LowerOptions, LoweringError, LoweringErrorKind, lower_module};
use sable::ir::{BinaryOp, IrModule, NodeId, NodeKind, RuntimeHelper};
use sable::interchange::Interchange;
use test_case::test_case;

fn lower(body: Vec<sable::ast::statements::Statement>) -> IrModule {
    lower_module(&module("test.src", body), &LowerOptions::default()).expect("lowers")
}

fn lower_err(body: Vec<sable::ast::statements::Statement>) -> LoweringError {
    lower_module(&module("test.src", body), &LowerOptions::default()).expect_err("expected error")
}

/// Binding names of the module body, in order.
fn binding_names(module: &IrModule) -> Vec<String> {
    module
        .body
        .iter()
        .filter_map(|id| match &module.node(*id).kind {
            NodeKind::Binding { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn find_binding<'m>(module: &'m IrModule, name: &str) -> &'m NodeKind {
    let id = module
        .body
        .iter()
        .find(|id| {
            matches!(
                &module.node(**id).kind,
                NodeKind::Binding { name: n, .. } if n == name
            )
        })
        .unwrap_or_else(|| panic!("no binding {name:?}"));
    &module.node(*id).kind
}

#[test]
fn array_destructuring_expands_to_sequential_bindings() {
    // const [a, b, ...rest] = [1, 2, 3, 4];
    let ir = lower(vec![const_decl(
        pat_array(vec![elem(pat("a")), elem(pat("b")), rest(pat("rest"))]),
        array(vec![num(1.0), num(2.0), num(3.0), num(4.0)]),
    )]);

    assert_eq!(binding_names(&ir), vec!["__t0", "a", "b", "rest"]);

    // a = __t0[0] through the 0-based element helper.
    let NodeKind::Binding { init: Some(init), .. } = find_binding(&ir, "a") else {
        panic!("binding shape");
    };
    let NodeKind::RuntimeCall { helper, args } = &ir.node(*init).kind else {
        panic!("expected runtime call, got {:?}", ir.node(*init).kind);
    };
    assert_eq!(*helper, RuntimeHelper::At);
    assert!(matches!(
        &ir.node(args[1]).kind,
        NodeKind::Literal { value: LiteralValue::Number(n) } if *n == 0.0
    ));

    // rest = slice_from(__t0, 2).
    let NodeKind::Binding { init: Some(init), .. } = find_binding(&ir, "rest") else {
        panic!("binding shape");
    };
    let NodeKind::RuntimeCall { helper, args } = &ir.node(*init).kind else {
        panic!("expected runtime call");
    };
    assert_eq!(*helper, RuntimeHelper::SliceFrom);
    assert!(matches!(
        &ir.node(args[1]).kind,
        NodeKind::Literal { value: LiteralValue::Number(n) } if *n == 2.0
    ));
}

// The default guard has the same shape regardless of the bound value: the
// comparison is against the missing sentinel, so 0/false/"" never trigger
// it and the default expression only evaluates inside the guard.
#[test_case(LiteralValue::Undefined)]
#[test_case(LiteralValue::Number(0.0))]
#[test_case(LiteralValue::Bool(false))]
#[test_case(LiteralValue::String(String::new()))]
fn default_guard_compares_against_missing_sentinel(value: LiteralValue) {
    let init = sable::ast::expressions::Expression::Literal(sable::ast::expressions::Literal {
        value,
        span: sp(),
    });
    // const [x = 10] = [<value>];
    let ir = lower(vec![const_decl(
        pat_array(vec![elem(pat_default(pat("x"), num(10.0)))]),
        array(vec![init]),
    )]);

    let guard = ir
        .body
        .iter()
        .find_map(|id| match &ir.node(*id).kind {
            NodeKind::If { condition, then_block, .. } => Some((*condition, *then_block)),
            _ => None,
        })
        .expect("default guard present");

    let NodeKind::Binary { op, rhs, .. } = &ir.node(guard.0).kind else {
        panic!("guard condition is a comparison");
    };
    assert_eq!(*op, BinaryOp::StrictEq);
    assert!(matches!(
        &ir.node(*rhs).kind,
        NodeKind::Literal { value: LiteralValue::Undefined }
    ));

    // The default expression lives inside the guard block: it cannot
    // evaluate unless the extracted value was the sentinel.
    let NodeKind::Block { body, .. } = &ir.node(guard.1).kind else {
        panic!("guard block");
    };
    assert_eq!(body.len(), 1);
}

#[test]
fn object_pattern_renames_and_collects_rest() {
    // const {id: key, ...others} = source;
    let ir = lower(vec![const_decl(
        pat_object(vec![prop("id", pat("key")), prop_rest("others")]),
        name("source"),
    )]);

    assert_eq!(binding_names(&ir), vec!["__t0", "key", "others"]);

    let NodeKind::Binding { init: Some(init), .. } = find_binding(&ir, "others") else {
        panic!("binding shape");
    };
    let NodeKind::RuntimeCall { helper, args } = &ir.node(*init).kind else {
        panic!("expected runtime call");
    };
    assert_eq!(*helper, RuntimeHelper::OmitKeys);
    // The taken key "id" is excluded.
    assert!(matches!(
        &ir.node(args[1]).kind,
        NodeKind::Literal { value: LiteralValue::String(s) } if s == "id"
    ));

    assert!(ir.metadata.global_captures.contains("source"));
}

#[test]
fn nested_patterns_recurse_to_plain_bindings() {
    // const [{a}, [b]] = pairs;
    let ir = lower(vec![const_decl(
        pat_array(vec![
            elem(pat_object(vec![prop_shorthand("a")])),
            elem(pat_array(vec![elem(pat("b"))])),
        ]),
        name("pairs"),
    )]);
    let names = binding_names(&ir);
    assert!(names.contains(&"a".to_string()));
    assert!(names.contains(&"b".to_string()));
    // Every remaining binding is a plain identifier; no pattern survives
    // lowering.
    for id in &ir.body {
        assert!(!matches!(&ir.node(*id).kind, NodeKind::Binding { name, .. } if name.is_empty()));
    }
}

#[test]
fn rest_not_in_final_position_is_rejected() {
    let error = lower_err(vec![const_decl(
        pat_array(vec![rest(pat("head")), elem(pat("tail"))]),
        name("xs"),
    )]);
    assert!(matches!(error, LoweringError::RestNotLast { .. }), "{error:?}");
    assert_eq!(error.kind(), LoweringErrorKind::SyntaxLowering);
    assert_eq!(error.code(), "SyntaxLowering");
}

#[test]
fn unresolved_break_label_is_rejected() {
    let error = lower_err(vec![while_stmt(bool_lit(true), vec![brk(Some("missing"))])]);
    assert!(matches!(
        error,
        LoweringError::UnknownLabel { ref name, .. } if name == "missing"
    ));
    assert_eq!(error.kind(), LoweringErrorKind::ScopeResolution);
}

#[test]
fn labels_attach_to_enclosing_loops() {
    let ir = lower(vec![labeled(
        "outer",
        while_stmt(bool_lit(true), vec![brk(Some("outer"))]),
    )]);
    let found = ir.nodes.values().any(|n| {
        matches!(
            &n.kind,
            NodeKind::Loop { label: Some(l), .. } if l == "outer"
        )
    });
    assert!(found);
}

#[test]
fn label_on_plain_statement_is_rejected() {
    let error = lower_err(vec![labeled("x", expr_stmt(num(1.0)))]);
    assert!(matches!(error, LoweringError::UnsupportedConstruct { .. }));
}

#[test]
fn await_outside_async_is_rejected() {
    let error = lower_err(vec![expr_stmt(sable::ast::expressions::Expression::Await(
        sable::ast::expressions::AwaitExpr {
            argument: Box::new(num(1.0)),
            span: sp(),
        },
    ))]);
    assert!(matches!(error, LoweringError::AwaitOutsideAsync { .. }));
}

#[test]
fn await_marks_a_suspension_point() {
    let body = vec![expr_stmt(sable::ast::expressions::Expression::Await(
        sable::ast::expressions::AwaitExpr {
            argument: Box::new(call(name("fetch"), vec![])),
            span: sp(),
        },
    ))];
    let ir = lower(vec![sable::ast::statements::Statement::Function(
        async_function(Some("task"), vec![], body),
    )]);
    let has_marker = ir
        .nodes
        .values()
        .any(|n| matches!(n.kind, NodeKind::Await { .. }));
    assert!(has_marker);
}

#[test]
fn for_of_with_destructured_binding_expands_in_prologue() {
    // for (const {id, name = "anon"} of items) { out.push(id); }
    let ir = lower(vec![for_of(
        pat_object(vec![prop_shorthand("id"), prop("name", pat_default(pat("name"), str_lit("anon")))]),
        name("items"),
        vec![expr_stmt(call(member(name("out"), "push"), vec![name("id")]))],
    )]);

    let (binding, body) = ir
        .nodes
        .values()
        .find_map(|n| match &n.kind {
            NodeKind::IteratorLoop { binding, body, .. } => Some((binding.clone(), *body)),
            _ => None,
        })
        .expect("iterator loop");
    assert!(binding.starts_with("__t"), "loop binds a temp, got {binding}");

    // The prologue destructures from the temp before user statements run.
    let NodeKind::Block { body, .. } = &ir.node(body).kind else {
        panic!("loop body is a block");
    };
    let first_binding = body.iter().find_map(|id| match &ir.node(*id).kind {
        NodeKind::Binding { name, .. } => Some(name.clone()),
        _ => None,
    });
    // The loop variable is __t0; the prologue re-destructures it through a
    // fresh temp before any user statement runs.
    assert_eq!(first_binding.as_deref(), Some("__t1"));
    assert!(ir.metadata.global_captures.contains("items"));
    assert!(ir.metadata.global_captures.contains("out"));
}

#[test]
fn lowering_is_deterministic() {
    let build = || {
        lower(vec![
            const_decl(
                pat_array(vec![elem(pat("a")), rest(pat("rest"))]),
                array(vec![num(1.0), num(2.0)]),
            ),
            while_stmt(bool_lit(true), vec![brk(None)]),
        ])
    };
    let a = Interchange::new(&build()).to_json().expect("serializes");
    let b = Interchange::new(&build()).to_json().expect("serializes");
    assert_eq!(a, b, "two runs over identical input must serialize identically");
}

#[test]
fn id_seed_shifts_every_node_id() {
    let ast = module("test.src", vec![expr_stmt(num(1.0))]);
    let low = lower_module(&ast, &LowerOptions { id_seed: 1, node_budget: None }).unwrap();
    let high = lower_module(&ast, &LowerOptions { id_seed: 100, node_budget: None }).unwrap();
    assert!(low.nodes.contains_key(&NodeId(1)));
    assert!(high.nodes.contains_key(&NodeId(100)));
    assert_eq!(low.nodes.len(), high.nodes.len());
}

#[test]
fn exports_resolve_to_module_level_bindings() {
    let mut ast = module(
        "test.src",
        vec![const_decl(pat("answer"), num(42.0))],
    );
    ast.exports.push(ident("answer"));
    let ir = lower_module(&ast, &LowerOptions::default()).expect("lowers");
    assert_eq!(ir.exports.len(), 1);
    assert_eq!(ir.exports[0].name, "answer");
    assert!(matches!(
        &ir.node(ir.exports[0].target).kind,
        NodeKind::Binding { name, .. } if name == "answer"
    ));
}

#[test]
fn unresolved_export_is_rejected() {
    let mut ast = module("test.src", vec![]);
    ast.exports.push(ident("ghost"));
    let error = lower_module(&ast, &LowerOptions::default()).expect_err("export must resolve");
    assert!(matches!(error, LoweringError::ExportNotFound { ref name, .. } if name == "ghost"));
}

#[test]
fn node_budget_discards_the_module() {
    let error = lower_module(
        &module("test.src", vec![const_decl(pat("x"), array(vec![num(1.0), num(2.0)]))]),
        &LowerOptions {
            id_seed: 1,
            node_budget: Some(2),
        },
    )
    .expect_err("budget exceeded");
    assert!(matches!(error, LoweringError::NodeBudgetExceeded { budget: 2, .. }));
}
