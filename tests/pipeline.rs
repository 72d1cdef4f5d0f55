mod common;

use common::*;
use sable::ast::common::Span;
use sable::check::{self, CheckCode};
use sable::driver::{CompileError, CompileOptions, compile_module, compile_path};
use sable::interchange::Interchange;
use sable::ir::{IrModule, NodeId, NodeKind, Resolution};
use sable::transform::TransformRegistry;
use std::io::Write;

fn both_backends() -> CompileOptions {
    CompileOptions {
        backends: vec!["lua".to_string(), "stack".to_string()],
        ..CompileOptions::default()
    }
}

fn sample_body() -> Vec<sable::ast::statements::Statement> {
    vec![
        const_decl(
            pat_array(vec![elem(pat("first")), rest(pat("others"))]),
            array(vec![num(1.0), num(2.0), num(3.0)]),
        ),
        sable::ast::statements::Statement::Function(function(
            Some("pick"),
            vec![pat("xs")],
            vec![if_stmt(bool_lit(true), vec![ret(Some(name("xs")))]), ret(None)],
        )),
        expr_stmt(call(name("pick"), vec![name("others")])),
    ]
}

#[test]
fn pipeline_produces_valid_referentially_closed_ir() {
    let output = compile_module(
        &module("pipeline.src", sample_body()),
        &both_backends(),
        &TransformRegistry::new(),
    )
    .expect("compiles");

    // Emission happened through both backends.
    assert_eq!(output.emitted.len(), 2);
    assert!(output.emitted.contains_key("lua"));
    assert!(output.emitted.contains_key("stack"));

    // Every reachable id resolves; validation still passes on the output.
    let module = &output.module;
    for id in module.reachable() {
        assert!(module.get(id).is_some(), "dangling node {id}");
    }
    assert!(check::validate(module).ok());
}

#[test]
fn validator_collects_every_violation_in_one_pass() {
    let mut ir = IrModule::new("broken.src", 1);
    // Violation 1: empty binding name (schema).
    let bad_binding = ir.insert(
        NodeKind::Binding {
            name: String::new(),
            init: None,
            mutable: false,
        },
        Span::default(),
    );
    // Violation 2: dangling child reference (referential).
    let stmt = ir.insert(
        NodeKind::ExpressionStmt {
            expr: NodeId(9999),
        },
        Span::default(),
    );
    // Violation 3: local name reference with no binding (scope).
    let ghost = ir.insert(
        NodeKind::NameRef {
            name: "ghost".into(),
            resolution: Resolution::Local,
        },
        Span::default(),
    );
    let ghost_stmt = ir.insert(NodeKind::ExpressionStmt { expr: ghost }, Span::default());
    ir.body.extend([bad_binding, stmt, ghost_stmt]);

    let report = check::validate(&ir);
    assert!(!report.ok());
    let codes: Vec<CheckCode> = report.violations.iter().map(|v| v.code).collect();
    assert!(codes.contains(&CheckCode::SchemaViolation), "{codes:?}");
    assert!(codes.contains(&CheckCode::ReferentialIntegrity), "{codes:?}");
    assert!(codes.contains(&CheckCode::ScopeIntegrity), "{codes:?}");
    assert!(report.violations.len() >= 3);
}

#[test]
fn invalid_module_aborts_before_transforms_and_emission() {
    // A hand-corrupted module cannot come out of the lowerer, so drive the
    // validator directly through a module containing a dangling export.
    let mut ir = IrModule::new("broken.src", 1);
    ir.exports.push(sable::ir::Export {
        name: "ghost".into(),
        target: NodeId(777),
    });
    let report = check::validate(&ir);
    assert!(!report.ok());
    assert_eq!(report.violations[0].code, CheckCode::ReferentialIntegrity);
}

#[test]
fn every_reachable_cfg_block_has_exactly_one_terminator() {
    let output = compile_module(
        &module("cfg.src", sample_body()),
        &CompileOptions::default(),
        &TransformRegistry::new(),
    )
    .expect("compiles");

    assert!(!output.module.cfgs.is_empty(), "functions grow cfgs");
    for cfg in output.module.cfgs.values() {
        assert!(cfg.entry < cfg.blocks.len());
        for block in cfg.blocks.iter().filter(|b| !b.dead) {
            // The type system enforces exactly one terminator; successors
            // must stay in range.
            for successor in block.terminator.kind.successors() {
                assert!(successor < cfg.blocks.len());
            }
        }
    }
}

#[test]
fn dead_blocks_are_flagged_not_rejected() {
    let body = vec![sable::ast::statements::Statement::Function(function(
        Some("early"),
        vec![],
        vec![ret(Some(num(1.0))), expr_stmt(call(name("never"), vec![]))],
    ))];
    let output = compile_module(
        &module("dead.src", body),
        &CompileOptions::default(),
        &TransformRegistry::new(),
    )
    .expect("dead code is a warning, not an error");
    let has_dead = output
        .module
        .cfgs
        .values()
        .any(|cfg| cfg.blocks.iter().any(|b| b.dead));
    assert!(has_dead);
}

#[test]
fn unknown_backend_is_rejected() {
    let options = CompileOptions {
        backends: vec!["wasm".to_string()],
        ..CompileOptions::default()
    };
    let error = compile_module(
        &module("m.src", vec![]),
        &options,
        &TransformRegistry::new(),
    )
    .expect_err("unknown backend");
    assert!(matches!(error, CompileError::UnknownBackend { ref id } if id == "wasm"));
}

#[test]
fn interchange_snapshot_round_trips_through_json() {
    let output = compile_module(
        &module("snap.src", sample_body()),
        &CompileOptions::default(),
        &TransformRegistry::new(),
    )
    .expect("compiles");

    let snapshot = Interchange::new(&output.module);
    let json = snapshot.to_json().expect("serializes");
    let restored = Interchange::from_json(&json).expect("parses").into_module();
    assert_eq!(restored.nodes, output.module.nodes);
    assert_eq!(restored.body, output.module.body);
    assert_eq!(restored.cfgs, output.module.cfgs);
    // A restored module is still valid.
    assert!(check::validate(&restored).ok());
}

#[test]
fn compile_path_accepts_persisted_parser_output() {
    let ast = module("disk.src", vec![const_decl(pat("x"), num(5.0))]);
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(serde_json::to_string(&ast).expect("serializes").as_bytes())
        .expect("writes");

    let output = compile_path(
        file.path(),
        &CompileOptions::default(),
        &TransformRegistry::new(),
    )
    .expect("compiles from disk");
    assert!(output.emitted.contains_key("lua"));
}

#[test]
fn fixed_seed_reproduces_identical_output() {
    let run = || {
        compile_module(
            &module("seeded.src", sample_body()),
            &both_backends(),
            &TransformRegistry::new(),
        )
        .expect("compiles")
    };
    let a = run();
    let b = run();
    assert_eq!(
        Interchange::new(&a.module).to_json().unwrap(),
        Interchange::new(&b.module).to_json().unwrap()
    );
    assert_eq!(a.emitted["lua"].code, b.emitted["lua"].code);
    assert_eq!(a.emitted["stack"].code, b.emitted["stack"].code);
}
