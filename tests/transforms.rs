mod common;

use common::*;
use sable::ast::common::Span;
use sable::ast::expressions::{BinaryOp, LiteralValue};
use sable::driver::{CompileOptions, compile_module};
use sable::ir::lowering::{LowerOptions, lower_module};
use sable::ir::{IrModule, Node, NodeKind};
use sable::transform::passes::{ConstantFold, TemplateCollapse};
use sable::transform::{
    ApiVersion, Compatibility, Pass, PassContext, PassError, PassValidation, REGISTRY_API,
    TransformError, TransformRegistry,
};

fn lowered(body: Vec<sable::ast::statements::Statement>) -> IrModule {
    lower_module(&module("transforms.src", body), &LowerOptions::default()).expect("lowers")
}

/// A pass that fails on every node it sees.
struct AlwaysFails {
    mandatory: bool,
}

impl Pass for AlwaysFails {
    fn name(&self) -> &'static str {
        "always-fails"
    }
    fn api_version(&self) -> ApiVersion {
        REGISTRY_API
    }
    fn priority(&self) -> i32 {
        5
    }
    fn mandatory(&self) -> bool {
        self.mandatory
    }
    fn transform(&self, _node: &Node, _ctx: &PassContext<'_>) -> Result<Option<Node>, PassError> {
        Err(PassError::new("broken third-party pass"))
    }
}

/// A pass whose output never survives its own validation.
struct SelfRejecting {
    mandatory: bool,
    rollback_works: bool,
}

impl Pass for SelfRejecting {
    fn name(&self) -> &'static str {
        "self-rejecting"
    }
    fn api_version(&self) -> ApiVersion {
        REGISTRY_API
    }
    fn priority(&self) -> i32 {
        5
    }
    fn mandatory(&self) -> bool {
        self.mandatory
    }
    fn wants(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::Literal { .. })
    }
    fn transform(&self, node: &Node, _ctx: &PassContext<'_>) -> Result<Option<Node>, PassError> {
        Ok(Some(Node::detached(
            NodeKind::Literal {
                value: LiteralValue::Null,
            },
            node.span,
        )))
    }
    fn validate(&self, _original: &Node, _transformed: &Node) -> PassValidation {
        PassValidation::invalid(vec!["output rejected by construction".to_string()])
    }
    fn rollback(&self, transformed: &Node) -> Option<Node> {
        self.rollback_works.then(|| transformed.clone())
    }
}

struct WrongMajor;

impl Pass for WrongMajor {
    fn name(&self) -> &'static str {
        "wrong-major"
    }
    fn api_version(&self) -> ApiVersion {
        ApiVersion {
            major: REGISTRY_API.major + 1,
            minor: 0,
        }
    }
    fn priority(&self) -> i32 {
        0
    }
    fn mandatory(&self) -> bool {
        false
    }
    fn transform(&self, _node: &Node, _ctx: &PassContext<'_>) -> Result<Option<Node>, PassError> {
        Ok(None)
    }
}

struct OldMinor;

impl Pass for OldMinor {
    fn name(&self) -> &'static str {
        "old-minor"
    }
    fn api_version(&self) -> ApiVersion {
        ApiVersion {
            major: REGISTRY_API.major,
            minor: 0,
        }
    }
    fn priority(&self) -> i32 {
        0
    }
    fn mandatory(&self) -> bool {
        false
    }
    fn transform(&self, _node: &Node, _ctx: &PassContext<'_>) -> Result<Option<Node>, PassError> {
        Ok(None)
    }
}

#[test]
fn constant_folding_collapses_literal_arithmetic() {
    // const x = 1 + 2 * 3;
    let mut ir = lowered(vec![const_decl(
        pat("x"),
        add(num(1.0), binary(BinaryOp::Mul, num(2.0), num(3.0))),
    )]);

    let mut registry = TransformRegistry::new();
    registry.register(Box::new(ConstantFold)).expect("registers");
    let stats = registry.run(&mut ir).expect("runs");
    assert!(stats.changed);

    let folded = ir.body.iter().find_map(|id| match &ir.node(*id).kind {
        NodeKind::Binding { name, init: Some(init), .. } if name == "x" => Some(*init),
        _ => None,
    });
    let folded = folded.expect("binding survives");
    assert!(matches!(
        &ir.node(folded).kind,
        NodeKind::Literal { value: LiteralValue::Number(n) } if *n == 7.0
    ));
    // The replaced operand subtrees were pruned.
    assert!(
        !ir.nodes
            .values()
            .any(|n| matches!(n.kind, NodeKind::Binary { .. }))
    );
}

#[test]
fn a_throwing_optional_pass_does_not_stop_the_pipeline() {
    let mut registry = TransformRegistry::new();
    registry
        .register(Box::new(AlwaysFails { mandatory: false }))
        .expect("registers");
    registry.register(Box::new(ConstantFold)).expect("registers");

    // The full pipeline still reaches emission.
    let output = compile_module(
        &module(
            "isolated.src",
            vec![const_decl(pat("x"), add(num(1.0), num(2.0)))],
        ),
        &CompileOptions::default(),
        &registry,
    )
    .expect("optional failures are isolated");

    let failing = output
        .stats
        .per_pass
        .iter()
        .find(|p| p.name == "always-fails")
        .expect("stats recorded");
    assert!(failing.failed > 0);
    let folding = output
        .stats
        .per_pass
        .iter()
        .find(|p| p.name == "constant-fold")
        .expect("stats recorded");
    assert_eq!(folding.applied, 1, "the other pass still ran");
    assert!(output.emitted.contains_key("lua"));
}

#[test]
fn a_throwing_mandatory_pass_aborts_the_run() {
    let mut ir = lowered(vec![const_decl(pat("x"), num(1.0))]);
    let mut registry = TransformRegistry::new();
    registry
        .register(Box::new(AlwaysFails { mandatory: true }))
        .expect("registers");
    let error = registry.run(&mut ir).expect_err("mandatory failure aborts");
    assert!(matches!(error, TransformError::MandatoryPassFailed { .. }));
    assert_eq!(error.code(), "ExtensionRuntime");
}

#[test]
fn rejected_optional_output_leaves_the_node_unchanged() {
    let mut ir = lowered(vec![const_decl(pat("x"), num(42.0))]);
    let before = ir.nodes.clone();
    let mut registry = TransformRegistry::new();
    registry
        .register(Box::new(SelfRejecting {
            mandatory: false,
            rollback_works: false,
        }))
        .expect("registers");
    let stats = registry.run(&mut ir).expect("runs");
    assert!(!stats.changed);
    assert_eq!(stats.per_pass[0].rejected, 1);
    assert_eq!(ir.nodes, before);
}

#[test]
fn rejected_mandatory_output_uses_rollback_when_available() {
    let mut ir = lowered(vec![const_decl(pat("x"), num(42.0))]);
    let mut registry = TransformRegistry::new();
    registry
        .register(Box::new(SelfRejecting {
            mandatory: true,
            rollback_works: true,
        }))
        .expect("registers");
    let stats = registry.run(&mut ir).expect("rollback saves the run");
    assert!(stats.changed);
}

#[test]
fn rejected_mandatory_output_without_rollback_aborts() {
    let mut ir = lowered(vec![const_decl(pat("x"), num(42.0))]);
    let mut registry = TransformRegistry::new();
    registry
        .register(Box::new(SelfRejecting {
            mandatory: true,
            rollback_works: false,
        }))
        .expect("registers");
    let error = registry.run(&mut ir).expect_err("no rollback, no run");
    assert!(matches!(error, TransformError::MandatoryPassInvalid { .. }));
}

#[test]
fn incompatible_major_version_refuses_to_load() {
    let mut registry = TransformRegistry::new();
    let error = registry.register(Box::new(WrongMajor)).expect_err("refused");
    assert!(matches!(error, TransformError::IncompatibleVersion { .. }));
    assert_eq!(error.code(), "ExtensionIncompatible");
    assert!(registry.is_empty());
}

#[test]
fn deprecated_minor_loads_with_a_warning() {
    let mut registry = TransformRegistry::new();
    let compatibility = registry.register(Box::new(OldMinor)).expect("loads");
    assert_eq!(compatibility, Compatibility::Deprecated);
}

#[test]
fn duplicate_pass_names_are_rejected() {
    let mut registry = TransformRegistry::new();
    registry.register(Box::new(ConstantFold)).expect("first");
    let error = registry
        .register(Box::new(ConstantFold))
        .expect_err("second");
    assert!(matches!(error, TransformError::DuplicatePass { .. }));
}

#[test]
fn passes_apply_in_ascending_priority_order() {
    // constant-fold (10) runs before template-collapse (20): the template
    // `${1 + 1}` first folds to a literal, but collapse only merges literal
    // *parts*, so the structure proves both ran on the same tree.
    let mut ir = lowered(vec![const_decl(
        pat("s"),
        template(vec![
            sable::ast::expressions::TemplatePart::String("a".into()),
            sable::ast::expressions::TemplatePart::String("b".into()),
        ]),
    )]);
    let mut registry = TransformRegistry::new();
    registry.register(Box::new(TemplateCollapse)).expect("registers");
    registry.register(Box::new(ConstantFold)).expect("registers");
    let stats = registry.run(&mut ir).expect("runs");
    assert_eq!(stats.per_pass[0].name, "constant-fold");
    assert_eq!(stats.per_pass[1].name, "template-collapse");
    assert_eq!(stats.per_pass[1].applied, 1);

    let value = ir.body.iter().find_map(|id| match &ir.node(*id).kind {
        NodeKind::Binding { init: Some(init), .. } => Some(*init),
        _ => None,
    });
    assert!(matches!(
        &ir.node(value.expect("binding")).kind,
        NodeKind::Literal { value: LiteralValue::String(s) } if s == "ab"
    ));
}

#[test]
fn replacement_rewrites_the_parent_reference() {
    let mut ir = IrModule::new("m", 1);
    let lit = ir.insert(
        NodeKind::Literal {
            value: LiteralValue::Number(2.0),
        },
        Span::default(),
    );
    let neg = ir.insert(
        NodeKind::Unary {
            op: sable::ast::expressions::UnaryOp::Neg,
            operand: lit,
        },
        Span::default(),
    );
    let stmt = ir.insert(NodeKind::ExpressionStmt { expr: neg }, Span::default());
    ir.body.push(stmt);

    let mut registry = TransformRegistry::new();
    registry.register(Box::new(ConstantFold)).expect("registers");
    registry.run(&mut ir).expect("runs");

    // The statement now points at a fresh literal node; the unary is gone.
    let NodeKind::ExpressionStmt { expr } = ir.node(stmt).kind.clone() else {
        panic!("statement survives");
    };
    assert!(matches!(
        &ir.node(expr).kind,
        NodeKind::Literal { value: LiteralValue::Number(n) } if *n == -2.0
    ));
    assert!(ir.get(neg).is_none(), "replaced node was removed");
}
