//! Built-in optional passes. Both are deliberately conservative: anything
//! they cannot prove is left for the target runtime to evaluate.

use crate::ast::expressions::{BinaryOp, LiteralValue, LogicalOp, UnaryOp};
use crate::ir::{Node, NodeKind, TemplateChunk};

use super::{ApiVersion, Pass, PassContext, PassError, REGISTRY_API};

/// Folds unary, binary and logical operations over literal operands.
pub struct ConstantFold;

impl Pass for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn api_version(&self) -> ApiVersion {
        REGISTRY_API
    }

    fn priority(&self) -> i32 {
        10
    }

    fn mandatory(&self) -> bool {
        false
    }

    fn input_kinds(&self) -> Option<&'static [&'static str]> {
        Some(&["Binary", "Unary", "Logical"])
    }

    fn output_kinds(&self) -> Option<&'static [&'static str]> {
        Some(&["Literal"])
    }

    fn wants(&self, node: &Node) -> bool {
        matches!(
            node.kind,
            NodeKind::Binary { .. } | NodeKind::Unary { .. } | NodeKind::Logical { .. }
        )
    }

    fn transform(&self, node: &Node, ctx: &PassContext<'_>) -> Result<Option<Node>, PassError> {
        let literal_of = |id| match ctx.module.get(id) {
            Some(Node {
                kind: NodeKind::Literal { value },
                ..
            }) => Some(value.clone()),
            _ => None,
        };

        let folded = match &node.kind {
            NodeKind::Binary { op, lhs, rhs } => {
                match (literal_of(*lhs), literal_of(*rhs)) {
                    (Some(a), Some(b)) => fold_binary(*op, &a, &b),
                    _ => None,
                }
            }
            NodeKind::Unary { op, operand } => {
                literal_of(*operand).and_then(|v| fold_unary(*op, &v))
            }
            NodeKind::Logical { op, lhs, rhs } => {
                match (literal_of(*lhs), literal_of(*rhs)) {
                    (Some(a), Some(b)) => fold_logical(*op, &a, &b),
                    _ => None,
                }
            }
            _ => None,
        };

        Ok(folded.map(|value| Node::detached(NodeKind::Literal { value }, node.span)))
    }
}

fn fold_binary(op: BinaryOp, a: &LiteralValue, b: &LiteralValue) -> Option<LiteralValue> {
    use LiteralValue::{Bool, Number, String as Str};
    match (op, a, b) {
        (BinaryOp::Add, Number(x), Number(y)) => finite(x + y),
        (BinaryOp::Sub, Number(x), Number(y)) => finite(x - y),
        (BinaryOp::Mul, Number(x), Number(y)) => finite(x * y),
        (BinaryOp::Div, Number(x), Number(y)) => finite(x / y),
        (BinaryOp::Mod, Number(x), Number(y)) => finite(x % y),
        (BinaryOp::Add, Str(x), Str(y)) => Some(Str(format!("{x}{y}"))),
        (BinaryOp::Lt, Number(x), Number(y)) => Some(Bool(x < y)),
        (BinaryOp::Le, Number(x), Number(y)) => Some(Bool(x <= y)),
        (BinaryOp::Gt, Number(x), Number(y)) => Some(Bool(x > y)),
        (BinaryOp::Ge, Number(x), Number(y)) => Some(Bool(x >= y)),
        (BinaryOp::Eq | BinaryOp::StrictEq, Number(x), Number(y)) => Some(Bool(x == y)),
        (BinaryOp::Ne | BinaryOp::StrictNe, Number(x), Number(y)) => Some(Bool(x != y)),
        (BinaryOp::Eq | BinaryOp::StrictEq, Str(x), Str(y)) => Some(Bool(x == y)),
        (BinaryOp::Ne | BinaryOp::StrictNe, Str(x), Str(y)) => Some(Bool(x != y)),
        (BinaryOp::Eq | BinaryOp::StrictEq, Bool(x), Bool(y)) => Some(Bool(x == y)),
        (BinaryOp::Ne | BinaryOp::StrictNe, Bool(x), Bool(y)) => Some(Bool(x != y)),
        _ => None,
    }
}

// Division by zero and overflow produce non-finite values the schema
// rejects; leave those expressions for the runtime.
fn finite(value: f64) -> Option<LiteralValue> {
    value.is_finite().then_some(LiteralValue::Number(value))
}

fn fold_unary(op: UnaryOp, value: &LiteralValue) -> Option<LiteralValue> {
    match (op, value) {
        (UnaryOp::Not, LiteralValue::Bool(b)) => Some(LiteralValue::Bool(!b)),
        (UnaryOp::Neg, LiteralValue::Number(n)) => Some(LiteralValue::Number(-n)),
        _ => None,
    }
}

fn fold_logical(op: LogicalOp, a: &LiteralValue, b: &LiteralValue) -> Option<LiteralValue> {
    match op {
        LogicalOp::And => match a {
            LiteralValue::Bool(false) => Some(a.clone()),
            LiteralValue::Bool(true) => Some(b.clone()),
            _ => None,
        },
        LogicalOp::Or => match a {
            LiteralValue::Bool(true) => Some(a.clone()),
            LiteralValue::Bool(false) => Some(b.clone()),
            _ => None,
        },
        LogicalOp::Coalesce => match a {
            LiteralValue::Null | LiteralValue::Undefined => Some(b.clone()),
            _ => Some(a.clone()),
        },
    }
}

/// Merges adjacent literal template parts and collapses expression-free
/// templates into plain string literals.
pub struct TemplateCollapse;

impl Pass for TemplateCollapse {
    fn name(&self) -> &'static str {
        "template-collapse"
    }

    fn api_version(&self) -> ApiVersion {
        REGISTRY_API
    }

    fn priority(&self) -> i32 {
        20
    }

    fn mandatory(&self) -> bool {
        false
    }

    fn input_kinds(&self) -> Option<&'static [&'static str]> {
        Some(&["Template"])
    }

    fn output_kinds(&self) -> Option<&'static [&'static str]> {
        Some(&["Template", "Literal"])
    }

    fn wants(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::Template { .. })
    }

    fn transform(&self, node: &Node, _ctx: &PassContext<'_>) -> Result<Option<Node>, PassError> {
        let NodeKind::Template { parts } = &node.kind else {
            return Ok(None);
        };

        let mut merged: Vec<TemplateChunk> = Vec::with_capacity(parts.len());
        let mut changed = false;
        for part in parts {
            match (merged.last_mut(), part) {
                (Some(TemplateChunk::Lit(acc)), TemplateChunk::Lit(next)) => {
                    acc.push_str(next);
                    changed = true;
                }
                _ => merged.push(part.clone()),
            }
        }

        let all_literal = merged
            .iter()
            .all(|part| matches!(part, TemplateChunk::Lit(_)));
        if all_literal {
            let text = merged
                .iter()
                .map(|part| match part {
                    TemplateChunk::Lit(s) => s.as_str(),
                    TemplateChunk::Expr(_) => unreachable!(),
                })
                .collect::<String>();
            return Ok(Some(Node::detached(
                NodeKind::Literal {
                    value: LiteralValue::String(text),
                },
                node.span,
            )));
        }

        if changed {
            return Ok(Some(Node::detached(
                NodeKind::Template { parts: merged },
                node.span,
            )));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::common::Span;
    use crate::ir::{IrModule, NodeId};
    use test_case::test_case;

    fn fold_in_module(op: BinaryOp, a: LiteralValue, b: LiteralValue) -> Option<LiteralValue> {
        let mut module = IrModule::new("m", 1);
        let lhs = module.insert(NodeKind::Literal { value: a }, Span::default());
        let rhs = module.insert(NodeKind::Literal { value: b }, Span::default());
        let bin = module.insert(NodeKind::Binary { op, lhs, rhs }, Span::default());
        let ctx = PassContext { module: &module };
        let node = module.node(bin).clone();
        match ConstantFold.transform(&node, &ctx).expect("no error") {
            Some(Node {
                kind: NodeKind::Literal { value },
                ..
            }) => Some(value),
            _ => None,
        }
    }

    #[test_case(BinaryOp::Add, 2.0, 3.0 => Some(5.0))]
    #[test_case(BinaryOp::Mul, 4.0, 2.5 => Some(10.0))]
    #[test_case(BinaryOp::Div, 1.0, 0.0 => None; "division by zero is left to the runtime")]
    fn numeric_folding(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
        match fold_in_module(op, LiteralValue::Number(a), LiteralValue::Number(b)) {
            Some(LiteralValue::Number(n)) => Some(n),
            _ => None,
        }
    }

    #[test]
    fn non_literal_operand_is_left_alone() {
        let mut module = IrModule::new("m", 1);
        let lhs = module.insert(
            NodeKind::NameRef {
                name: "x".into(),
                resolution: crate::ir::Resolution::Global,
            },
            Span::default(),
        );
        let rhs = module.insert(
            NodeKind::Literal {
                value: LiteralValue::Number(1.0),
            },
            Span::default(),
        );
        let bin = module.insert(
            NodeKind::Binary {
                op: BinaryOp::Add,
                lhs,
                rhs,
            },
            Span::default(),
        );
        let ctx = PassContext { module: &module };
        let node = module.node(bin).clone();
        assert!(ConstantFold.transform(&node, &ctx).unwrap().is_none());
    }

    #[test]
    fn expression_free_template_becomes_a_string() {
        let node = Node {
            id: NodeId(9),
            kind: NodeKind::Template {
                parts: vec![
                    TemplateChunk::Lit("hello ".into()),
                    TemplateChunk::Lit("world".into()),
                ],
            },
            span: Span::default(),
        };
        let module = IrModule::new("m", 1);
        let ctx = PassContext { module: &module };
        let out = TemplateCollapse.transform(&node, &ctx).unwrap().unwrap();
        assert!(matches!(
            out.kind,
            NodeKind::Literal {
                value: LiteralValue::String(ref s)
            } if s == "hello world"
        ));
    }
}
