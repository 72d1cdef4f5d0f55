//! Destructuring expansion. Every pattern is reduced to an ordered sequence
//! of plain identifier bindings; nesting recurses until nothing composite
//! remains. Backends never see a pattern.

use tracing::{debug, instrument};

use crate::ast::common::Span;
use crate::ast::expressions::{LiteralValue, PropertyKey};
use crate::ast::patterns::{ArrayPatternElement, ObjectPatternProperty, Pattern};
use crate::ir::{BinaryOp, KeyRef, NodeId, NodeKind, RuntimeHelper};

use super::{LowerCtx, errors::LoweringError, expressions::lower_expression};

/// Expands one pattern bound from the value of `source` (a placed
/// expression node), appending the resulting statements to `out` in
/// evaluation order.
#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_declaration_pattern(
    ctx: &mut LowerCtx,
    pattern: &Pattern,
    source: NodeId,
    mutable: bool,
    out: &mut Vec<NodeId>,
) -> Result<(), LoweringError> {
    match pattern {
        Pattern::Identifier(ident) => {
            ctx.scopes.bind(&ident.name);
            let binding = ctx.add_node(
                NodeKind::Binding {
                    name: ident.name.clone(),
                    init: Some(source),
                    mutable,
                },
                ident.span,
            )?;
            out.push(binding);
        }
        Pattern::Assignment(assignment) => {
            lower_defaulted(ctx, assignment, source, mutable, out)?;
        }
        Pattern::Array(array) => {
            debug!(elements = array.elements.len(), "expanding array pattern");
            let temp = bind_temp(ctx, source, array.span, out)?;
            let last = array.elements.len().saturating_sub(1);
            for (index, element) in array.elements.iter().enumerate() {
                let Some(element) = element else {
                    // Elision: the position is skipped entirely.
                    continue;
                };
                match element {
                    ArrayPatternElement::Pattern(inner) => {
                        let elem_source = element_at(ctx, &temp, index, inner.span())?;
                        lower_declaration_pattern(ctx, inner, elem_source, mutable, out)?;
                    }
                    ArrayPatternElement::Rest(inner) => {
                        if index != last {
                            return Err(LoweringError::RestNotLast { span: inner.span() });
                        }
                        let temp_ref = ctx.name_ref(&temp, inner.span())?;
                        let start = number(ctx, index as f64, inner.span())?;
                        let rest_source = ctx.add_node(
                            NodeKind::RuntimeCall {
                                helper: RuntimeHelper::SliceFrom,
                                args: vec![temp_ref, start],
                            },
                            inner.span(),
                        )?;
                        lower_declaration_pattern(ctx, inner, rest_source, mutable, out)?;
                    }
                }
            }
        }
        Pattern::Object(object) => {
            debug!(
                properties = object.properties.len(),
                "expanding object pattern"
            );
            let temp = bind_temp(ctx, source, object.span, out)?;
            let has_rest = object
                .properties
                .iter()
                .any(|p| matches!(p, ObjectPatternProperty::Rest { .. }));
            let last = object.properties.len().saturating_sub(1);
            let mut taken: Vec<String> = Vec::new();
            for (index, property) in object.properties.iter().enumerate() {
                match property {
                    ObjectPatternProperty::Property { key, value, span } => {
                        let (prop_source, shorthand) = match key {
                            PropertyKey::Named(ident) => {
                                taken.push(ident.name.clone());
                                let object_ref = ctx.name_ref(&temp, *span)?;
                                let member = ctx.add_node(
                                    NodeKind::Member {
                                        object: object_ref,
                                        key: KeyRef::Named(ident.name.clone()),
                                    },
                                    *span,
                                )?;
                                (member, Some(ident))
                            }
                            PropertyKey::Computed(expr) => {
                                // Rest has no way to exclude a key only
                                // known at runtime.
                                if has_rest {
                                    return Err(LoweringError::RestWithComputedKeys {
                                        span: *span,
                                    });
                                }
                                let key_id = lower_expression(ctx, expr)?;
                                let object_ref = ctx.name_ref(&temp, *span)?;
                                let member = ctx.add_node(
                                    NodeKind::Member {
                                        object: object_ref,
                                        key: KeyRef::Computed(key_id),
                                    },
                                    *span,
                                )?;
                                (member, None)
                            }
                        };
                        match value {
                            Some(inner) => lower_declaration_pattern(
                                ctx,
                                inner,
                                prop_source,
                                mutable,
                                out,
                            )?,
                            None => {
                                // Shorthand `{id}` binds the key's own name.
                                let ident = shorthand.ok_or(
                                    LoweringError::UnsupportedConstruct {
                                        construct: "shorthand property with computed key",
                                        span: *span,
                                    },
                                )?;
                                lower_declaration_pattern(
                                    ctx,
                                    &Pattern::Identifier(ident.clone()),
                                    prop_source,
                                    mutable,
                                    out,
                                )?;
                            }
                        }
                    }
                    ObjectPatternProperty::Rest { name, span } => {
                        if index != last {
                            return Err(LoweringError::RestNotLast { span: *span });
                        }
                        let temp_ref = ctx.name_ref(&temp, *span)?;
                        let mut args = vec![temp_ref];
                        for key in &taken {
                            let key_lit = ctx.add_node(
                                NodeKind::Literal {
                                    value: LiteralValue::String(key.clone()),
                                },
                                *span,
                            )?;
                            args.push(key_lit);
                        }
                        let rest_source = ctx.add_node(
                            NodeKind::RuntimeCall {
                                helper: RuntimeHelper::OmitKeys,
                                args,
                            },
                            *span,
                        )?;
                        ctx.scopes.bind(&name.name);
                        let binding = ctx.add_node(
                            NodeKind::Binding {
                                name: name.name.clone(),
                                init: Some(rest_source),
                                mutable,
                            },
                            *span,
                        )?;
                        out.push(binding);
                    }
                }
            }
        }
    }
    Ok(())
}

/// A target with a default: bind the extracted value, then overwrite it
/// with the default only when it is the missing sentinel. A
/// defined-but-falsy value (`0`, `false`, `""`) never triggers the default,
/// and the default expression is evaluated only on the miss path.
fn lower_defaulted(
    ctx: &mut LowerCtx,
    assignment: &crate::ast::patterns::AssignmentPattern,
    source: NodeId,
    mutable: bool,
    out: &mut Vec<NodeId>,
) -> Result<(), LoweringError> {
    let span = assignment.span;
    let (name, bind_inner) = match &assignment.target {
        // Plain identifier target: no extra temp needed.
        Pattern::Identifier(ident) => (ident.name.clone(), None),
        composite => (ctx.fresh_temp(), Some(composite)),
    };

    ctx.scopes.bind(&name);
    let binding = ctx.add_node(
        NodeKind::Binding {
            name: name.clone(),
            init: Some(source),
            mutable: true,
        },
        span,
    )?;
    out.push(binding);

    let probe = ctx.name_ref(&name, span)?;
    let sentinel = ctx.add_node(
        NodeKind::Literal {
            value: LiteralValue::Undefined,
        },
        span,
    )?;
    let condition = ctx.add_node(
        NodeKind::Binary {
            op: BinaryOp::StrictEq,
            lhs: probe,
            rhs: sentinel,
        },
        span,
    )?;
    let default_value = lower_expression(ctx, &assignment.default)?;
    let target_ref = ctx.name_ref(&name, span)?;
    let assign = ctx.add_node(
        NodeKind::Assign {
            target: target_ref,
            value: default_value,
        },
        span,
    )?;
    let assign_stmt = ctx.add_node(NodeKind::ExpressionStmt { expr: assign }, span)?;
    let then_block = ctx.add_node(
        NodeKind::Block {
            label: None,
            body: vec![assign_stmt],
        },
        span,
    )?;
    let guard = ctx.add_node(
        NodeKind::If {
            condition,
            then_block,
            else_block: None,
        },
        span,
    )?;
    out.push(guard);

    if let Some(inner) = bind_inner {
        let inner_source = ctx.name_ref(&name, span)?;
        lower_declaration_pattern(ctx, inner, inner_source, mutable, out)?;
    }
    Ok(())
}

/// Binds the source expression to a fresh temp so it is evaluated exactly
/// once, no matter how many bindings the pattern produces.
fn bind_temp(
    ctx: &mut LowerCtx,
    source: NodeId,
    span: Span,
    out: &mut Vec<NodeId>,
) -> Result<String, LoweringError> {
    let temp = ctx.fresh_temp();
    ctx.scopes.bind(&temp);
    let binding = ctx.add_node(
        NodeKind::Binding {
            name: temp.clone(),
            init: Some(source),
            mutable: false,
        },
        span,
    )?;
    out.push(binding);
    Ok(temp)
}

fn element_at(
    ctx: &mut LowerCtx,
    temp: &str,
    index: usize,
    span: Span,
) -> Result<NodeId, LoweringError> {
    let temp_ref = ctx.name_ref(temp, span)?;
    let index_lit = number(ctx, index as f64, span)?;
    ctx.add_node(
        NodeKind::RuntimeCall {
            helper: RuntimeHelper::At,
            args: vec![temp_ref, index_lit],
        },
        span,
    )
}

fn number(ctx: &mut LowerCtx, value: f64, span: Span) -> Result<NodeId, LoweringError> {
    ctx.add_node(
        NodeKind::Literal {
            value: LiteralValue::Number(value),
        },
        span,
    )
}
