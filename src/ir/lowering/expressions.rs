use tracing::instrument;

use crate::ast::expressions::{
    ArrayElement, Argument, Expression, LiteralValue, PropertyKey, TemplatePart,
};
use crate::ir::{Arg, KeyRef, NodeId, NodeKind, ObjectEntry, TemplateChunk};

use super::{LowerCtx, errors::LoweringError, functions::lower_function};

#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_expression(
    ctx: &mut LowerCtx,
    expr: &Expression,
) -> Result<NodeId, LoweringError> {
    match expr {
        Expression::Literal(lit) => ctx.add_node(
            NodeKind::Literal {
                value: lit.value.clone(),
            },
            lit.span,
        ),
        Expression::Identifier(ident) => ctx.name_ref(&ident.name, ident.span),
        Expression::This(span) => ctx.add_node(NodeKind::This, *span),
        Expression::Array(array) => {
            let mut elements = Vec::with_capacity(array.elements.len());
            for element in &array.elements {
                match element {
                    // A hole reads back as the missing sentinel.
                    None => {
                        let undef = ctx.add_node(
                            NodeKind::Literal {
                                value: LiteralValue::Undefined,
                            },
                            array.span,
                        )?;
                        elements.push(Arg::Value(undef));
                    }
                    Some(ArrayElement::Expr(e)) => {
                        elements.push(Arg::Value(lower_expression(ctx, e)?));
                    }
                    Some(ArrayElement::Spread(e)) => {
                        elements.push(Arg::Spread(lower_expression(ctx, e)?));
                    }
                }
            }
            ctx.add_node(NodeKind::ArrayLit { elements }, array.span)
        }
        Expression::Object(object) => {
            let mut properties = Vec::with_capacity(object.properties.len());
            for property in &object.properties {
                let key = lower_property_key(ctx, &property.key)?;
                let value = lower_expression(ctx, &property.value)?;
                properties.push(ObjectEntry { key, value });
            }
            ctx.add_node(NodeKind::ObjectLit { properties }, object.span)
        }
        Expression::Template(template) => {
            let mut parts = Vec::with_capacity(template.parts.len());
            for part in &template.parts {
                match part {
                    TemplatePart::String(text) => parts.push(TemplateChunk::Lit(text.clone())),
                    TemplatePart::Expr(e) => {
                        parts.push(TemplateChunk::Expr(lower_expression(ctx, e)?));
                    }
                }
            }
            ctx.add_node(NodeKind::Template { parts }, template.span)
        }
        Expression::Function(func) => lower_function(ctx, func, false),
        Expression::Unary(unary) => {
            let operand = lower_expression(ctx, &unary.operand)?;
            ctx.add_node(
                NodeKind::Unary {
                    op: unary.op,
                    operand,
                },
                unary.span,
            )
        }
        Expression::Binary(binary) => {
            let lhs = lower_expression(ctx, &binary.lhs)?;
            let rhs = lower_expression(ctx, &binary.rhs)?;
            ctx.add_node(
                NodeKind::Binary {
                    op: binary.op,
                    lhs,
                    rhs,
                },
                binary.span,
            )
        }
        Expression::Logical(logical) => {
            let lhs = lower_expression(ctx, &logical.lhs)?;
            let rhs = lower_expression(ctx, &logical.rhs)?;
            ctx.add_node(
                NodeKind::Logical {
                    op: logical.op,
                    lhs,
                    rhs,
                },
                logical.span,
            )
        }
        Expression::Assignment(assign) => {
            let target = match assign.target.as_ref() {
                Expression::Identifier(_) | Expression::Member(_) => {
                    lower_expression(ctx, &assign.target)?
                }
                _ => {
                    return Err(LoweringError::InvalidAssignmentTarget {
                        span: assign.span,
                    });
                }
            };
            let value = lower_expression(ctx, &assign.value)?;
            ctx.add_node(NodeKind::Assign { target, value }, assign.span)
        }
        Expression::Conditional(cond) => {
            let condition = lower_expression(ctx, &cond.condition)?;
            let consequent = lower_expression(ctx, &cond.consequent)?;
            let alternate = lower_expression(ctx, &cond.alternate)?;
            ctx.add_node(
                NodeKind::Conditional {
                    condition,
                    consequent,
                    alternate,
                },
                cond.span,
            )
        }
        Expression::Call(call) => {
            let callee = lower_expression(ctx, &call.callee)?;
            let args = lower_arguments(ctx, &call.args)?;
            ctx.add_node(NodeKind::Call { callee, args }, call.span)
        }
        Expression::New(new) => {
            let callee = lower_expression(ctx, &new.callee)?;
            let args = lower_arguments(ctx, &new.args)?;
            ctx.add_node(NodeKind::New { callee, args }, new.span)
        }
        Expression::Member(member) => {
            let object = lower_expression(ctx, &member.object)?;
            let key = lower_property_key(ctx, &member.property)?;
            ctx.add_node(NodeKind::Member { object, key }, member.span)
        }
        Expression::Await(await_expr) => {
            if !ctx.in_async() {
                return Err(LoweringError::AwaitOutsideAsync {
                    span: await_expr.span,
                });
            }
            let argument = lower_expression(ctx, &await_expr.argument)?;
            ctx.add_node(NodeKind::Await { argument }, await_expr.span)
        }
        Expression::Yield(yield_expr) => {
            if !ctx.in_generator() {
                return Err(LoweringError::YieldOutsideGenerator {
                    span: yield_expr.span,
                });
            }
            let argument = yield_expr
                .argument
                .as_ref()
                .map(|e| lower_expression(ctx, e))
                .transpose()?;
            ctx.add_node(
                NodeKind::Yield {
                    argument,
                    delegate: yield_expr.delegate,
                },
                yield_expr.span,
            )
        }
    }
}

pub(crate) fn lower_property_key(
    ctx: &mut LowerCtx,
    key: &PropertyKey,
) -> Result<KeyRef, LoweringError> {
    Ok(match key {
        PropertyKey::Named(ident) => KeyRef::Named(ident.name.clone()),
        PropertyKey::Computed(expr) => KeyRef::Computed(lower_expression(ctx, expr)?),
    })
}

fn lower_arguments(ctx: &mut LowerCtx, args: &[Argument]) -> Result<Vec<Arg>, LoweringError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Argument::Expr(e) => out.push(Arg::Value(lower_expression(ctx, e)?)),
            Argument::Spread(e) => out.push(Arg::Spread(lower_expression(ctx, e)?)),
        }
    }
    Ok(out)
}
