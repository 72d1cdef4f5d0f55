use tracing::{debug, instrument};

use crate::ast::expressions::{FunctionExpr, LiteralValue, PropertyKey};
use crate::ast::patterns::Pattern;
use crate::ast::statements::{ClassDecl, ClassMemberKind};
use crate::ir::{FunctionNode, MemberKind, NodeId, NodeKind, TypeDeclNode, TypeMember};

use super::patterns::lower_declaration_pattern;
use super::statements::lower_statement_list;
use super::{FunctionFrame, LowerCtx, errors::LoweringError};

/// Lowers a function declaration or expression. Pattern parameters are
/// bound to fresh names and expanded into the body prologue, so the IR
/// function carries plain identifier parameters only.
#[instrument(level = "debug", skip_all, fields(name = ?func.name.as_ref().map(|n| &n.name)))]
pub(crate) fn lower_function(
    ctx: &mut LowerCtx,
    func: &FunctionExpr,
    declaration: bool,
) -> Result<NodeId, LoweringError> {
    if declaration && func.name.is_none() {
        return Err(LoweringError::UnsupportedConstruct {
            construct: "function declaration without a name",
            span: func.span,
        });
    }
    if declaration {
        if let Some(name) = &func.name {
            ctx.scopes.bind(&name.name);
        }
    }

    ctx.functions.push(FunctionFrame {
        is_async: func.is_async,
        is_generator: func.is_generator,
    });
    // The label stack does not cross function boundaries.
    let outer_labels = std::mem::take(&mut ctx.labels);
    ctx.scopes.push();

    let result = (|| {
        let mut params = Vec::with_capacity(func.params.len());
        let mut prologue = Vec::new();
        for param in &func.params {
            match param {
                Pattern::Identifier(ident) => {
                    ctx.scopes.bind(&ident.name);
                    params.push(ident.name.clone());
                }
                composite => {
                    let temp = ctx.fresh_temp();
                    ctx.scopes.bind(&temp);
                    let source = ctx.name_ref(&temp, composite.span())?;
                    lower_declaration_pattern(ctx, composite, source, true, &mut prologue)?;
                    params.push(temp);
                }
            }
        }

        // An expression's name is visible inside its own body only.
        if !declaration {
            if let Some(name) = &func.name {
                ctx.scopes.bind(&name.name);
            }
        }

        let mut statements = lower_statement_list(ctx, &func.body)?;
        let mut body = prologue;
        body.append(&mut statements);

        debug!(statements = body.len(), "function body lowered");
        ctx.add_node(
            NodeKind::Function(FunctionNode {
                name: func.name.as_ref().map(|n| n.name.clone()),
                params,
                body,
                is_async: func.is_async,
                is_generator: func.is_generator,
            }),
            func.span,
        )
    })();

    ctx.scopes.pop();
    ctx.labels = outer_labels;
    ctx.functions.pop();
    result
}

/// Classes lower to a single `TypeDeclaration`. The superclass reference is
/// stored by name and resolved at emission time; lowering only records the
/// capture so the validator knows the name was seen.
#[instrument(level = "debug", skip_all, fields(name = %class.name.name))]
pub(crate) fn lower_class(ctx: &mut LowerCtx, class: &ClassDecl) -> Result<NodeId, LoweringError> {
    ctx.scopes.bind(&class.name.name);
    if let Some(superclass) = &class.superclass {
        ctx.resolve(&superclass.name);
    }

    let mut members = Vec::with_capacity(class.members.len());
    for member in &class.members {
        let name = match &member.key {
            PropertyKey::Named(ident) => ident.name.clone(),
            PropertyKey::Computed(_) => {
                return Err(LoweringError::UnsupportedConstruct {
                    construct: "computed class member key",
                    span: member.span,
                });
            }
        };
        let (kind, value) = match &member.kind {
            ClassMemberKind::Method(func) => {
                (MemberKind::Method, lower_function(ctx, func, false)?)
            }
            ClassMemberKind::Getter(func) => {
                (MemberKind::Getter, lower_function(ctx, func, false)?)
            }
            ClassMemberKind::Setter(func) => {
                (MemberKind::Setter, lower_function(ctx, func, false)?)
            }
            ClassMemberKind::Field(init) => {
                let value = match init {
                    Some(expr) => super::expressions::lower_expression(ctx, expr)?,
                    None => ctx.add_node(
                        NodeKind::Literal {
                            value: LiteralValue::Undefined,
                        },
                        member.span,
                    )?,
                };
                (MemberKind::Field, value)
            }
        };
        members.push(TypeMember {
            name,
            kind,
            is_static: member.is_static,
            value,
        });
    }

    ctx.add_node(
        NodeKind::TypeDeclaration(TypeDeclNode {
            name: class.name.name.clone(),
            superclass: class.superclass.as_ref().map(|s| s.name.clone()),
            members,
        }),
        class.span,
    )
}
