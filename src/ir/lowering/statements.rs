use tracing::{debug, instrument};

use crate::ast::common::Span;
use crate::ast::expressions::LiteralValue;
use crate::ast::patterns::Pattern;
use crate::ast::statements::{
    BlockStmt, BreakStmt, ContinueStmt, DoWhileStmt, ForInStmt, ForOfStmt, IfStmt, LabeledStmt,
    Statement, SwitchStmt, ThrowStmt, TryStmt, VariableDecl, VariableKind, WhileStmt,
};
use crate::ir::{IterationMode, NodeId, NodeKind, SwitchArm};

use super::functions::{lower_class, lower_function};
use super::patterns::lower_declaration_pattern;
use super::{
    FrameKind, LabelFrame, LowerCtx, errors::LoweringError, expressions::lower_expression,
};

/// Lowers one statement into an ordered sequence of IR statements. Most
/// statements produce exactly one node; destructuring declarations expand
/// into several, substituted in place and preserving source-order
/// evaluation.
pub(crate) fn lower_statement(
    ctx: &mut LowerCtx,
    stmt: &Statement,
) -> Result<Vec<NodeId>, LoweringError> {
    match stmt {
        Statement::VariableDecl(decl) => lower_variable_decl(ctx, decl),
        Statement::Function(func) => Ok(vec![lower_function(ctx, func, true)?]),
        Statement::Class(class) => Ok(vec![lower_class(ctx, class)?]),
        Statement::Expression(expr_stmt) => {
            let expr = lower_expression(ctx, &expr_stmt.expr)?;
            Ok(vec![ctx.add_node(
                NodeKind::ExpressionStmt { expr },
                expr_stmt.span,
            )?])
        }
        Statement::Return(ret) => {
            if !ctx.in_function() {
                return Err(LoweringError::ReturnOutsideFunction { span: ret.span });
            }
            let value = ret
                .value
                .as_ref()
                .map(|e| lower_expression(ctx, e))
                .transpose()?;
            Ok(vec![ctx.add_node(NodeKind::Return { value }, ret.span)?])
        }
        Statement::If(if_stmt) => Ok(vec![lower_if(ctx, if_stmt)?]),
        Statement::While(while_stmt) => Ok(vec![lower_while(ctx, while_stmt, None)?]),
        Statement::DoWhile(do_while) => Ok(vec![lower_do_while(ctx, do_while, None)?]),
        Statement::ForOf(for_of) => Ok(vec![lower_for_of(ctx, for_of, None)?]),
        Statement::ForIn(for_in) => Ok(vec![lower_for_in(ctx, for_in, None)?]),
        Statement::Break(brk) => Ok(vec![lower_break(ctx, brk)?]),
        Statement::Continue(cont) => Ok(vec![lower_continue(ctx, cont)?]),
        Statement::Block(block) => Ok(vec![lower_block_stmt(ctx, block, None)?]),
        Statement::Try(try_stmt) => Ok(vec![lower_try(ctx, try_stmt)?]),
        Statement::Switch(switch) => Ok(vec![lower_switch(ctx, switch)?]),
        Statement::Throw(throw) => Ok(vec![lower_throw(ctx, throw)?]),
        Statement::Labeled(labeled) => Ok(vec![lower_labeled(ctx, labeled)?]),
    }
}

/// Lowers a statement list into a fresh `Block` node with its own scope
/// frame.
pub(crate) fn lower_block(
    ctx: &mut LowerCtx,
    statements: &[Statement],
    label: Option<String>,
    span: Span,
) -> Result<NodeId, LoweringError> {
    ctx.scopes.push();
    let result = lower_statement_list(ctx, statements);
    ctx.scopes.pop();
    let body = result?;
    ctx.add_node(NodeKind::Block { label, body }, span)
}

pub(crate) fn lower_statement_list(
    ctx: &mut LowerCtx,
    statements: &[Statement],
) -> Result<Vec<NodeId>, LoweringError> {
    bind_hoisted(ctx, statements);
    let mut out = Vec::with_capacity(statements.len());
    for stmt in statements {
        out.extend(lower_statement(ctx, stmt)?);
    }
    Ok(out)
}

/// Function and class declarations are visible before their statement, so
/// mutually recursive declarations resolve. `let`/`const`/`var` bind at
/// their declarator.
pub(crate) fn bind_hoisted(ctx: &mut LowerCtx, statements: &[Statement]) {
    for stmt in statements {
        match stmt {
            Statement::Function(func) => {
                if let Some(name) = &func.name {
                    ctx.scopes.bind(&name.name);
                }
            }
            Statement::Class(class) => ctx.scopes.bind(&class.name.name),
            _ => {}
        }
    }
}

#[instrument(level = "debug", skip_all)]
fn lower_variable_decl(
    ctx: &mut LowerCtx,
    decl: &VariableDecl,
) -> Result<Vec<NodeId>, LoweringError> {
    debug!(declarators = decl.declarations.len(), "lowering declaration");
    let mutable = decl.kind != VariableKind::Const;
    let mut out = Vec::new();
    for declarator in &decl.declarations {
        let init = match &declarator.init {
            Some(expr) => lower_expression(ctx, expr)?,
            // An uninitialized declaration reads back as the missing
            // sentinel.
            None => ctx.add_node(
                NodeKind::Literal {
                    value: LiteralValue::Undefined,
                },
                declarator.span,
            )?,
        };
        lower_declaration_pattern(ctx, &declarator.pattern, init, mutable, &mut out)?;
    }
    Ok(out)
}

#[instrument(level = "debug", skip_all)]
fn lower_if(ctx: &mut LowerCtx, if_stmt: &IfStmt) -> Result<NodeId, LoweringError> {
    let condition = lower_expression(ctx, &if_stmt.condition)?;
    let then_block = lower_block(ctx, &if_stmt.then_body, None, if_stmt.span)?;
    let else_block = match &if_stmt.else_body {
        Some(body) => Some(lower_block(ctx, body, None, if_stmt.span)?),
        None => None,
    };
    ctx.add_node(
        NodeKind::If {
            condition,
            then_block,
            else_block,
        },
        if_stmt.span,
    )
}

#[instrument(level = "debug", skip_all)]
fn lower_while(
    ctx: &mut LowerCtx,
    while_stmt: &WhileStmt,
    label: Option<String>,
) -> Result<NodeId, LoweringError> {
    let condition = lower_expression(ctx, &while_stmt.condition)?;
    let body = lower_loop_body(ctx, &while_stmt.body, &label, while_stmt.span)?;
    ctx.add_node(
        NodeKind::Loop {
            label,
            condition,
            body,
            check_before: true,
        },
        while_stmt.span,
    )
}

#[instrument(level = "debug", skip_all)]
fn lower_do_while(
    ctx: &mut LowerCtx,
    do_while: &DoWhileStmt,
    label: Option<String>,
) -> Result<NodeId, LoweringError> {
    let body = lower_loop_body(ctx, &do_while.body, &label, do_while.span)?;
    let condition = lower_expression(ctx, &do_while.condition)?;
    ctx.add_node(
        NodeKind::Loop {
            label,
            condition,
            body,
            check_before: false,
        },
        do_while.span,
    )
}

/// `for-of` → canonical iterator-protocol loop over values. A destructured
/// loop variable is bound to a fresh name and expanded into the body
/// prologue, so the loop node itself always binds a plain identifier.
#[instrument(level = "debug", skip_all)]
fn lower_for_of(
    ctx: &mut LowerCtx,
    for_of: &ForOfStmt,
    label: Option<String>,
) -> Result<NodeId, LoweringError> {
    let source = lower_expression(ctx, &for_of.source)?;
    lower_iterator_loop(
        ctx,
        IterationMode::Values,
        &for_of.pattern,
        for_of.kind,
        source,
        &for_of.body,
        label,
        for_of.span,
    )
}

/// `for-in` → the same canonical loop over keys.
#[instrument(level = "debug", skip_all)]
fn lower_for_in(
    ctx: &mut LowerCtx,
    for_in: &ForInStmt,
    label: Option<String>,
) -> Result<NodeId, LoweringError> {
    let source = lower_expression(ctx, &for_in.source)?;
    lower_iterator_loop(
        ctx,
        IterationMode::Keys,
        &for_in.pattern,
        for_in.kind,
        source,
        &for_in.body,
        label,
        for_in.span,
    )
}

#[allow(clippy::too_many_arguments)]
fn lower_iterator_loop(
    ctx: &mut LowerCtx,
    mode: IterationMode,
    pattern: &Pattern,
    kind: VariableKind,
    source: NodeId,
    body: &[Statement],
    label: Option<String>,
    span: Span,
) -> Result<NodeId, LoweringError> {
    ctx.scopes.push();
    ctx.labels.push(LabelFrame {
        name: label.clone(),
        kind: FrameKind::Loop,
    });
    let result = (|| {
        let (binding, mut prologue) = match pattern {
            Pattern::Identifier(ident) => {
                ctx.scopes.bind(&ident.name);
                (ident.name.clone(), Vec::new())
            }
            composite => {
                let temp = ctx.fresh_temp();
                ctx.scopes.bind(&temp);
                let mut prologue = Vec::new();
                let temp_ref = ctx.name_ref(&temp, composite.span())?;
                lower_declaration_pattern(
                    ctx,
                    composite,
                    temp_ref,
                    kind != VariableKind::Const,
                    &mut prologue,
                )?;
                (temp, prologue)
            }
        };
        let mut statements = lower_statement_list(ctx, body)?;
        let mut block_body = Vec::with_capacity(prologue.len() + statements.len());
        block_body.append(&mut prologue);
        block_body.append(&mut statements);
        let block = ctx.add_node(
            NodeKind::Block {
                label: None,
                body: block_body,
            },
            span,
        )?;
        ctx.add_node(
            NodeKind::IteratorLoop {
                label,
                mode,
                binding,
                source,
                body: block,
            },
            span,
        )
    })();
    ctx.labels.pop();
    ctx.scopes.pop();
    result
}

fn lower_loop_body(
    ctx: &mut LowerCtx,
    body: &[Statement],
    label: &Option<String>,
    span: Span,
) -> Result<NodeId, LoweringError> {
    ctx.labels.push(LabelFrame {
        name: label.clone(),
        kind: FrameKind::Loop,
    });
    let block = lower_block(ctx, body, None, span);
    ctx.labels.pop();
    block
}

fn lower_break(ctx: &mut LowerCtx, brk: &BreakStmt) -> Result<NodeId, LoweringError> {
    match &brk.label {
        Some(label) => {
            if !ctx
                .labels
                .iter()
                .any(|f| f.name.as_deref() == Some(label.name.as_str()))
            {
                return Err(LoweringError::UnknownLabel {
                    name: label.name.clone(),
                    span: brk.span,
                });
            }
        }
        None => {
            let breakable = ctx
                .labels
                .iter()
                .any(|f| matches!(f.kind, FrameKind::Loop | FrameKind::Switch));
            if !breakable {
                return Err(LoweringError::BreakOutsideLoop { span: brk.span });
            }
        }
    }
    ctx.add_node(
        NodeKind::Break {
            label: brk.label.as_ref().map(|l| l.name.clone()),
        },
        brk.span,
    )
}

fn lower_continue(ctx: &mut LowerCtx, cont: &ContinueStmt) -> Result<NodeId, LoweringError> {
    match &cont.label {
        Some(label) => {
            let found = ctx
                .labels
                .iter()
                .find(|f| f.name.as_deref() == Some(label.name.as_str()));
            match found {
                None => {
                    return Err(LoweringError::UnknownLabel {
                        name: label.name.clone(),
                        span: cont.span,
                    });
                }
                Some(frame) if frame.kind != FrameKind::Loop => {
                    return Err(LoweringError::ContinueNotLoop {
                        name: label.name.clone(),
                        span: cont.span,
                    });
                }
                Some(_) => {}
            }
        }
        None => {
            if !ctx.labels.iter().any(|f| f.kind == FrameKind::Loop) {
                return Err(LoweringError::ContinueOutsideLoop { span: cont.span });
            }
        }
    }
    ctx.add_node(
        NodeKind::Continue {
            label: cont.label.as_ref().map(|l| l.name.clone()),
        },
        cont.span,
    )
}

fn lower_block_stmt(
    ctx: &mut LowerCtx,
    block: &BlockStmt,
    label: Option<String>,
) -> Result<NodeId, LoweringError> {
    if label.is_some() {
        ctx.labels.push(LabelFrame {
            name: label.clone(),
            kind: FrameKind::Block,
        });
    }
    let result = lower_block(ctx, &block.body, label.clone(), block.span);
    if label.is_some() {
        ctx.labels.pop();
    }
    result
}

/// `try/catch/finally` keeps its structure: the backend realizes the
/// guarantee that the finalizer runs exactly once on every exit path. A
/// destructured catch binding is expanded into the handler prologue.
#[instrument(level = "debug", skip_all)]
fn lower_try(ctx: &mut LowerCtx, try_stmt: &TryStmt) -> Result<NodeId, LoweringError> {
    let block = lower_block(ctx, &try_stmt.block, None, try_stmt.span)?;

    let (handler_param, handler) = match &try_stmt.handler {
        Some(catch) => {
            ctx.scopes.push();
            let result = (|| -> Result<_, LoweringError> {
                let param = match &catch.param {
                    None => None,
                    Some(Pattern::Identifier(ident)) => {
                        ctx.scopes.bind(&ident.name);
                        Some(ident.name.clone())
                    }
                    Some(_) => {
                        let temp = ctx.fresh_temp();
                        ctx.scopes.bind(&temp);
                        Some(temp)
                    }
                };
                let mut prologue = Vec::new();
                if let (Some(name), Some(composite)) = (&param, &catch.param) {
                    if !matches!(composite, Pattern::Identifier(_)) {
                        let source = ctx.name_ref(name, catch.span)?;
                        lower_declaration_pattern(ctx, composite, source, true, &mut prologue)?;
                    }
                }
                let mut statements = lower_statement_list(ctx, &catch.body)?;
                let mut body = prologue;
                body.append(&mut statements);
                let block = ctx.add_node(NodeKind::Block { label: None, body }, catch.span)?;
                Ok((param, Some(block)))
            })();
            ctx.scopes.pop();
            result?
        }
        None => (None, None),
    };

    let finalizer = match &try_stmt.finalizer {
        Some(body) => Some(lower_block(ctx, body, None, try_stmt.span)?),
        None => None,
    };

    ctx.add_node(
        NodeKind::Try {
            block,
            handler_param,
            handler,
            finalizer,
        },
        try_stmt.span,
    )
}

/// `switch` keeps the case list and fallthrough; `default` matches only
/// when no case matched, regardless of its position in the list.
#[instrument(level = "debug", skip_all)]
fn lower_switch(ctx: &mut LowerCtx, switch: &SwitchStmt) -> Result<NodeId, LoweringError> {
    let discriminant = lower_expression(ctx, &switch.discriminant)?;
    ctx.scopes.push();
    ctx.labels.push(LabelFrame {
        name: None,
        kind: FrameKind::Switch,
    });
    let result = (|| {
        let mut cases = Vec::with_capacity(switch.cases.len());
        for case in &switch.cases {
            let test = case
                .test
                .as_ref()
                .map(|e| lower_expression(ctx, e))
                .transpose()?;
            let body = lower_statement_list(ctx, &case.body)?;
            cases.push(SwitchArm { test, body });
        }
        ctx.add_node(
            NodeKind::Switch {
                discriminant,
                cases,
            },
            switch.span,
        )
    })();
    ctx.labels.pop();
    ctx.scopes.pop();
    result
}

fn lower_throw(ctx: &mut LowerCtx, throw: &ThrowStmt) -> Result<NodeId, LoweringError> {
    let value = lower_expression(ctx, &throw.value)?;
    ctx.add_node(NodeKind::Throw { value }, throw.span)
}

/// A label attaches to the nearest enclosing loop or block; anything else
/// cannot be labeled.
fn lower_labeled(ctx: &mut LowerCtx, labeled: &LabeledStmt) -> Result<NodeId, LoweringError> {
    if ctx
        .labels
        .iter()
        .any(|f| f.name.as_deref() == Some(labeled.label.name.as_str()))
    {
        return Err(LoweringError::DuplicateLabel {
            name: labeled.label.name.clone(),
            span: labeled.span,
        });
    }
    let label = Some(labeled.label.name.clone());
    match labeled.body.as_ref() {
        Statement::While(while_stmt) => lower_while(ctx, while_stmt, label),
        Statement::DoWhile(do_while) => lower_do_while(ctx, do_while, label),
        Statement::ForOf(for_of) => lower_for_of(ctx, for_of, label),
        Statement::ForIn(for_in) => lower_for_in(ctx, for_in, label),
        Statement::Block(block) => lower_block_stmt(ctx, block, label),
        _ => Err(LoweringError::UnsupportedConstruct {
            construct: "label on a statement that is neither a loop nor a block",
            span: labeled.span,
        }),
    }
}
