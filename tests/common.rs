//! Hand-built ASTs standing in for the external parser.
#![allow(dead_code)]

use sable::ast::ModuleAst;
use sable::ast::common::{Ident, Span};
use sable::ast::expressions::{
    Argument, ArrayExpr, BinaryExpr, BinaryOp, CallExpr, Expression, FunctionExpr, Literal,
    LiteralValue, MemberExpr, ObjectExpr, ObjectProperty, PropertyKey, TemplateExpr, TemplatePart,
};
use sable::ast::patterns::{
    ArrayPattern, ArrayPatternElement, AssignmentPattern, ObjectPattern, ObjectPatternProperty,
    Pattern,
};
use sable::ast::statements::{
    BlockStmt, BreakStmt, ClassDecl, ClassMember, ClassMemberKind, ExpressionStmt, ForOfStmt,
    IfStmt, LabeledStmt, ReturnStmt, Statement, SwitchCase, SwitchStmt, TryStmt, VariableDecl,
    VariableDeclarator, VariableKind, WhileStmt,
};

pub fn sp() -> Span {
    Span::default()
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name, sp())
}

pub fn module(source_name: &str, body: Vec<Statement>) -> ModuleAst {
    ModuleAst {
        source_name: source_name.to_string(),
        directives: Vec::new(),
        body,
        exports: Vec::new(),
        span: sp(),
    }
}

// -- expressions

pub fn num(value: f64) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Number(value),
        span: sp(),
    })
}

pub fn str_lit(value: &str) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::String(value.to_string()),
        span: sp(),
    })
}

pub fn bool_lit(value: bool) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Bool(value),
        span: sp(),
    })
}

pub fn undefined() -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Undefined,
        span: sp(),
    })
}

pub fn name(name: &str) -> Expression {
    Expression::Identifier(ident(name))
}

pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::Array(ArrayExpr {
        elements: elements
            .into_iter()
            .map(|e| Some(sable::ast::expressions::ArrayElement::Expr(e)))
            .collect(),
        span: sp(),
    })
}

pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::Object(ObjectExpr {
        properties: properties
            .into_iter()
            .map(|(key, value)| ObjectProperty {
                key: PropertyKey::Named(ident(key)),
                value,
                span: sp(),
            })
            .collect(),
        span: sp(),
    })
}

pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(BinaryExpr {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span: sp(),
    })
}

pub fn add(lhs: Expression, rhs: Expression) -> Expression {
    binary(BinaryOp::Add, lhs, rhs)
}

pub fn template(parts: Vec<TemplatePart>) -> Expression {
    Expression::Template(TemplateExpr { parts, span: sp() })
}

pub fn member(object: Expression, property: &str) -> Expression {
    Expression::Member(MemberExpr {
        object: Box::new(object),
        property: PropertyKey::Named(ident(property)),
        span: sp(),
    })
}

pub fn call(callee: Expression, args: Vec<Expression>) -> Expression {
    Expression::Call(CallExpr {
        callee: Box::new(callee),
        args: args.into_iter().map(Argument::Expr).collect(),
        span: sp(),
    })
}

pub fn function(
    name: Option<&str>,
    params: Vec<Pattern>,
    body: Vec<Statement>,
) -> FunctionExpr {
    FunctionExpr {
        name: name.map(ident),
        params,
        body,
        is_async: false,
        is_generator: false,
        span: sp(),
    }
}

pub fn async_function(name: Option<&str>, params: Vec<Pattern>, body: Vec<Statement>) -> FunctionExpr {
    FunctionExpr {
        is_async: true,
        ..function(name, params, body)
    }
}

pub fn generator(name: Option<&str>, params: Vec<Pattern>, body: Vec<Statement>) -> FunctionExpr {
    FunctionExpr {
        is_generator: true,
        ..function(name, params, body)
    }
}

// -- patterns

pub fn pat(name: &str) -> Pattern {
    Pattern::Identifier(ident(name))
}

pub fn pat_array(elements: Vec<Option<ArrayPatternElement>>) -> Pattern {
    Pattern::Array(ArrayPattern {
        elements,
        span: sp(),
    })
}

pub fn elem(pattern: Pattern) -> Option<ArrayPatternElement> {
    Some(ArrayPatternElement::Pattern(pattern))
}

pub fn rest(pattern: Pattern) -> Option<ArrayPatternElement> {
    Some(ArrayPatternElement::Rest(pattern))
}

pub fn pat_default(target: Pattern, default: Expression) -> Pattern {
    Pattern::Assignment(Box::new(AssignmentPattern {
        target,
        default,
        span: sp(),
    }))
}

/// Shorthand property: `{name}`.
pub fn prop_shorthand(name: &str) -> ObjectPatternProperty {
    ObjectPatternProperty::Property {
        key: PropertyKey::Named(ident(name)),
        value: None,
        span: sp(),
    }
}

/// Renaming or nested property: `{key: <pattern>}`.
pub fn prop(key: &str, value: Pattern) -> ObjectPatternProperty {
    ObjectPatternProperty::Property {
        key: PropertyKey::Named(ident(key)),
        value: Some(value),
        span: sp(),
    }
}

pub fn prop_rest(name: &str) -> ObjectPatternProperty {
    ObjectPatternProperty::Rest {
        name: ident(name),
        span: sp(),
    }
}

pub fn pat_object(properties: Vec<ObjectPatternProperty>) -> Pattern {
    Pattern::Object(ObjectPattern {
        properties,
        span: sp(),
    })
}

// -- statements

pub fn const_decl(pattern: Pattern, init: Expression) -> Statement {
    Statement::VariableDecl(VariableDecl {
        kind: VariableKind::Const,
        declarations: vec![VariableDeclarator {
            pattern,
            init: Some(init),
            span: sp(),
        }],
        span: sp(),
    })
}

pub fn let_decl(pattern: Pattern, init: Option<Expression>) -> Statement {
    Statement::VariableDecl(VariableDecl {
        kind: VariableKind::Let,
        declarations: vec![VariableDeclarator {
            pattern,
            init,
            span: sp(),
        }],
        span: sp(),
    })
}

pub fn expr_stmt(expr: Expression) -> Statement {
    Statement::Expression(ExpressionStmt { expr, span: sp() })
}

pub fn ret(value: Option<Expression>) -> Statement {
    Statement::Return(ReturnStmt { value, span: sp() })
}

pub fn if_stmt(condition: Expression, then_body: Vec<Statement>) -> Statement {
    Statement::If(IfStmt {
        condition,
        then_body,
        else_body: None,
        span: sp(),
    })
}

pub fn while_stmt(condition: Expression, body: Vec<Statement>) -> Statement {
    Statement::While(WhileStmt {
        condition,
        body,
        span: sp(),
    })
}

pub fn for_of(pattern: Pattern, source: Expression, body: Vec<Statement>) -> Statement {
    Statement::ForOf(ForOfStmt {
        kind: VariableKind::Const,
        pattern,
        source,
        body,
        span: sp(),
    })
}

pub fn brk(label: Option<&str>) -> Statement {
    Statement::Break(BreakStmt {
        label: label.map(ident),
        span: sp(),
    })
}

pub fn labeled(label: &str, body: Statement) -> Statement {
    Statement::Labeled(LabeledStmt {
        label: ident(label),
        body: Box::new(body),
        span: sp(),
    })
}

pub fn block(body: Vec<Statement>) -> Statement {
    Statement::Block(BlockStmt { body, span: sp() })
}

pub fn try_finally(block: Vec<Statement>, finalizer: Vec<Statement>) -> Statement {
    Statement::Try(TryStmt {
        block,
        handler: None,
        finalizer: Some(finalizer),
        span: sp(),
    })
}

pub fn switch(discriminant: Expression, cases: Vec<SwitchCase>) -> Statement {
    Statement::Switch(SwitchStmt {
        discriminant,
        cases,
        span: sp(),
    })
}

pub fn case(test: Option<Expression>, body: Vec<Statement>) -> SwitchCase {
    SwitchCase {
        test,
        body,
        span: sp(),
    }
}

pub fn class(
    name: &str,
    superclass: Option<&str>,
    members: Vec<ClassMember>,
) -> Statement {
    Statement::Class(ClassDecl {
        name: ident(name),
        superclass: superclass.map(ident),
        members,
        span: sp(),
    })
}

pub fn method(name: &str, params: Vec<Pattern>, body: Vec<Statement>) -> ClassMember {
    ClassMember {
        key: PropertyKey::Named(ident(name)),
        kind: ClassMemberKind::Method(function(None, params, body)),
        is_static: false,
        span: sp(),
    }
}
