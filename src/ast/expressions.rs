use serde::{Deserialize, Serialize};

use super::{
    common::{Ident, Span},
    patterns::Pattern,
    statements::Statement,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    Identifier(Ident),
    This(Span),
    Array(ArrayExpr),
    Object(ObjectExpr),
    Template(TemplateExpr),
    Function(Box<FunctionExpr>),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Logical(LogicalExpr),
    Assignment(AssignExpr),
    Conditional(ConditionalExpr),
    Call(CallExpr),
    New(NewExpr),
    Member(MemberExpr),
    Await(AwaitExpr),
    Yield(YieldExpr),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(e) => e.span,
            Expression::Identifier(e) => e.span,
            Expression::This(span) => *span,
            Expression::Array(e) => e.span,
            Expression::Object(e) => e.span,
            Expression::Template(e) => e.span,
            Expression::Function(e) => e.span,
            Expression::Unary(e) => e.span,
            Expression::Binary(e) => e.span,
            Expression::Logical(e) => e.span,
            Expression::Assignment(e) => e.span,
            Expression::Conditional(e) => e.span,
            Expression::Call(e) => e.span,
            Expression::New(e) => e.span,
            Expression::Member(e) => e.span,
            Expression::Await(e) => e.span,
            Expression::Yield(e) => e.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: LiteralValue,
    pub span: Span,
}

/// The "missing" sentinel of the source language is `Undefined`; `Null` is a
/// distinct, present value. Defaults in patterns trigger only on `Undefined`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpr {
    /// `None` entries are elisions (holes).
    pub elements: Vec<Option<ArrayElement>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArrayElement {
    Expr(Expression),
    Spread(Expression),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpr {
    pub properties: Vec<ObjectProperty>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub key: PropertyKey,
    pub value: Expression,
    pub span: Span,
}

/// Object keys, shared by object literals, object patterns and member access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyKey {
    Named(Ident),
    Computed(Box<Expression>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateExpr {
    pub parts: Vec<TemplatePart>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    String(String),
    Expr(Expression),
}

/// Function expressions and declarations share this shape; a declaration is
/// required to carry a name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub name: Option<Ident>,
    pub params: Vec<Pattern>,
    pub body: Vec<Statement>,
    pub is_async: bool,
    pub is_generator: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expression>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpr {
    pub op: LogicalOp,
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
    pub span: Span,
}

/// Kept separate from [`BinaryOp`] because both operands of a binary op are
/// always evaluated, while these short-circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignExpr {
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub condition: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: Box<Expression>,
    pub args: Vec<Argument>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Expr(Expression),
    Spread(Expression),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewExpr {
    pub callee: Box<Expression>,
    pub args: Vec<Argument>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberExpr {
    pub object: Box<Expression>,
    pub property: PropertyKey,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwaitExpr {
    pub argument: Box<Expression>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YieldExpr {
    pub argument: Option<Box<Expression>>,
    /// True for `yield*`, which drains a delegated iterable.
    pub delegate: bool,
    pub span: Span,
}
