use serde::{Deserialize, Serialize};

use super::{
    common::{Ident, Span},
    expressions::{Expression, FunctionExpr, PropertyKey},
    patterns::Pattern,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    VariableDecl(VariableDecl),
    Function(FunctionExpr),
    Class(ClassDecl),
    Expression(ExpressionStmt),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    ForOf(ForOfStmt),
    ForIn(ForInStmt),
    Break(BreakStmt),
    Continue(ContinueStmt),
    Block(BlockStmt),
    Try(TryStmt),
    Switch(SwitchStmt),
    Throw(ThrowStmt),
    Labeled(LabeledStmt),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::VariableDecl(s) => s.span,
            Statement::Function(s) => s.span,
            Statement::Class(s) => s.span,
            Statement::Expression(s) => s.span,
            Statement::Return(s) => s.span,
            Statement::If(s) => s.span,
            Statement::While(s) => s.span,
            Statement::DoWhile(s) => s.span,
            Statement::ForOf(s) => s.span,
            Statement::ForIn(s) => s.span,
            Statement::Break(s) => s.span,
            Statement::Continue(s) => s.span,
            Statement::Block(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::Switch(s) => s.span,
            Statement::Throw(s) => s.span,
            Statement::Labeled(s) => s.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Let,
    Const,
    Var,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclarator {
    pub pattern: Pattern,
    pub init: Option<Expression>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: Ident,
    /// Stored by name; the reference is resolved at emission time.
    pub superclass: Option<Ident>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassMember {
    pub key: PropertyKey,
    pub kind: ClassMemberKind,
    pub is_static: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClassMemberKind {
    Method(FunctionExpr),
    Getter(FunctionExpr),
    Setter(FunctionExpr),
    Field(Option<Expression>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStmt {
    pub expr: Expression,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub value: Option<Expression>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub condition: Expression,
    pub then_body: Vec<Statement>,
    pub else_body: Option<Vec<Statement>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoWhileStmt {
    pub body: Vec<Statement>,
    pub condition: Expression,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForOfStmt {
    pub kind: VariableKind,
    pub pattern: Pattern,
    pub source: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForInStmt {
    pub kind: VariableKind,
    pub pattern: Pattern,
    pub source: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakStmt {
    pub label: Option<Ident>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContinueStmt {
    pub label: Option<Ident>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockStmt {
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TryStmt {
    pub block: Vec<Statement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Vec<Statement>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// A catch binding may be omitted (`catch { ... }`).
    pub param: Option<Pattern>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchStmt {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` marks the `default` case.
    pub test: Option<Expression>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThrowStmt {
    pub value: Expression,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledStmt {
    pub label: Ident,
    pub body: Box<Statement>,
    pub span: Span,
}
