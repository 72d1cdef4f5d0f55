use serde::{Deserialize, Serialize};

use super::{
    common::{Ident, Span},
    expressions::{Expression, PropertyKey},
};

/// Destructuring binding forms. Patterns nest to arbitrary depth; the
/// lowerer expands them until only plain identifier bindings remain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Identifier(Ident),
    Array(ArrayPattern),
    Object(ObjectPattern),
    Assignment(Box<AssignmentPattern>),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier(id) => id.span,
            Pattern::Array(p) => p.span,
            Pattern::Object(p) => p.span,
            Pattern::Assignment(p) => p.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayPattern {
    /// `None` entries are elisions (holes): the position is skipped entirely.
    pub elements: Vec<Option<ArrayPatternElement>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArrayPatternElement {
    Pattern(Pattern),
    /// Must be the last element; checked during lowering, not by the parser.
    Rest(Pattern),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectPattern {
    pub properties: Vec<ObjectPatternProperty>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObjectPatternProperty {
    Property {
        key: PropertyKey,
        /// `None` is shorthand: `{id}` binds the key's own name.
        value: Option<Pattern>,
        span: Span,
    },
    /// Captures every not-yet-destructured key. Must be the last property.
    Rest { name: Ident, span: Span },
}

impl ObjectPatternProperty {
    pub fn span(&self) -> Span {
        match self {
            ObjectPatternProperty::Property { span, .. } => *span,
            ObjectPatternProperty::Rest { span, .. } => *span,
        }
    }
}

/// A target with a default. The default expression is evaluated only when
/// the extracted value is the missing sentinel (`undefined`), never for a
/// defined-but-falsy value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPattern {
    pub target: Pattern,
    pub default: Expression,
    pub span: Span,
}
