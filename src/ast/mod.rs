//! The input AST contract. An external tokenizer/recursive-descent parser
//! produces this tree; the pipeline only consumes it. The shape mirrors the
//! source language: statements, expressions and destructuring patterns, each
//! node carrying a [`common::Span`].

use serde::{Deserialize, Serialize};

use self::common::{Ident, Span};
use self::statements::Statement;

pub mod common;
pub mod expressions;
pub mod patterns;
pub mod statements;

/// One parsed source module, ready for lowering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleAst {
    /// Host-visible module identity, usually the source path.
    pub source_name: String,
    /// Directive prologue (e.g. `"use strict"`), carried through verbatim.
    pub directives: Vec<String>,
    pub body: Vec<Statement>,
    /// Exported names; each must resolve to a module-level binding.
    pub exports: Vec<Ident>,
    pub span: Span,
}
