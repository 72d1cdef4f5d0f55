//! Backend emitters: validated, post-transform IR in, target source text
//! out. Emission is deterministic: identical IR always yields
//! byte-identical output. An unsupported node kind aborts with an
//! error; there is no silent best-effort fallback.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ast::common::Span;
use crate::ir::{IrModule, NodeId};

mod lua;
mod stack;

pub use lua::LuaBackend;
pub use stack::StackBackend;

pub trait Backend {
    fn id(&self) -> &'static str;

    fn emit(&self, module: &IrModule) -> Result<EmittedModule, CodegenError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedModule {
    pub backend: String,
    pub code: String,
    pub source_map: Option<SourceMap>,
}

/// Line-granular mapping from emitted text back to source spans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// 1-based line in the emitted text.
    pub generated_line: u32,
    pub span: Span,
}

#[derive(Debug, Error, Clone)]
pub enum CodegenError {
    #[error("backend {backend:?} does not support IR node kind {kind:?} (node {node})")]
    UnsupportedNode {
        kind: &'static str,
        backend: &'static str,
        node: NodeId,
    },
}

impl CodegenError {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            CodegenError::UnsupportedNode { .. } => "BackendUnsupported",
        }
    }
}

/// Looks up a built-in backend by id.
pub fn backend_for(id: &str) -> Option<Box<dyn Backend>> {
    match id {
        "lua" => Some(Box::new(LuaBackend)),
        "stack" => Some(Box::new(StackBackend)),
        _ => None,
    }
}

pub fn backend_ids() -> &'static [&'static str] {
    &["lua", "stack"]
}

/// Indented line writer shared by the emitters. Tracks the current line so
/// backends can record source-map entries.
#[derive(Debug, Default)]
pub(crate) struct Writer {
    out: String,
    indent: usize,
    line: u32,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
            line: 0,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
        self.line += 1;
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
        self.line += 1;
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        debug_assert!(self.indent > 0);
        self.indent -= 1;
    }

    /// 1-based line number the next `line` call will produce.
    pub fn next_line(&self) -> u32 {
        self.line + 1
    }

    pub fn finish(self) -> String {
        debug!(lines = self.line, "emission finished");
        self.out
    }
}

/// Canonical number formatting shared by both backends: integers print
/// without a fractional part, everything else uses the shortest
/// round-trippable form.
pub(crate) fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Escapes a string for a double-quoted literal in either target.
pub(crate) fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
