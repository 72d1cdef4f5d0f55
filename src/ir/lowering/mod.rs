use crate::ast::common::Span;
use crate::ir::{IrModule, NodeId, NodeKind, Resolution};

mod errors;
mod expressions;
mod functions;
mod lower;
mod patterns;
mod scope;
mod statements;

pub use errors::{LoweringError, LoweringErrorKind};
pub use lower::{LowerOptions, lower_module};
pub use scope::ScopeStack;

/// What an enclosing statement frame accepts: loops take `break` and
/// `continue`, switches and labeled blocks only `break`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Loop,
    Switch,
    Block,
}

#[derive(Debug, Clone)]
pub(crate) struct LabelFrame {
    pub name: Option<String>,
    pub kind: FrameKind,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FunctionFrame {
    pub is_async: bool,
    pub is_generator: bool,
}

/// Context threaded through every `lower_*` function: the module under
/// construction, the lexical scope stack, and the label/function stacks
/// used to validate control transfers.
#[derive(Debug)]
pub struct LowerCtx {
    pub module: IrModule,
    pub scopes: ScopeStack,
    pub(crate) labels: Vec<LabelFrame>,
    pub(crate) functions: Vec<FunctionFrame>,
    temp_counter: u64,
    node_budget: Option<usize>,
}

impl LowerCtx {
    pub(crate) fn new(source_name: String, options: &LowerOptions) -> Self {
        Self {
            module: IrModule::new(source_name, options.id_seed),
            scopes: ScopeStack::default(),
            labels: Vec::new(),
            functions: Vec::new(),
            temp_counter: 0,
            node_budget: options.node_budget,
        }
    }

    /// Places a node, enforcing the host's node-count budget. On overflow
    /// the whole module is discarded by the caller; nothing partial
    /// survives.
    pub(crate) fn add_node(&mut self, kind: NodeKind, span: Span) -> Result<NodeId, LoweringError> {
        if let Some(budget) = self.node_budget {
            if self.module.nodes.len() >= budget {
                return Err(LoweringError::NodeBudgetExceeded { budget, span });
            }
        }
        Ok(self.module.insert(kind, span))
    }

    /// A synthetic local name. The double-underscore prefix is reserved;
    /// the counter is module-scoped, so names are stable across runs.
    pub(crate) fn fresh_temp(&mut self) -> String {
        let name = format!("__t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    /// Resolves a name against the scope stack, recording a global capture
    /// when no frame binds it.
    pub(crate) fn resolve(&mut self, name: &str) -> Resolution {
        let resolution = self.scopes.resolve(name);
        if resolution == Resolution::Global {
            self.module
                .metadata
                .global_captures
                .insert(name.to_string());
        }
        resolution
    }

    /// A `NameRef` node for an already-bound name.
    pub(crate) fn name_ref(&mut self, name: &str, span: Span) -> Result<NodeId, LoweringError> {
        let resolution = self.resolve(name);
        self.add_node(
            NodeKind::NameRef {
                name: name.to_string(),
                resolution,
            },
            span,
        )
    }

    pub(crate) fn in_async(&self) -> bool {
        self.functions.last().is_some_and(|f| f.is_async)
    }

    pub(crate) fn in_generator(&self) -> bool {
        self.functions.last().is_some_and(|f| f.is_generator)
    }

    pub(crate) fn in_function(&self) -> bool {
        !self.functions.is_empty()
    }
}
