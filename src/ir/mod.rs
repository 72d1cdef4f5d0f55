use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use educe::Educe;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod cfg;
pub mod lowering;
pub mod schema;

pub use crate::ast::common::Span;
pub use crate::ast::expressions::{BinaryOp, LiteralValue, LogicalOp, UnaryOp};
pub use cfg::{BasicBlock, BlockId, Cfg, Terminator, TerminatorKind};

/// Identity of a node inside one module. Allocated by [`IdGen`]; never
/// reused within a module.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// Serialized as a decimal string so node ids can key JSON maps in the
// interchange format.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>()
            .map(NodeId)
            .map_err(|_| serde::de::Error::custom(format!("invalid node id {raw:?}")))
    }
}

/// Deterministic id generator. The counter is scoped per module: repeated
/// runs over identical input with the same seed produce identical ids, and
/// concurrent module compilations cannot collide because each owns its own
/// generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    pub fn new(seed: u64) -> Self {
        Self { next: seed }
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// How many ids have been handed out relative to the given seed.
    pub fn issued_since(&self, seed: u64) -> u64 {
        self.next.saturating_sub(seed)
    }
}

/// One IR node. Immutable once placed in a module: a transform that
/// "changes" a node produces a new node under a fresh id and the registry
/// rewrites the parent's reference.
#[derive(Clone, Debug, Educe, Serialize, Deserialize)]
#[educe(PartialEq)]
pub struct Node {
    #[educe(PartialEq(ignore))]
    pub id: NodeId,
    pub kind: NodeKind,
    #[educe(PartialEq(ignore))]
    pub span: Span,
}

impl Node {
    /// A node not yet placed in a module. The placeholder id is replaced on
    /// insertion.
    pub fn detached(kind: NodeKind, span: Span) -> Self {
        Self {
            id: NodeId(0),
            kind,
            span,
        }
    }

    /// Ids of every direct child, in field order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut kind = self.kind.clone();
        kind.for_each_child_mut(&mut |id| out.push(*id));
        out
    }

    /// A copy of this node's kind with every reference to `old` replaced by
    /// `new`. Used by the transform registry when rewriting parents.
    pub fn kind_with_replaced_child(&self, old: NodeId, new: NodeId) -> NodeKind {
        let mut kind = self.kind.clone();
        kind.for_each_child_mut(&mut |id| {
            if *id == old {
                *id = new;
            }
        });
        kind
    }
}

/// The closed, versioned set of IR node kinds: declarations, statements and
/// expressions. Destructuring patterns are an AST-only surface; the lowerer
/// expands them before any IR exists, so no pattern kinds appear here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    // -- declarations
    Binding {
        name: String,
        init: Option<NodeId>,
        mutable: bool,
    },
    Function(FunctionNode),
    TypeDeclaration(TypeDeclNode),

    // -- statements
    ExpressionStmt {
        expr: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    If {
        condition: NodeId,
        then_block: NodeId,
        else_block: Option<NodeId>,
    },
    Block {
        label: Option<String>,
        body: Vec<NodeId>,
    },
    /// Canonical loop: `while` when `check_before`, `do/while` otherwise.
    Loop {
        label: Option<String>,
        condition: NodeId,
        body: NodeId,
        check_before: bool,
    },
    /// Canonical iterator-protocol loop produced from `for-of`/`for-in`.
    /// The binding is always a plain identifier; destructured loop variables
    /// are expanded into the body prologue by the lowerer.
    IteratorLoop {
        label: Option<String>,
        mode: IterationMode,
        binding: String,
        source: NodeId,
        body: NodeId,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Try {
        block: NodeId,
        handler_param: Option<String>,
        handler: Option<NodeId>,
        finalizer: Option<NodeId>,
    },
    /// Case list preserves source order and fallthrough; `default` (test
    /// `None`) matches only when no case matched.
    Switch {
        discriminant: NodeId,
        cases: Vec<SwitchArm>,
    },
    Throw {
        value: NodeId,
    },

    // -- expressions
    Literal {
        value: LiteralValue,
    },
    NameRef {
        name: String,
        resolution: Resolution,
    },
    This,
    ArrayLit {
        elements: Vec<Arg>,
    },
    ObjectLit {
        properties: Vec<ObjectEntry>,
    },
    Template {
        parts: Vec<TemplateChunk>,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Logical {
        op: LogicalOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Conditional {
        condition: NodeId,
        consequent: NodeId,
        alternate: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<Arg>,
    },
    New {
        callee: NodeId,
        args: Vec<Arg>,
    },
    Member {
        object: NodeId,
        key: KeyRef,
    },
    /// Structural suspension marker. The pipeline never schedules anything;
    /// only a backend gives this meaning.
    Await {
        argument: NodeId,
    },
    /// Structural suspension marker for generators.
    Yield {
        argument: Option<NodeId>,
        delegate: bool,
    },
    /// Call into the target runtime prelude (element access, slices, object
    /// rest). Indices are 0-based regardless of target convention.
    RuntimeCall {
        helper: RuntimeHelper,
        args: Vec<NodeId>,
    },
}

impl NodeKind {
    /// Stable kind name, used in diagnostics and backend errors.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Binding { .. } => "Binding",
            NodeKind::Function(_) => "Function",
            NodeKind::TypeDeclaration(_) => "TypeDeclaration",
            NodeKind::ExpressionStmt { .. } => "ExpressionStmt",
            NodeKind::Return { .. } => "Return",
            NodeKind::If { .. } => "If",
            NodeKind::Block { .. } => "Block",
            NodeKind::Loop { .. } => "Loop",
            NodeKind::IteratorLoop { .. } => "IteratorLoop",
            NodeKind::Break { .. } => "Break",
            NodeKind::Continue { .. } => "Continue",
            NodeKind::Try { .. } => "Try",
            NodeKind::Switch { .. } => "Switch",
            NodeKind::Throw { .. } => "Throw",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::NameRef { .. } => "NameRef",
            NodeKind::This => "This",
            NodeKind::ArrayLit { .. } => "ArrayLit",
            NodeKind::ObjectLit { .. } => "ObjectLit",
            NodeKind::Template { .. } => "Template",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Binary { .. } => "Binary",
            NodeKind::Logical { .. } => "Logical",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::Conditional { .. } => "Conditional",
            NodeKind::Call { .. } => "Call",
            NodeKind::New { .. } => "New",
            NodeKind::Member { .. } => "Member",
            NodeKind::Await { .. } => "Await",
            NodeKind::Yield { .. } => "Yield",
            NodeKind::RuntimeCall { .. } => "RuntimeCall",
        }
    }

    /// Visits every child id slot exactly once, in field order.
    pub(crate) fn for_each_child_mut(&mut self, f: &mut impl FnMut(&mut NodeId)) {
        match self {
            NodeKind::Binding { init, .. } => {
                if let Some(id) = init {
                    f(id);
                }
            }
            NodeKind::Function(func) => {
                for id in &mut func.body {
                    f(id);
                }
            }
            NodeKind::TypeDeclaration(decl) => {
                for member in &mut decl.members {
                    f(&mut member.value);
                }
            }
            NodeKind::ExpressionStmt { expr } => f(expr),
            NodeKind::Return { value } => {
                if let Some(id) = value {
                    f(id);
                }
            }
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => {
                f(condition);
                f(then_block);
                if let Some(id) = else_block {
                    f(id);
                }
            }
            NodeKind::Block { body, .. } => {
                for id in body {
                    f(id);
                }
            }
            NodeKind::Loop {
                condition, body, ..
            } => {
                f(condition);
                f(body);
            }
            NodeKind::IteratorLoop { source, body, .. } => {
                f(source);
                f(body);
            }
            NodeKind::Break { .. } | NodeKind::Continue { .. } => {}
            NodeKind::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                f(block);
                if let Some(id) = handler {
                    f(id);
                }
                if let Some(id) = finalizer {
                    f(id);
                }
            }
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                f(discriminant);
                for case in cases {
                    if let Some(test) = &mut case.test {
                        f(test);
                    }
                    for id in &mut case.body {
                        f(id);
                    }
                }
            }
            NodeKind::Throw { value } => f(value),
            NodeKind::Literal { .. } | NodeKind::NameRef { .. } | NodeKind::This => {}
            NodeKind::ArrayLit { elements } => {
                for arg in elements {
                    f(arg.id_mut());
                }
            }
            NodeKind::ObjectLit { properties } => {
                for entry in properties {
                    if let KeyRef::Computed(id) = &mut entry.key {
                        f(id);
                    }
                    f(&mut entry.value);
                }
            }
            NodeKind::Template { parts } => {
                for part in parts {
                    if let TemplateChunk::Expr(id) = part {
                        f(id);
                    }
                }
            }
            NodeKind::Unary { operand, .. } => f(operand),
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::Logical { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            NodeKind::Assign { target, value } => {
                f(target);
                f(value);
            }
            NodeKind::Conditional {
                condition,
                consequent,
                alternate,
            } => {
                f(condition);
                f(consequent);
                f(alternate);
            }
            NodeKind::Call { callee, args } | NodeKind::New { callee, args } => {
                f(callee);
                for arg in args {
                    f(arg.id_mut());
                }
            }
            NodeKind::Member { object, key } => {
                f(object);
                if let KeyRef::Computed(id) = key {
                    f(id);
                }
            }
            NodeKind::Await { argument } => f(argument),
            NodeKind::Yield { argument, .. } => {
                if let Some(id) = argument {
                    f(id);
                }
            }
            NodeKind::RuntimeCall { args, .. } => {
                for id in args {
                    f(id);
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<NodeId>,
    pub is_async: bool,
    pub is_generator: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeDeclNode {
    pub name: String,
    /// Deferred binding: resolved against the emission scope, never during
    /// lowering.
    pub superclass: Option<String>,
    pub members: Vec<TypeMember>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeMember {
    pub name: String,
    pub kind: MemberKind,
    pub is_static: bool,
    pub value: NodeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Method,
    Getter,
    Setter,
    Field,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationMode {
    /// `for-of`: iterate values.
    Values,
    /// `for-in`: iterate keys.
    Keys,
}

/// How an identifier resolved during lowering. An unresolved identifier is
/// not an error; it is a deliberate capture from the host environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Local,
    Global,
}

/// Argument or array element, possibly spread into place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Value(NodeId),
    Spread(NodeId),
}

impl Arg {
    pub fn id(&self) -> NodeId {
        match self {
            Arg::Value(id) | Arg::Spread(id) => *id,
        }
    }

    fn id_mut(&mut self) -> &mut NodeId {
        match self {
            Arg::Value(id) | Arg::Spread(id) => id,
        }
    }
}

/// One switch arm. `test: None` marks the `default` arm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchArm {
    pub test: Option<NodeId>,
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: KeyRef,
    pub value: NodeId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyRef {
    Named(String),
    Computed(NodeId),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TemplateChunk {
    Lit(String),
    Expr(NodeId),
}

/// Prelude operations backends must provide. All indices are 0-based; a
/// 1-based target maps them explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeHelper {
    /// `at(sequence, index)`: element access.
    At,
    /// `slice_from(sequence, start)`: the remaining elements as a new
    /// sequence.
    SliceFrom,
    /// `omit_keys(object, key...)`: a shallow copy without the given keys.
    OmitKeys,
    /// `to_str(value)`: stringification for template interpolation.
    ToStr,
}

impl RuntimeHelper {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeHelper::At => "at",
            RuntimeHelper::SliceFrom => "slice_from",
            RuntimeHelper::OmitKeys => "omit_keys",
            RuntimeHelper::ToStr => "to_str",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub target: NodeId,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Identifiers that resolved to no scope frame: external/global
    /// captures, recorded rather than rejected.
    pub global_captures: BTreeSet<String>,
}

/// One lowered module: an arena of nodes indexed by id, the top-level
/// statement list, exports, and per-function control-flow graphs.
///
/// Invariant (checked by the validator): every id reachable from `body`,
/// from any node's child fields, from `exports` or from any CFG must exist
/// in `nodes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    pub id: String,
    /// Originating source path or name, as the host reported it.
    pub source: String,
    pub directives: Vec<String>,
    pub body: Vec<NodeId>,
    pub exports: Vec<Export>,
    pub metadata: ModuleMetadata,
    pub nodes: BTreeMap<NodeId, Node>,
    pub cfgs: BTreeMap<NodeId, Cfg>,
    /// Continues the lowering counter so transforms allocate fresh ids.
    pub id_gen: IdGen,
}

impl IrModule {
    pub fn new(id: impl Into<String>, seed: u64) -> Self {
        let id = id.into();
        Self {
            source: id.clone(),
            id,
            directives: Vec::new(),
            body: Vec::new(),
            exports: Vec::new(),
            metadata: ModuleMetadata::default(),
            nodes: BTreeMap::new(),
            cfgs: BTreeMap::new(),
            id_gen: IdGen::new(seed),
        }
    }

    /// Places a detached node under a fresh id.
    pub fn insert(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.id_gen.next_id();
        self.nodes.insert(id, Node { id, kind, span });
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Post-validation accessor. Panics on a dangling id, which validation
    /// has already excluded.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    /// Every node id reachable from `body` and `exports`, depth-first.
    pub fn reachable(&self) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.body.clone();
        stack.extend(self.exports.iter().map(|e| e.target));
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children());
            }
        }
        seen
    }

    /// Drops nodes no longer reachable from the module roots, along with
    /// CFGs keyed by dropped functions. Used after transform runs, which
    /// leave replaced subtrees behind.
    pub fn prune_unreachable(&mut self) {
        let live = self.reachable();
        self.nodes.retain(|id, _| live.contains(id));
        self.cfgs.retain(|id, _| live.contains(id));
    }

    /// Ids of every `Function` node reachable from the roots, in id order.
    pub fn function_ids(&self) -> Vec<NodeId> {
        let live = self.reachable();
        self.nodes
            .values()
            .filter(|n| live.contains(&n.id) && matches!(n.kind, NodeKind::Function(_)))
            .map(|n| n.id)
            .collect()
    }
}
