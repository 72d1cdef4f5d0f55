//! Per-function control-flow graphs derived from lowered IR. The builder
//! opens a new block at every branch target and closes the current one with
//! exactly one terminator. Blocks that end up with no live predecessor are
//! flagged dead rather than rejected.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{IrModule, IterationMode, NodeId, NodeKind, Span};

pub type BlockId = usize;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cfg {
    pub entry: BlockId,
    pub blocks: Vec<BasicBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub statements: Vec<NodeId>,
    pub terminator: Terminator,
    /// Set when the block has no live predecessor; a warning, not an error.
    pub dead: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Terminator {
    pub span: Option<Span>,
    pub kind: TerminatorKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TerminatorKind {
    /// Unconditional jump.
    Goto { target: BlockId },
    /// Two-way conditional branch.
    Branch {
        condition: NodeId,
        then_target: BlockId,
        else_target: BlockId,
    },
    /// Dispatch over switch arm tests, in source order; `otherwise` is the
    /// default arm or the join block.
    Switch {
        discriminant: NodeId,
        targets: Vec<SwitchTarget>,
        otherwise: BlockId,
    },
    /// Iterator-protocol loop header: take the next element or leave.
    Iterate {
        source: NodeId,
        mode: IterationMode,
        body: BlockId,
        exit: BlockId,
    },
    /// Entry into a protected region: the body runs, and any statement in
    /// it may transfer to the handler.
    Protected {
        body: BlockId,
        handler: Option<BlockId>,
    },
    Return,
    Throw { value: NodeId },
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchTarget {
    pub test: NodeId,
    pub target: BlockId,
}

impl TerminatorKind {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            TerminatorKind::Goto { target } => vec![*target],
            TerminatorKind::Branch {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            TerminatorKind::Switch {
                targets, otherwise, ..
            } => {
                let mut out: Vec<BlockId> = targets.iter().map(|t| t.target).collect();
                out.push(*otherwise);
                out
            }
            TerminatorKind::Iterate { body, exit, .. } => vec![*body, *exit],
            TerminatorKind::Protected { body, handler } => {
                let mut out = vec![*body];
                out.extend(*handler);
                out
            }
            TerminatorKind::Return | TerminatorKind::Throw { .. } | TerminatorKind::Unreachable => {
                vec![]
            }
        }
    }
}

/// Builds CFGs for every function reachable in the module, keyed by the
/// function node's id.
pub fn build_all_cfgs(module: &mut IrModule) {
    module.cfgs.clear();
    for fn_id in module.function_ids() {
        let body = match &module.node(fn_id).kind {
            NodeKind::Function(func) => func.body.clone(),
            _ => unreachable!(),
        };
        let cfg = build_cfg(module, &body);
        module.cfgs.insert(fn_id, cfg);
    }
}

/// Builds the graph for one statement list (a function body).
#[instrument(level = "debug", skip_all, fields(statements = statements.len()))]
pub fn build_cfg(module: &IrModule, statements: &[NodeId]) -> Cfg {
    let mut builder = CfgBuilder {
        module,
        blocks: Vec::new(),
        current: Vec::new(),
        loops: Vec::new(),
    };
    let entry = builder.reserve_block();
    if let Some(open) = builder.walk(statements, entry) {
        // The last open block returns implicitly.
        builder.fill(open, TerminatorKind::Return, None);
    }
    let mut cfg = Cfg {
        entry,
        blocks: builder.finish(),
    };
    mark_dead(&mut cfg);
    debug!(blocks = cfg.blocks.len(), "cfg built");
    cfg
}

struct LoopTargets {
    label: Option<String>,
    continue_target: BlockId,
    break_target: BlockId,
    /// Switch and labeled-block frames accept `break` but not `continue`.
    is_loop: bool,
}

struct CfgBuilder<'a> {
    module: &'a IrModule,
    // Placeholders while forward targets are unknown; every reserved slot
    // is filled before `finish` runs.
    blocks: Vec<Option<BasicBlock>>,
    current: Vec<NodeId>,
    loops: Vec<LoopTargets>,
}

impl CfgBuilder<'_> {
    fn reserve_block(&mut self) -> BlockId {
        self.blocks.push(None);
        self.blocks.len() - 1
    }

    fn fill(&mut self, id: BlockId, terminator: TerminatorKind, span: Option<Span>) {
        let statements = std::mem::take(&mut self.current);
        self.blocks[id] = Some(BasicBlock {
            statements,
            terminator: Terminator {
                span,
                kind: terminator,
            },
            dead: false,
        });
    }

    fn finish(self) -> Vec<BasicBlock> {
        self.blocks
            .into_iter()
            .map(|b| b.expect("unfilled cfg block"))
            .collect()
    }

    /// Walks a statement list into the block reserved as `into`. Returns the
    /// id of the block left open at the end, or `None` when control already
    /// left (return/throw/break/continue).
    fn walk(&mut self, statements: &[NodeId], into: BlockId) -> Option<BlockId> {
        let mut open = into;
        let mut iter = statements.iter().peekable();
        while let Some(&stmt_id) = iter.next() {
            let node = self.module.node(stmt_id).clone();
            match &node.kind {
                NodeKind::Return { .. } => {
                    self.current.push(stmt_id);
                    self.fill(open, TerminatorKind::Return, Some(node.span));
                    if iter.peek().is_some() {
                        // Trailing statements land in a block with no
                        // predecessor; mark_dead flags it.
                        open = self.reserve_block();
                        continue;
                    }
                    return None;
                }
                NodeKind::Throw { value } => {
                    self.fill(open, TerminatorKind::Throw { value: *value }, Some(node.span));
                    if iter.peek().is_some() {
                        open = self.reserve_block();
                        continue;
                    }
                    return None;
                }
                NodeKind::Break { label } => {
                    let target = self.break_target(label.as_deref());
                    self.fill(open, TerminatorKind::Goto { target }, Some(node.span));
                    if iter.peek().is_some() {
                        open = self.reserve_block();
                        continue;
                    }
                    return None;
                }
                NodeKind::Continue { label } => {
                    let target = self.continue_target(label.as_deref());
                    self.fill(open, TerminatorKind::Goto { target }, Some(node.span));
                    if iter.peek().is_some() {
                        open = self.reserve_block();
                        continue;
                    }
                    return None;
                }
                NodeKind::If {
                    condition,
                    then_block,
                    else_block,
                } => {
                    let then_id = self.reserve_block();
                    let join = self.reserve_block();
                    let else_id = match else_block {
                        Some(_) => self.reserve_block(),
                        None => join,
                    };
                    self.fill(
                        open,
                        TerminatorKind::Branch {
                            condition: *condition,
                            then_target: then_id,
                            else_target: else_id,
                        },
                        Some(node.span),
                    );
                    let then_body = self.block_body(*then_block);
                    if let Some(left_open) = self.walk(&then_body, then_id) {
                        self.fill(left_open, TerminatorKind::Goto { target: join }, None);
                    }
                    if let Some(else_node) = else_block {
                        let else_body = self.block_body(*else_node);
                        if let Some(left_open) = self.walk(&else_body, else_id) {
                            self.fill(left_open, TerminatorKind::Goto { target: join }, None);
                        }
                    }
                    open = join;
                }
                NodeKind::Loop {
                    label,
                    condition,
                    body,
                    check_before,
                } => {
                    let header = self.reserve_block();
                    let body_id = self.reserve_block();
                    let exit = self.reserve_block();
                    let first = if *check_before { header } else { body_id };
                    self.fill(open, TerminatorKind::Goto { target: first }, Some(node.span));
                    self.fill(
                        header,
                        TerminatorKind::Branch {
                            condition: *condition,
                            then_target: body_id,
                            else_target: exit,
                        },
                        None,
                    );
                    self.loops.push(LoopTargets {
                        label: label.clone(),
                        continue_target: header,
                        break_target: exit,
                        is_loop: true,
                    });
                    let loop_body = self.block_body(*body);
                    if let Some(left_open) = self.walk(&loop_body, body_id) {
                        self.fill(left_open, TerminatorKind::Goto { target: header }, None);
                    }
                    self.loops.pop();
                    open = exit;
                }
                NodeKind::IteratorLoop {
                    label,
                    mode,
                    source,
                    body,
                    ..
                } => {
                    let header = self.reserve_block();
                    let body_id = self.reserve_block();
                    let exit = self.reserve_block();
                    self.fill(open, TerminatorKind::Goto { target: header }, Some(node.span));
                    self.fill(
                        header,
                        TerminatorKind::Iterate {
                            source: *source,
                            mode: *mode,
                            body: body_id,
                            exit,
                        },
                        None,
                    );
                    self.loops.push(LoopTargets {
                        label: label.clone(),
                        continue_target: header,
                        break_target: exit,
                        is_loop: true,
                    });
                    let loop_body = self.block_body(*body);
                    if let Some(left_open) = self.walk(&loop_body, body_id) {
                        self.fill(left_open, TerminatorKind::Goto { target: header }, None);
                    }
                    self.loops.pop();
                    open = exit;
                }
                NodeKind::Switch {
                    discriminant,
                    cases,
                } => {
                    let exit = self.reserve_block();
                    let case_blocks: Vec<BlockId> =
                        cases.iter().map(|_| self.reserve_block()).collect();
                    let mut targets = Vec::new();
                    let mut otherwise = exit;
                    for (case, block) in cases.iter().zip(&case_blocks) {
                        match case.test {
                            Some(test) => targets.push(SwitchTarget {
                                test,
                                target: *block,
                            }),
                            None => otherwise = *block,
                        }
                    }
                    self.fill(
                        open,
                        TerminatorKind::Switch {
                            discriminant: *discriminant,
                            targets,
                            otherwise,
                        },
                        Some(node.span),
                    );
                    self.loops.push(LoopTargets {
                        label: None,
                        continue_target: exit,
                        break_target: exit,
                        is_loop: false,
                    });
                    for (index, (case, block)) in cases.iter().zip(&case_blocks).enumerate() {
                        // Fallthrough: an unterminated case body continues
                        // into the next case's body, or the exit.
                        let next = case_blocks.get(index + 1).copied().unwrap_or(exit);
                        if let Some(left_open) = self.walk(&case.body, *block) {
                            self.fill(left_open, TerminatorKind::Goto { target: next }, None);
                        }
                    }
                    self.loops.pop();
                    open = exit;
                }
                NodeKind::Try {
                    block,
                    handler,
                    finalizer,
                    ..
                } => {
                    let body_id = self.reserve_block();
                    let handler_id = handler.map(|_| self.reserve_block());
                    let fin_id = finalizer.map(|_| self.reserve_block());
                    let exit = self.reserve_block();
                    let after = fin_id.unwrap_or(exit);
                    self.fill(
                        open,
                        TerminatorKind::Protected {
                            body: body_id,
                            handler: handler_id,
                        },
                        Some(node.span),
                    );
                    let try_body = self.block_body(*block);
                    if let Some(left_open) = self.walk(&try_body, body_id) {
                        self.fill(left_open, TerminatorKind::Goto { target: after }, None);
                    }
                    if let (Some(handler_node), Some(handler_block)) = (handler, handler_id) {
                        let handler_body = self.block_body(*handler_node);
                        if let Some(left_open) = self.walk(&handler_body, handler_block) {
                            self.fill(left_open, TerminatorKind::Goto { target: after }, None);
                        }
                    }
                    if let (Some(fin_node), Some(fin_block)) = (finalizer, fin_id) {
                        let fin_body = self.block_body(*fin_node);
                        if let Some(left_open) = self.walk(&fin_body, fin_block) {
                            self.fill(left_open, TerminatorKind::Goto { target: exit }, None);
                        }
                    }
                    open = exit;
                }
                NodeKind::Block { label, body } => {
                    let inner = self.reserve_block();
                    let exit = self.reserve_block();
                    self.fill(open, TerminatorKind::Goto { target: inner }, Some(node.span));
                    self.loops.push(LoopTargets {
                        label: label.clone(),
                        continue_target: exit,
                        break_target: exit,
                        is_loop: false,
                    });
                    let block_body = body.clone();
                    if let Some(left_open) = self.walk(&block_body, inner) {
                        self.fill(left_open, TerminatorKind::Goto { target: exit }, None);
                    }
                    self.loops.pop();
                    open = exit;
                }
                _ => {
                    self.current.push(stmt_id);
                }
            }
        }
        Some(open)
    }

    fn block_body(&self, id: NodeId) -> Vec<NodeId> {
        match &self.module.node(id).kind {
            NodeKind::Block { body, .. } => body.clone(),
            // A single statement in block position.
            _ => vec![id],
        }
    }

    // Label targets were validated during lowering; a miss here is a
    // lowerer bug, not a user error.
    fn break_target(&self, label: Option<&str>) -> BlockId {
        self.loops
            .iter()
            .rev()
            .find(|l| match label {
                Some(name) => l.label.as_deref() == Some(name),
                None => true,
            })
            .map(|l| l.break_target)
            .expect("break outside of breakable statement")
    }

    fn continue_target(&self, label: Option<&str>) -> BlockId {
        self.loops
            .iter()
            .rev()
            .find(|l| match label {
                Some(name) => l.is_loop && l.label.as_deref() == Some(name),
                None => l.is_loop,
            })
            .map(|l| l.continue_target)
            .expect("continue outside of loop")
    }
}

fn mark_dead(cfg: &mut Cfg) {
    let mut reachable = vec![false; cfg.blocks.len()];
    let mut stack = vec![cfg.entry];
    while let Some(id) = stack.pop() {
        if reachable[id] {
            continue;
        }
        reachable[id] = true;
        stack.extend(cfg.blocks[id].terminator.kind.successors());
    }
    for (id, block) in cfg.blocks.iter_mut().enumerate() {
        block.dead = !reachable[id];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::common::Span;
    use crate::ast::expressions::LiteralValue;
    use crate::ir::IrModule;

    fn literal(module: &mut IrModule, value: LiteralValue) -> NodeId {
        module.insert(NodeKind::Literal { value }, Span::default())
    }

    #[test]
    fn straight_line_body_is_one_block() {
        let mut module = IrModule::new("m", 1);
        let one = literal(&mut module, LiteralValue::Number(1.0));
        let bind = module.insert(
            NodeKind::Binding {
                name: "x".into(),
                init: Some(one),
                mutable: false,
            },
            Span::default(),
        );
        let cfg = build_cfg(&module, &[bind]);
        assert_eq!(cfg.blocks.len(), 1);
        assert_eq!(cfg.blocks[0].statements, vec![bind]);
        assert!(matches!(
            cfg.blocks[0].terminator.kind,
            TerminatorKind::Return
        ));
    }

    #[test]
    fn statements_after_return_are_dead() {
        let mut module = IrModule::new("m", 1);
        let ret = module.insert(NodeKind::Return { value: None }, Span::default());
        let one = literal(&mut module, LiteralValue::Number(1.0));
        let stmt = module.insert(NodeKind::ExpressionStmt { expr: one }, Span::default());
        let cfg = build_cfg(&module, &[ret, stmt]);
        assert!(!cfg.blocks[cfg.entry].dead);
        assert!(cfg.blocks.iter().any(|b| b.dead));
    }

    #[test]
    fn loop_header_branches_to_body_and_exit() {
        let mut module = IrModule::new("m", 1);
        let cond = literal(&mut module, LiteralValue::Bool(true));
        let body = module.insert(
            NodeKind::Block {
                label: None,
                body: vec![],
            },
            Span::default(),
        );
        let l = module.insert(
            NodeKind::Loop {
                label: None,
                condition: cond,
                body,
                check_before: true,
            },
            Span::default(),
        );
        let cfg = build_cfg(&module, &[l]);
        let header = cfg
            .blocks
            .iter()
            .find(|b| matches!(b.terminator.kind, TerminatorKind::Branch { .. }))
            .expect("loop header");
        assert_eq!(header.terminator.kind.successors().len(), 2);
        // Every reachable block carries exactly one terminator by
        // construction; spot-check reachability.
        assert!(cfg.blocks.iter().filter(|b| !b.dead).count() >= 3);
    }
}
