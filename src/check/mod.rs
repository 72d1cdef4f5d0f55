//! The IR validator: a non-mutating, exhaustive pass over a lowered module
//! that collects every violation instead of stopping at the first. On any
//! violation the pipeline aborts before the transform registry runs.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::ast::common::Span;
use crate::ir::{IrModule, NodeId, NodeKind, Resolution, TerminatorKind, schema};

pub mod reports;

/// Stable violation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCode {
    SchemaViolation,
    ReferentialIntegrity,
    ScopeIntegrity,
    CfgMalformed,
}

impl CheckCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCode::SchemaViolation => "SchemaViolation",
            CheckCode::ReferentialIntegrity => "ReferentialIntegrity",
            CheckCode::ScopeIntegrity => "ScopeIntegrity",
            CheckCode::CfgMalformed => "CfgMalformed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub code: CheckCode,
    pub message: String,
    pub node: Option<NodeId>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub violations: Vec<Violation>,
}

impl CheckReport {
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, code: CheckCode, message: String, node: Option<NodeId>, span: Option<Span>) {
        self.violations.push(Violation {
            code,
            message,
            node,
            span,
        });
    }
}

/// Validates one module. Never mutates, never early-exits.
#[instrument(level = "debug", skip_all, fields(module = %module.id))]
pub fn validate(module: &IrModule) -> CheckReport {
    let mut report = CheckReport::default();
    check_referential_integrity(module, &mut report);
    check_schema(module, &mut report);
    check_scopes(module, &mut report);
    check_cfgs(module, &mut report);
    debug!(violations = report.violations.len(), "validation finished");
    report
}

/// Every id reachable from `body`, from any node's child fields, from
/// `exports` or from any CFG edge must exist in `nodes`.
fn check_referential_integrity(module: &IrModule, report: &mut CheckReport) {
    let mut dangling = |id: NodeId, from: String, report: &mut CheckReport| {
        if module.get(id).is_none() {
            report.push(
                CheckCode::ReferentialIntegrity,
                format!("{from} references missing node {id}"),
                Some(id),
                None,
            );
        }
    };

    for &id in &module.body {
        dangling(id, format!("module body of {:?}", module.id), report);
    }
    for export in &module.exports {
        dangling(
            export.target,
            format!("export {:?}", export.name),
            report,
        );
    }
    for node in module.nodes.values() {
        for child in node.children() {
            dangling(child, format!("{} {}", node.kind.name(), node.id), report);
        }
    }
    for (fn_id, cfg) in &module.cfgs {
        for (index, block) in cfg.blocks.iter().enumerate() {
            for &stmt in &block.statements {
                dangling(stmt, format!("cfg of {fn_id}, block {index}"), report);
            }
            let referenced: Vec<NodeId> = match &block.terminator.kind {
                TerminatorKind::Branch { condition, .. } => vec![*condition],
                TerminatorKind::Switch {
                    discriminant,
                    targets,
                    ..
                } => {
                    let mut out = vec![*discriminant];
                    out.extend(targets.iter().map(|t| t.test));
                    out
                }
                TerminatorKind::Iterate { source, .. } => vec![*source],
                TerminatorKind::Throw { value } => vec![*value],
                _ => vec![],
            };
            for id in referenced {
                dangling(
                    id,
                    format!("cfg terminator of {fn_id}, block {index}"),
                    report,
                );
            }
        }
    }
}

/// Node fields must match their kind's declared shape.
fn check_schema(module: &IrModule, report: &mut CheckReport) {
    for node in module.nodes.values() {
        for issue in schema::check_node(node) {
            report.push(
                CheckCode::SchemaViolation,
                format!("{}: {issue}", node.kind.name()),
                Some(node.id),
                Some(node.span),
            );
        }
    }
}

/// Re-derives scopes from the IR tree and confirms every `Local` resolution
/// refers to a visible binding and every `Global` one is a recorded
/// capture. Bindings are collected per scope up front, matching the
/// hoisting view the lowerer applied.
fn check_scopes(module: &IrModule, report: &mut CheckReport) {
    let mut scopes: Vec<BTreeSet<String>> = Vec::new();
    scopes.push(BTreeSet::new());
    walk_scope(module, &module.body, &mut scopes, report);
}

fn collect_bindings(module: &IrModule, body: &[NodeId], into: &mut BTreeSet<String>) {
    for &id in body {
        let Some(node) = module.get(id) else { continue };
        match &node.kind {
            NodeKind::Binding { name, .. } => {
                into.insert(name.clone());
            }
            NodeKind::Function(func) => {
                if let Some(name) = &func.name {
                    into.insert(name.clone());
                }
            }
            NodeKind::TypeDeclaration(decl) => {
                into.insert(decl.name.clone());
            }
            // Compound statements open their own scopes; their bindings are
            // collected when the walker descends.
            _ => {}
        }
    }
}

fn walk_scope(
    module: &IrModule,
    body: &[NodeId],
    scopes: &mut Vec<BTreeSet<String>>,
    report: &mut CheckReport,
) {
    scopes.push(BTreeSet::new());
    collect_bindings(module, body, scopes.last_mut().expect("scope frame"));
    for &id in body {
        walk_scope_node(module, id, scopes, report);
    }
    scopes.pop();
}

fn walk_scope_node(
    module: &IrModule,
    id: NodeId,
    scopes: &mut Vec<BTreeSet<String>>,
    report: &mut CheckReport,
) {
    let Some(node) = module.get(id) else {
        // Already reported by the referential pass.
        return;
    };
    match &node.kind {
        NodeKind::NameRef { name, resolution } => {
            let visible = scopes.iter().any(|frame| frame.contains(name));
            match resolution {
                Resolution::Local if !visible => report.push(
                    CheckCode::ScopeIntegrity,
                    format!("local reference {name:?} resolves to no binding"),
                    Some(id),
                    Some(node.span),
                ),
                Resolution::Global if !module.metadata.global_captures.contains(name) => report
                    .push(
                        CheckCode::ScopeIntegrity,
                        format!("global reference {name:?} is not a recorded capture"),
                        Some(id),
                        Some(node.span),
                    ),
                _ => {}
            }
        }
        NodeKind::Function(func) => {
            scopes.push(BTreeSet::new());
            let frame = scopes.last_mut().expect("scope frame");
            frame.extend(func.params.iter().cloned());
            if let Some(name) = &func.name {
                frame.insert(name.clone());
            }
            walk_scope(module, &func.body, scopes, report);
            scopes.pop();
        }
        NodeKind::Block { body, .. } => {
            walk_scope(module, body, scopes, report);
        }
        NodeKind::IteratorLoop { binding, source, body, .. } => {
            walk_scope_node(module, *source, scopes, report);
            scopes.push(BTreeSet::from([binding.clone()]));
            walk_scope_node(module, *body, scopes, report);
            scopes.pop();
        }
        NodeKind::Try {
            block,
            handler_param,
            handler,
            finalizer,
        } => {
            walk_scope_node(module, *block, scopes, report);
            if let Some(handler) = handler {
                let mut frame = BTreeSet::new();
                frame.extend(handler_param.iter().cloned());
                scopes.push(frame);
                walk_scope_node(module, *handler, scopes, report);
                scopes.pop();
            }
            if let Some(finalizer) = finalizer {
                walk_scope_node(module, *finalizer, scopes, report);
            }
        }
        NodeKind::Switch { discriminant, cases } => {
            walk_scope_node(module, *discriminant, scopes, report);
            // All cases share one scope; a binding in an earlier case is
            // visible to later ones.
            scopes.push(BTreeSet::new());
            for case in cases {
                collect_bindings(module, &case.body, scopes.last_mut().expect("scope frame"));
            }
            for case in cases {
                if let Some(test) = case.test {
                    walk_scope_node(module, test, scopes, report);
                }
                for &stmt in &case.body {
                    walk_scope_node(module, stmt, scopes, report);
                }
            }
            scopes.pop();
        }
        NodeKind::TypeDeclaration(decl) => {
            for member in &decl.members {
                walk_scope_node(module, member.value, scopes, report);
            }
        }
        _ => {
            for child in node.children() {
                walk_scope_node(module, child, scopes, report);
            }
        }
    }
}

/// CFG well-formedness: a valid entry, targets in range, statement and
/// terminator nodes present, and dead flags consistent with reachability.
/// One terminator per block is structural; what can go wrong is recorded
/// data, not shape.
fn check_cfgs(module: &IrModule, report: &mut CheckReport) {
    for (fn_id, cfg) in &module.cfgs {
        match module.get(*fn_id) {
            Some(node) if matches!(node.kind, NodeKind::Function(_)) => {}
            Some(_) => {
                report.push(
                    CheckCode::CfgMalformed,
                    format!("cfg keyed by {fn_id}, which is not a function"),
                    Some(*fn_id),
                    None,
                );
                continue;
            }
            None => {
                report.push(
                    CheckCode::CfgMalformed,
                    format!("cfg keyed by missing node {fn_id}"),
                    Some(*fn_id),
                    None,
                );
                continue;
            }
        }

        if cfg.blocks.is_empty() {
            report.push(
                CheckCode::CfgMalformed,
                format!("cfg of {fn_id} has no blocks"),
                Some(*fn_id),
                None,
            );
            continue;
        }
        if cfg.entry >= cfg.blocks.len() {
            report.push(
                CheckCode::CfgMalformed,
                format!("cfg of {fn_id} has entry {} out of range", cfg.entry),
                Some(*fn_id),
                None,
            );
            continue;
        }

        for (index, block) in cfg.blocks.iter().enumerate() {
            for target in block.terminator.kind.successors() {
                if target >= cfg.blocks.len() {
                    report.push(
                        CheckCode::CfgMalformed,
                        format!(
                            "cfg of {fn_id}, block {index}: successor {target} out of range"
                        ),
                        Some(*fn_id),
                        None,
                    );
                }
            }
        }

        // Reachability must agree with the dead flags: a reachable block
        // marked dead (or the reverse) means the graph was edited without
        // re-deriving them.
        let mut reachable = vec![false; cfg.blocks.len()];
        let mut stack = vec![cfg.entry];
        while let Some(block_id) = stack.pop() {
            if block_id >= cfg.blocks.len() || reachable[block_id] {
                continue;
            }
            reachable[block_id] = true;
            stack.extend(cfg.blocks[block_id].terminator.kind.successors());
        }
        for (index, block) in cfg.blocks.iter().enumerate() {
            if reachable[index] && block.dead {
                report.push(
                    CheckCode::CfgMalformed,
                    format!("cfg of {fn_id}, block {index}: reachable but flagged dead"),
                    Some(*fn_id),
                    None,
                );
            }
            if !reachable[index] && !block.dead {
                report.push(
                    CheckCode::CfgMalformed,
                    format!("cfg of {fn_id}, block {index}: unreachable but not flagged dead"),
                    Some(*fn_id),
                    None,
                );
            }
        }
    }
}
