//! The extension/transform registry: pluggable passes applied between
//! validation and emission. The registry is an explicit, caller-owned
//! instance, never a process-wide singleton, so independent modules can
//! be compiled concurrently, each against its own (or a shared, read-only)
//! registry.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ast::common::Span;
use crate::ir::{IrModule, Node, NodeId};

pub mod passes;

/// The pass API version this registry implements.
pub const REGISTRY_API: ApiVersion = ApiVersion { major: 1, minor: 2 };

/// Minor versions older than this still load, with a deprecation warning.
pub const DEPRECATED_BEFORE_MINOR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Outcome of the registration-time compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Same major, minor within the supported window.
    Full,
    /// Same major, newer minor than the registry: unknown extensions are
    /// ignored.
    Partial,
    /// Same major, minor older than the deprecation floor.
    Deprecated,
}

/// How a pass wants to see the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Dispatch over every node in the arena, in id order.
    PerNode,
    /// Depth-first walk of the tree reachable from the module roots.
    TreeWalk,
}

/// Failure raised by a pass. Fail-open for optional passes, fail-closed for
/// mandatory ones.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct PassError {
    pub message: String,
}

impl PassError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl PassValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Context handed to a pass for each dispatch. Grants read access to the
/// module and nothing else; replacement wiring belongs to the registry.
pub struct PassContext<'a> {
    pub module: &'a IrModule,
}

/// A pluggable transform. `mandatory` is a required method on purpose:
/// whether a failing pass aborts the pipeline or degrades to a warning is
/// an explicit author decision, never inferred.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// The pass API version this pass was written against.
    fn api_version(&self) -> ApiVersion;

    /// Ascending order of application; ties keep registration order.
    fn priority(&self) -> i32;

    fn mandatory(&self) -> bool;

    fn mode(&self) -> PassMode {
        PassMode::PerNode
    }

    /// Node kinds this pass consumes; `None` means any. Used as a
    /// pre-filter before `wants`.
    fn input_kinds(&self) -> Option<&'static [&'static str]> {
        None
    }

    /// Node kinds this pass may produce; `None` means unspecified.
    fn output_kinds(&self) -> Option<&'static [&'static str]> {
        None
    }

    /// True when the pass observes anything beyond the nodes it is given.
    fn has_side_effects(&self) -> bool {
        false
    }

    /// Per-node filter; uninterested passes skip cheaply.
    fn wants(&self, node: &Node) -> bool {
        let _ = node;
        true
    }

    /// Returns `Some(replacement)` to substitute the node, `None` to leave
    /// it untouched. The replacement is placed under a fresh id; the
    /// registry rewrites every reference to the old node.
    fn transform(&self, node: &Node, ctx: &PassContext<'_>) -> Result<Option<Node>, PassError>;

    /// Post-transform self-check. A rejecting result discards the
    /// replacement (optional pass) or aborts/rolls back (mandatory pass).
    fn validate(&self, original: &Node, transformed: &Node) -> PassValidation {
        let _ = (original, transformed);
        PassValidation::valid()
    }

    /// Last-resort substitute when a mandatory pass's own validation
    /// rejects its output.
    fn rollback(&self, transformed: &Node) -> Option<Node> {
        let _ = transformed;
        None
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(
        "pass {name:?} declares api version {declared}, incompatible with registry {current}"
    )]
    IncompatibleVersion {
        name: String,
        declared: ApiVersion,
        current: ApiVersion,
    },
    #[error("a pass named {name:?} is already registered")]
    DuplicatePass { name: String },
    #[error("mandatory pass {name:?} failed on node {node}: {source}")]
    MandatoryPassFailed {
        name: String,
        node: NodeId,
        #[source]
        source: PassError,
    },
    #[error("mandatory pass {name:?} produced invalid output for node {node}: {details}")]
    MandatoryPassInvalid {
        name: String,
        node: NodeId,
        details: String,
    },
}

impl TransformError {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::IncompatibleVersion { .. } | TransformError::DuplicatePass { .. } => {
                "ExtensionIncompatible"
            }
            TransformError::MandatoryPassFailed { .. }
            | TransformError::MandatoryPassInvalid { .. } => "ExtensionRuntime",
        }
    }
}

/// Per-pass run counters.
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    pub name: String,
    /// Nodes replaced.
    pub applied: usize,
    /// Replacements discarded by the pass's own validation.
    pub rejected: usize,
    /// Transform errors tolerated because the pass is optional.
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub per_pass: Vec<PassStats>,
    /// True when any node was replaced; CFGs must be rebuilt and the module
    /// re-validated before emission.
    pub changed: bool,
}

struct RegisteredPass {
    pass: Box<dyn Pass>,
    order: usize,
}

/// Ordered collection of passes. Read-only once module processing starts;
/// `run` takes `&self`.
#[derive(Default)]
pub struct TransformRegistry {
    passes: Vec<RegisteredPass>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Registers a pass, checking API compatibility. An incompatible major
    /// version refuses to load; a deprecated minor loads with a warning.
    pub fn register(&mut self, pass: Box<dyn Pass>) -> Result<Compatibility, TransformError> {
        let declared = pass.api_version();
        if declared.major != REGISTRY_API.major {
            return Err(TransformError::IncompatibleVersion {
                name: pass.name().to_string(),
                declared,
                current: REGISTRY_API,
            });
        }
        if self.passes.iter().any(|p| p.pass.name() == pass.name()) {
            return Err(TransformError::DuplicatePass {
                name: pass.name().to_string(),
            });
        }
        let compatibility = if declared.minor < DEPRECATED_BEFORE_MINOR {
            warn!(
                pass = pass.name(),
                version = %declared,
                "pass targets a deprecated api minor; it still loads"
            );
            Compatibility::Deprecated
        } else if declared.minor > REGISTRY_API.minor {
            Compatibility::Partial
        } else {
            Compatibility::Full
        };
        info!(pass = pass.name(), version = %declared, ?compatibility, "pass registered");
        let order = self.passes.len();
        self.passes.push(RegisteredPass { pass, order });
        Ok(compatibility)
    }

    /// Applies every pass in ascending priority order. Optional pass
    /// failures are logged and skipped; mandatory failures abort the run.
    #[instrument(level = "debug", skip_all, fields(module = %module.id, passes = self.passes.len()))]
    pub fn run(&self, module: &mut IrModule) -> Result<RunStats, TransformError> {
        let mut order: Vec<&RegisteredPass> = self.passes.iter().collect();
        order.sort_by_key(|p| (p.pass.priority(), p.order));

        let mut stats = RunStats::default();
        for registered in order {
            let pass = registered.pass.as_ref();
            let pass_stats = self.run_pass(pass, module, &mut stats.changed)?;
            debug!(
                pass = pass.name(),
                applied = pass_stats.applied,
                rejected = pass_stats.rejected,
                failed = pass_stats.failed,
                "pass finished"
            );
            stats.per_pass.push(pass_stats);
        }
        if stats.changed {
            module.prune_unreachable();
        }
        Ok(stats)
    }

    fn run_pass(
        &self,
        pass: &dyn Pass,
        module: &mut IrModule,
        changed: &mut bool,
    ) -> Result<PassStats, TransformError> {
        let mut pass_stats = PassStats {
            name: pass.name().to_string(),
            ..PassStats::default()
        };

        let targets: Vec<NodeId> = match pass.mode() {
            PassMode::PerNode => module.nodes.keys().copied().collect(),
            PassMode::TreeWalk => tree_order(module),
        };

        for id in targets {
            // Replacements made earlier in this pass may have removed the
            // node.
            let Some(original) = module.get(id).cloned() else {
                continue;
            };
            if let Some(kinds) = pass.input_kinds() {
                if !kinds.contains(&original.kind.name()) {
                    continue;
                }
            }
            if !pass.wants(&original) {
                continue;
            }

            let outcome = {
                let ctx = PassContext { module: &*module };
                pass.transform(&original, &ctx)
            };
            let replacement = match outcome {
                Ok(None) => continue,
                Ok(Some(node)) => node,
                Err(error) => {
                    if pass.mandatory() {
                        return Err(TransformError::MandatoryPassFailed {
                            name: pass.name().to_string(),
                            node: id,
                            source: error,
                        });
                    }
                    warn!(
                        pass = pass.name(),
                        node = %id,
                        %error,
                        "optional pass failed; node left unchanged"
                    );
                    pass_stats.failed += 1;
                    continue;
                }
            };

            let verdict = pass.validate(&original, &replacement);
            let accepted = if verdict.valid {
                Some(replacement)
            } else if pass.mandatory() {
                match pass.rollback(&replacement) {
                    Some(rolled_back) => {
                        warn!(
                            pass = pass.name(),
                            node = %id,
                            "mandatory pass output rejected; rollback substituted"
                        );
                        Some(rolled_back)
                    }
                    None => {
                        return Err(TransformError::MandatoryPassInvalid {
                            name: pass.name().to_string(),
                            node: id,
                            details: verdict.errors.join("; "),
                        });
                    }
                }
            } else {
                warn!(
                    pass = pass.name(),
                    node = %id,
                    errors = verdict.errors.join("; "),
                    "optional pass output rejected"
                );
                pass_stats.rejected += 1;
                None
            };

            if let Some(node) = accepted {
                replace_node(module, id, node);
                pass_stats.applied += 1;
                *changed = true;
            }
        }
        Ok(pass_stats)
    }
}

/// Commits a replacement: the new node gets a fresh id, every reference to
/// the old id is rewritten, and the old node is removed. The replaced
/// subtree stays in the arena until the post-run prune.
fn replace_node(module: &mut IrModule, old: NodeId, replacement: Node) {
    let span = if replacement.span == Span::default() {
        module.node(old).span
    } else {
        replacement.span
    };
    let new = module.insert(replacement.kind, span);

    let parents: Vec<NodeId> = module
        .nodes
        .values()
        .filter(|n| n.id != new && n.children().contains(&old))
        .map(|n| n.id)
        .collect();
    for parent in parents {
        let rewritten = module.node(parent).kind_with_replaced_child(old, new);
        let entry = module.nodes.get_mut(&parent).expect("parent node");
        entry.kind = rewritten;
    }
    for id in &mut module.body {
        if *id == old {
            *id = new;
        }
    }
    for export in &mut module.exports {
        if export.target == old {
            export.target = new;
        }
    }
    module.nodes.remove(&old);
}

/// Depth-first pre-order over the tree reachable from the module roots.
fn tree_order(module: &IrModule) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = module.body.iter().rev().copied().collect();
    let mut seen = std::collections::BTreeSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        out.push(id);
        if let Some(node) = module.get(id) {
            for child in node.children().into_iter().rev() {
                stack.push(child);
            }
        }
    }
    out
}
