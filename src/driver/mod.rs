//! Pipeline orchestration: lowering → CFG derivation → validation →
//! transforms → re-validation → emission. Each invocation owns its state;
//! independent modules can be compiled concurrently by the host against a
//! shared, read-only registry.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::ast::ModuleAst;
use crate::check::{self, CheckReport};
use crate::codegen::{CodegenError, EmittedModule, backend_for};
use crate::ir::cfg::build_all_cfgs;
use crate::ir::lowering::{LoweringError, lower_module};
use crate::ir::IrModule;
use crate::transform::{RunStats, TransformError, TransformRegistry};

pub mod config;

pub use config::{CompileOptions, Config};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lowering(#[from] LoweringError),
    #[error("module failed validation with {} violation(s)", report.violations.len())]
    Invalid { report: CheckReport },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error("unknown backend {id:?}")]
    UnknownBackend { id: String },
    #[error("node budget of {budget} exceeded after transforms ({nodes} nodes)")]
    BudgetExceeded { nodes: usize, budget: usize },
}

/// Everything a successful pipeline run produces. The IR sticks around so
/// hosts can cache, diff or persist it.
#[derive(Debug)]
pub struct CompileOutput {
    pub module: IrModule,
    pub emitted: BTreeMap<String, EmittedModule>,
    pub stats: RunStats,
}

/// Runs the full pipeline over one parsed module.
#[instrument(level = "debug", skip_all, fields(module = %ast.source_name))]
pub fn compile_module(
    ast: &ModuleAst,
    options: &CompileOptions,
    registry: &TransformRegistry,
) -> Result<CompileOutput, CompileError> {
    let mut module = lower_module(ast, &options.lower_options())?;
    build_all_cfgs(&mut module);

    let report = check::validate(&module);
    if !report.ok() {
        return Err(CompileError::Invalid { report });
    }

    let stats = registry.run(&mut module)?;
    if stats.changed {
        debug!("transforms changed the module; rebuilding cfgs");
        build_all_cfgs(&mut module);
        let report = check::validate(&module);
        if !report.ok() {
            return Err(CompileError::Invalid { report });
        }
    }
    // Transforms may grow the module past the host's budget; a module over
    // budget is discarded, never emitted.
    if let Some(budget) = options.node_budget {
        if module.nodes.len() > budget {
            return Err(CompileError::BudgetExceeded {
                nodes: module.nodes.len(),
                budget,
            });
        }
    }

    let mut emitted = BTreeMap::new();
    for backend_id in &options.backends {
        let backend =
            backend_for(backend_id).ok_or_else(|| CompileError::UnknownBackend {
                id: backend_id.clone(),
            })?;
        let output = backend.emit(&module)?;
        emitted.insert(backend_id.clone(), output);
    }

    info!(
        module = %module.id,
        backends = emitted.len(),
        nodes = module.nodes.len(),
        "module compiled"
    );
    Ok(CompileOutput {
        module,
        emitted,
        stats,
    })
}

/// Convenience entry for hosts that persist parser output: loads a JSON
/// AST from disk and compiles it.
pub fn compile_path(
    path: impl AsRef<Path>,
    options: &CompileOptions,
    registry: &TransformRegistry,
) -> anyhow::Result<CompileOutput> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading ast from {}", path.display()))?;
    let ast: ModuleAst = serde_json::from_str(&text)
        .with_context(|| format!("parsing ast json from {}", path.display()))?;
    compile_module(&ast, options, registry)
        .with_context(|| format!("compiling module {:?}", ast.source_name))
}

/// Installs the env-filter subscriber. Call once, from the host.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
