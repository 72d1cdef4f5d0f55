use tracing::{debug, instrument};

use crate::ast::ModuleAst;
use crate::ir::{Export, IrModule, NodeKind};

use super::statements::{bind_hoisted, lower_statement};
use super::{LowerCtx, errors::LoweringError};

/// Host-tunable knobs for one lowering run.
#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// First id handed out; fix it for byte-stable reproduction.
    pub id_seed: u64,
    /// Abort the module once this many nodes exist. `None` means unbounded.
    pub node_budget: Option<usize>,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            id_seed: 1,
            node_budget: None,
        }
    }
}

/// Converts one parsed module into IR. Aborts on the first error with no
/// partial IR; the returned module still needs CFGs and validation before
/// transforms or emission.
#[instrument(level = "debug", skip_all, fields(module = %ast.source_name))]
pub fn lower_module(ast: &ModuleAst, options: &LowerOptions) -> Result<IrModule, LoweringError> {
    let mut ctx = LowerCtx::new(ast.source_name.clone(), options);
    ctx.module.directives = ast.directives.clone();

    ctx.scopes.push();
    let result = (|| {
        bind_hoisted(&mut ctx, &ast.body);
        for stmt in &ast.body {
            let lowered = lower_statement(&mut ctx, stmt)?;
            ctx.module.body.extend(lowered);
        }
        resolve_exports(&mut ctx, ast)
    })();
    ctx.scopes.pop();
    result?;

    debug!(
        nodes = ctx.module.nodes.len(),
        captures = ctx.module.metadata.global_captures.len(),
        "module lowered"
    );
    Ok(ctx.module)
}

/// Maps each exported name to the module-level declaration that binds it.
fn resolve_exports(ctx: &mut LowerCtx, ast: &ModuleAst) -> Result<(), LoweringError> {
    for export in &ast.exports {
        let target = ctx.module.body.iter().copied().find(|id| {
            match &ctx.module.node(*id).kind {
                NodeKind::Binding { name, .. } => name == &export.name,
                NodeKind::Function(func) => func.name.as_deref() == Some(&export.name),
                NodeKind::TypeDeclaration(decl) => decl.name == export.name,
                _ => false,
            }
        });
        match target {
            Some(target) => ctx.module.exports.push(Export {
                name: export.name.clone(),
                target,
            }),
            None => {
                return Err(LoweringError::ExportNotFound {
                    name: export.name.clone(),
                    span: export.span,
                });
            }
        }
    }
    Ok(())
}
