//! Primary backend: a table/metatable-based, coroutine-capable target.
//! Classes become prototype tables with an explicit inheritance link,
//! `try/catch/finally` becomes a protected call with a completion sentinel,
//! and `async`/`await` map onto coroutines created at function entry.
//!
//! Destructuring is fully expanded upstream; this backend only ever sees
//! sequential bindings.

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::ast::expressions::{BinaryOp, LiteralValue, LogicalOp, UnaryOp};
use crate::ir::{
    Arg, IrModule, IterationMode, KeyRef, MemberKind, NodeId, NodeKind, RuntimeHelper,
    TemplateChunk, TypeDeclNode,
};

use super::{
    Backend, CodegenError, EmittedModule, SourceMap, SourceMapEntry, Writer, escape_string,
    format_number,
};

pub struct LuaBackend;

impl Backend for LuaBackend {
    fn id(&self) -> &'static str {
        "lua"
    }

    #[instrument(level = "debug", skip_all, fields(module = %module.id))]
    fn emit(&self, module: &IrModule) -> Result<EmittedModule, CodegenError> {
        // First pass discovers which prelude helpers the module needs, so
        // the final text carries them up front and only when used.
        let mut scout = LuaEmitter::new(module);
        scout.emit_module_body()?;
        let prelude = scout.prelude;

        let mut emitter = LuaEmitter::new(module);
        emitter.w.line(format!("-- module: {}", module.id));
        for directive in &module.directives {
            emitter.w.line(format!("-- directive: {directive}"));
        }
        emitter.emit_prelude(&prelude);
        emitter.emit_module_body()?;
        debug!("lua emission complete");
        Ok(EmittedModule {
            backend: self.id().to_string(),
            code: emitter.w.finish(),
            source_map: Some(emitter.map),
        })
    }
}

/// Which prelude helpers the module uses. Emission order is fixed.
#[derive(Debug, Clone, Copy, Default)]
struct PreludeUse {
    to_str: bool,
    add: bool,
    at: bool,
    slice: bool,
    omit: bool,
}

struct LoopInfo {
    label: Option<String>,
    index: usize,
    /// Protected depth when the loop was entered; a transfer from deeper
    /// inside a `pcall` closure must travel as a completion value.
    protected_at: usize,
    /// Switch frames take a native `break` but no `continue`.
    is_loop: bool,
}

struct LuaEmitter<'a> {
    module: &'a IrModule,
    w: Writer,
    map: SourceMap,
    prelude: PreludeUse,
    loops: Vec<LoopInfo>,
    /// Depth of enclosing `pcall` closures.
    protected: usize,
    /// Deterministic counter for synthesized names (`__ok3`, `__d7`, loop
    /// labels).
    aux: usize,
}

impl<'a> LuaEmitter<'a> {
    fn new(module: &'a IrModule) -> Self {
        Self {
            module,
            w: Writer::new(),
            map: SourceMap::default(),
            prelude: PreludeUse::default(),
            loops: Vec::new(),
            protected: 0,
            aux: 0,
        }
    }

    fn fresh_aux(&mut self) -> usize {
        let n = self.aux;
        self.aux += 1;
        n
    }

    fn emit_prelude(&mut self, prelude: &PreludeUse) {
        let any = prelude.to_str || prelude.add || prelude.at || prelude.slice || prelude.omit;
        if prelude.to_str || prelude.add {
            self.w.line("local function __tostr(v)");
            self.w.indent();
            self.w.line("if v == nil then return \"nil\" end");
            self.w.line("return tostring(v)");
            self.w.dedent();
            self.w.line("end");
        }
        if prelude.add {
            self.w.line("local function __add(a, b)");
            self.w.indent();
            self.w
                .line("if type(a) == \"string\" or type(b) == \"string\" then");
            self.w.indent();
            self.w.line("return __tostr(a) .. __tostr(b)");
            self.w.dedent();
            self.w.line("end");
            self.w.line("return a + b");
            self.w.dedent();
            self.w.line("end");
        }
        if prelude.at {
            self.w.line("local function __at(t, i)");
            self.w.indent();
            self.w.line("return t[i + 1]");
            self.w.dedent();
            self.w.line("end");
        }
        if prelude.slice {
            self.w.line("local function __slice(t, i)");
            self.w.indent();
            self.w.line("local out = {}");
            self.w.line("for k = i + 1, #t do");
            self.w.indent();
            self.w.line("out[#out + 1] = t[k]");
            self.w.dedent();
            self.w.line("end");
            self.w.line("return out");
            self.w.dedent();
            self.w.line("end");
        }
        if prelude.omit {
            self.w.line("local function __omit(t, ...)");
            self.w.indent();
            self.w.line("local skip = {}");
            self.w.line("for _, k in ipairs({...}) do skip[k] = true end");
            self.w.line("local out = {}");
            self.w.line("for k, v in pairs(t) do");
            self.w.indent();
            self.w.line("if not skip[k] then out[k] = v end");
            self.w.dedent();
            self.w.line("end");
            self.w.line("return out");
            self.w.dedent();
            self.w.line("end");
        }
        if any {
            self.w.blank();
        }
    }

    fn emit_module_body(&mut self) -> Result<(), CodegenError> {
        for &id in &self.module.body {
            self.stmt(id)?;
        }
        Ok(())
    }

    fn unsupported(&self, id: NodeId) -> CodegenError {
        CodegenError::UnsupportedNode {
            kind: self.module.node(id).kind.name(),
            backend: "lua",
            node: id,
        }
    }

    // ------------------------------------------------------------------
    // statements

    fn stmt(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let node = self.module.node(id).clone();
        self.map.entries.push(SourceMapEntry {
            generated_line: self.w.next_line(),
            span: node.span,
        });
        match &node.kind {
            NodeKind::Binding { name, init, .. } => {
                match init {
                    Some(init) => {
                        let value = self.expr(*init)?;
                        self.w.line(format!("local {name} = {value}"));
                    }
                    None => self.w.line(format!("local {name}")),
                }
                Ok(())
            }
            NodeKind::Function(func) => {
                let Some(name) = func.name.clone() else {
                    let value = self.expr(id)?;
                    self.w.line(format!("local _ = {value}"));
                    return Ok(());
                };
                self.emit_function_decl(&format!("local function {name}"), id)
            }
            NodeKind::TypeDeclaration(decl) => self.emit_type_declaration(&decl.clone()),
            NodeKind::ExpressionStmt { expr } => {
                let inner = self.module.node(*expr).kind.clone();
                match inner {
                    NodeKind::Assign { target, value } => {
                        let target = self.expr(target)?;
                        let value = self.expr(value)?;
                        self.w.line(format!("{target} = {value}"));
                    }
                    NodeKind::Call { .. } | NodeKind::New { .. } | NodeKind::Await { .. } => {
                        let text = self.expr(*expr)?;
                        self.w.line(text);
                    }
                    _ => {
                        let text = self.expr(*expr)?;
                        self.w.line(format!("local _ = {text}"));
                    }
                }
                Ok(())
            }
            NodeKind::Return { value } => {
                let value = value.map(|v| self.expr(v)).transpose()?;
                self.emit_return(value);
                Ok(())
            }
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let condition = self.expr(*condition)?;
                self.w.line(format!("if {condition} then"));
                self.w.indent();
                self.block_stmts(*then_block)?;
                self.w.dedent();
                if let Some(else_block) = else_block {
                    self.w.line("else");
                    self.w.indent();
                    self.block_stmts(*else_block)?;
                    self.w.dedent();
                }
                self.w.line("end");
                Ok(())
            }
            NodeKind::Block { label, body } => {
                self.w.line("do");
                self.w.indent();
                if let Some(label) = label {
                    self.loops.push(LoopInfo {
                        label: Some(label.clone()),
                        index: 0,
                        protected_at: self.protected,
                        is_loop: false,
                    });
                }
                for &stmt in body.iter() {
                    self.stmt(stmt)?;
                }
                if label.is_some() {
                    self.loops.pop();
                }
                self.w.dedent();
                self.w.line("end");
                if let Some(label) = label {
                    self.w.line(format!("::__brk_{label}::"));
                }
                Ok(())
            }
            NodeKind::Loop {
                label,
                condition,
                body,
                check_before,
            } => self.emit_loop(label.clone(), *condition, *body, *check_before),
            NodeKind::IteratorLoop {
                label,
                mode,
                binding,
                source,
                body,
            } => self.emit_iterator_loop(label.clone(), *mode, binding.clone(), *source, *body),
            NodeKind::Break { label } => {
                self.emit_break(label.clone());
                Ok(())
            }
            NodeKind::Continue { label } => {
                self.emit_continue(label.clone());
                Ok(())
            }
            NodeKind::Try {
                block,
                handler_param,
                handler,
                finalizer,
            } => self.emit_try(*block, handler_param.clone(), *handler, *finalizer),
            NodeKind::Switch { discriminant, .. } => self.emit_switch(*discriminant, &node.kind),
            NodeKind::Throw { value } => {
                let value = self.expr(*value)?;
                self.w.line(format!("error({value})"));
                Ok(())
            }
            // Everything else is an expression and reaches a statement
            // position only wrapped in ExpressionStmt.
            _ => Err(self.unsupported(id)),
        }
    }

    fn block_stmts(&mut self, block: NodeId) -> Result<(), CodegenError> {
        match self.module.node(block).kind.clone() {
            NodeKind::Block { body, .. } => {
                for stmt in body {
                    self.stmt(stmt)?;
                }
                Ok(())
            }
            _ => self.stmt(block),
        }
    }

    /// `return` travels through an enclosing `pcall` closure as a
    /// completion value; the dispatcher after the protected call re-issues
    /// it.
    fn emit_return(&mut self, value: Option<String>) {
        if self.protected == 0 {
            match value {
                Some(value) => self.w.line(format!("return {value}")),
                None => self.w.line("return"),
            }
        } else {
            match value {
                Some(value) => self
                    .w
                    .line(format!("return {{ __k = \"return\", v = {value} }}")),
                None => self.w.line("return { __k = \"return\" }"),
            }
        }
    }

    fn emit_break(&mut self, label: Option<String>) {
        let target = self
            .loops
            .iter()
            .rev()
            .find(|l| match &label {
                Some(name) => l.label.as_deref() == Some(name.as_str()),
                // Unlabeled break targets the innermost loop or switch,
                // never a labeled block.
                None => l.is_loop || l.label.is_none(),
            })
            .expect("break target exists after validation");
        if self.protected > target.protected_at {
            match &label {
                Some(name) => self
                    .w
                    .line(format!("return {{ __k = \"break\", label = \"{name}\" }}")),
                None => self.w.line("return { __k = \"break\" }"),
            }
            return;
        }
        match label {
            Some(name) => self.w.line(format!("goto __brk_{name}")),
            None => self.w.line("break"),
        }
    }

    fn emit_continue(&mut self, label: Option<String>) {
        let target = self
            .loops
            .iter()
            .rev()
            .find(|l| match &label {
                Some(name) => l.is_loop && l.label.as_deref() == Some(name.as_str()),
                None => l.is_loop,
            })
            .expect("continue target exists after validation");
        let index = target.index;
        if self.protected > target.protected_at {
            match &label {
                Some(name) => self
                    .w
                    .line(format!("return {{ __k = \"continue\", label = \"{name}\" }}")),
                None => self.w.line("return { __k = \"continue\" }"),
            }
            return;
        }
        self.w.line(format!("goto __cont_{index}"));
    }

    fn emit_loop(
        &mut self,
        label: Option<String>,
        condition: NodeId,
        body: NodeId,
        check_before: bool,
    ) -> Result<(), CodegenError> {
        let index = self.fresh_aux();
        let condition_text = self.expr(condition)?;
        if check_before {
            self.w.line(format!("while {condition_text} do"));
        } else {
            self.w.line("repeat");
        }
        self.w.indent();
        self.loops.push(LoopInfo {
            label: label.clone(),
            index,
            protected_at: self.protected,
            is_loop: true,
        });
        self.block_stmts(body)?;
        self.loops.pop();
        self.w.line(format!("::__cont_{index}::"));
        self.w.dedent();
        if check_before {
            self.w.line("end");
        } else {
            self.w.line(format!("until not ({condition_text})"));
        }
        if let Some(label) = label {
            self.w.line(format!("::__brk_{label}::"));
        }
        Ok(())
    }

    /// The canonical iterator loop maps to native iteration: values via
    /// `ipairs`, keys via `pairs`.
    fn emit_iterator_loop(
        &mut self,
        label: Option<String>,
        mode: IterationMode,
        binding: String,
        source: NodeId,
        body: NodeId,
    ) -> Result<(), CodegenError> {
        let index = self.fresh_aux();
        let source_text = self.expr(source)?;
        match mode {
            IterationMode::Values => self
                .w
                .line(format!("for _, {binding} in ipairs({source_text}) do")),
            IterationMode::Keys => self
                .w
                .line(format!("for {binding} in pairs({source_text}) do")),
        }
        self.w.indent();
        self.loops.push(LoopInfo {
            label: label.clone(),
            index,
            protected_at: self.protected,
            is_loop: true,
        });
        self.block_stmts(body)?;
        self.loops.pop();
        self.w.line(format!("::__cont_{index}::"));
        self.w.dedent();
        self.w.line("end");
        if let Some(label) = label {
            self.w.line(format!("::__brk_{label}::"));
        }
        Ok(())
    }

    /// The protected-call mapping. The handler (if any) runs first, then
    /// the finalizer exactly once on every path, then the completion
    /// (return, break or continue captured inside the closure) is
    /// re-dispatched. An unhandled error re-raises after the finalizer.
    fn emit_try(
        &mut self,
        block: NodeId,
        handler_param: Option<String>,
        handler: Option<NodeId>,
        finalizer: Option<NodeId>,
    ) -> Result<(), CodegenError> {
        let n = self.fresh_aux();
        self.w
            .line(format!("local __ok{n}, __cmp{n} = pcall(function()"));
        self.w.indent();
        self.protected += 1;
        self.block_stmts(block)?;
        self.protected -= 1;
        self.w.dedent();
        self.w.line("end)");

        if let Some(handler) = handler {
            self.w.line(format!("if not __ok{n} then"));
            self.w.indent();
            let param = handler_param.unwrap_or_else(|| "_".to_string());
            self.w.line(format!("local {param} = __cmp{n}"));
            self.block_stmts(handler)?;
            self.w.dedent();
            self.w.line("end");
        }

        if let Some(finalizer) = finalizer {
            self.block_stmts(finalizer)?;
        }

        let is_completion = format!("__ok{n} and type(__cmp{n}) == \"table\"");
        self.w
            .line(format!("if {is_completion} and __cmp{n}.__k == \"return\" then"));
        self.w.indent();
        self.emit_return(Some(format!("__cmp{n}.v")));
        self.w.dedent();
        self.w.line("end");

        if self.loops.iter().any(|l| l.is_loop || l.label.is_some()) {
            // Labeled transfers dispatch by name; the labels are statically
            // known from the enclosing loop stack.
            let labeled: Vec<(String, usize)> = self
                .loops
                .iter()
                .filter(|l| l.protected_at <= self.protected)
                .filter_map(|l| l.label.clone().map(|name| (name, l.index)))
                .collect();
            for (name, index) in &labeled {
                self.w.line(format!(
                    "if {is_completion} and __cmp{n}.__k == \"break\" and __cmp{n}.label == \"{name}\" then goto __brk_{name} end"
                ));
                self.w.line(format!(
                    "if {is_completion} and __cmp{n}.__k == \"continue\" and __cmp{n}.label == \"{name}\" then goto __cont_{index} end"
                ));
            }
            if let Some(innermost) = self.loops.iter().rev().find(|l| l.is_loop) {
                let index = innermost.index;
                self.w.line(format!(
                    "if {is_completion} and __cmp{n}.__k == \"break\" and __cmp{n}.label == nil then break end"
                ));
                self.w.line(format!(
                    "if {is_completion} and __cmp{n}.__k == \"continue\" and __cmp{n}.label == nil then goto __cont_{index} end"
                ));
            }
        }

        if handler.is_none() {
            self.w
                .line(format!("if not __ok{n} then error(__cmp{n}) end"));
        }
        Ok(())
    }

    fn emit_switch(
        &mut self,
        discriminant: NodeId,
        kind: &NodeKind,
    ) -> Result<(), CodegenError> {
        let NodeKind::Switch { cases, .. } = kind.clone() else {
            unreachable!()
        };
        let n = self.fresh_aux();
        let discriminant_text = self.expr(discriminant)?;
        // `repeat ... until true` gives `break` a native target, so case
        // bodies exit the switch the same way loops exit.
        self.w.line("repeat");
        self.w.indent();
        self.w
            .line(format!("local __d{n} = {discriminant_text}"));
        self.w.line(format!("local __m{n} = false"));
        self.loops.push(LoopInfo {
            label: None,
            index: n,
            protected_at: self.protected,
            is_loop: false,
        });
        for case in cases.iter().filter(|c| c.test.is_some()) {
            let test = self.expr(case.test.expect("filtered"))?;
            self.w
                .line(format!("if __m{n} or __d{n} == {test} then"));
            self.w.indent();
            self.w.line(format!("__m{n} = true"));
            for &stmt in &case.body {
                self.stmt(stmt)?;
            }
            self.w.dedent();
            self.w.line("end");
        }
        if let Some(default) = cases.iter().find(|c| c.test.is_none()) {
            self.w.line(format!("if not __m{n} then"));
            self.w.indent();
            for &stmt in &default.body {
                self.stmt(stmt)?;
            }
            self.w.dedent();
            self.w.line("end");
        }
        self.loops.pop();
        self.w.dedent();
        self.w.line("until true");
        Ok(())
    }

    /// Methods carry the implicit receiver (`:` definitions); statics bind
    /// with `.`; getters/setters use the `__get_`/`__set_` convention; the
    /// inheritance link resolves the superclass by name at this point, not
    /// during lowering.
    fn emit_type_declaration(&mut self, decl: &TypeDeclNode) -> Result<(), CodegenError> {
        let name = &decl.name;
        self.w.line(format!("local {name} = {{}}"));
        self.w.line(format!("{name}.__index = {name}"));
        if let Some(superclass) = &decl.superclass {
            self.w.line(format!(
                "setmetatable({name}, {{ __index = {superclass} }})"
            ));
        }

        let instance_fields: Vec<_> = decl
            .members
            .iter()
            .filter(|m| m.kind == MemberKind::Field && !m.is_static)
            .collect();
        self.w.line(format!("function {name}.new(...)"));
        self.w.indent();
        self.w
            .line(format!("local self = setmetatable({{}}, {name})"));
        for field in &instance_fields {
            let value = self.expr(field.value)?;
            self.w.line(format!("self.{} = {}", field.name, value));
        }
        self.w.line(format!(
            "if {name}.constructor then {name}.constructor(self, ...) end"
        ));
        self.w.line("return self");
        self.w.dedent();
        self.w.line("end");

        for member in &decl.members {
            match member.kind {
                MemberKind::Field => {
                    if member.is_static {
                        let value = self.expr(member.value)?;
                        self.w.line(format!("{name}.{} = {}", member.name, value));
                    }
                }
                MemberKind::Method => {
                    let separator = if member.is_static { "." } else { ":" };
                    self.emit_function_decl(
                        &format!("function {name}{separator}{}", member.name),
                        member.value,
                    )?;
                }
                MemberKind::Getter => {
                    self.emit_function_decl(
                        &format!("function {name}:__get_{}", member.name),
                        member.value,
                    )?;
                }
                MemberKind::Setter => {
                    self.emit_function_decl(
                        &format!("function {name}:__set_{}", member.name),
                        member.value,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Emits `<head>(params)` + body + `end`. Async functions create their
    /// coroutine at entry; generators wrap the body so each call returns a
    /// fresh resumable iterator.
    fn emit_function_decl(&mut self, head: &str, func_id: NodeId) -> Result<(), CodegenError> {
        let NodeKind::Function(func) = self.module.node(func_id).kind.clone() else {
            return Err(self.unsupported(func_id));
        };
        let params = func.params.iter().join(", ");
        self.w.line(format!("{head}({params})"));
        self.w.indent();

        let outer_loops = std::mem::take(&mut self.loops);
        let outer_protected = std::mem::replace(&mut self.protected, 0);

        if func.is_async {
            self.w.line("local __co = coroutine.create(function()");
            self.w.indent();
        } else if func.is_generator {
            self.w.line("return coroutine.wrap(function()");
            self.w.indent();
        }
        for &stmt in &func.body {
            self.stmt(stmt)?;
        }
        if func.is_async {
            self.w.dedent();
            self.w.line("end)");
            self.w.line("return __co");
        } else if func.is_generator {
            self.w.dedent();
            self.w.line("end)");
        }

        self.loops = outer_loops;
        self.protected = outer_protected;

        self.w.dedent();
        self.w.line("end");
        Ok(())
    }

    // ------------------------------------------------------------------
    // expressions

    fn expr(&mut self, id: NodeId) -> Result<String, CodegenError> {
        let node = self.module.node(id).clone();
        match &node.kind {
            NodeKind::Literal { value } => Ok(match value {
                LiteralValue::Null | LiteralValue::Undefined => "nil".to_string(),
                LiteralValue::Bool(b) => b.to_string(),
                LiteralValue::Number(n) => format_number(*n),
                LiteralValue::String(s) => format!("\"{}\"", escape_string(s)),
            }),
            NodeKind::NameRef { name, .. } => Ok(name.clone()),
            NodeKind::This => Ok("self".to_string()),
            NodeKind::ArrayLit { elements } => {
                let parts = elements
                    .iter()
                    .map(|element| match element {
                        Arg::Value(id) => self.expr(*id),
                        Arg::Spread(id) => Ok(format!("table.unpack({})", self.expr(*id)?)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{{ {} }}", parts.iter().join(", ")))
            }
            NodeKind::ObjectLit { properties } => {
                let parts = properties
                    .iter()
                    .map(|entry| {
                        let value = self.expr(entry.value)?;
                        Ok(match &entry.key {
                            KeyRef::Named(name) if is_lua_ident(name) => {
                                format!("{name} = {value}")
                            }
                            KeyRef::Named(name) => {
                                format!("[\"{}\"] = {value}", escape_string(name))
                            }
                            KeyRef::Computed(key) => {
                                format!("[{}] = {value}", self.expr(*key)?)
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, CodegenError>>()?;
                Ok(format!("{{ {} }}", parts.iter().join(", ")))
            }
            NodeKind::Template { parts } => {
                self.prelude.to_str = true;
                let rendered = parts
                    .iter()
                    .map(|part| match part {
                        TemplateChunk::Lit(text) => {
                            Ok(format!("\"{}\"", escape_string(text)))
                        }
                        TemplateChunk::Expr(id) => Ok(format!("__tostr({})", self.expr(*id)?)),
                    })
                    .collect::<Result<Vec<_>, CodegenError>>()?;
                if rendered.is_empty() {
                    Ok("\"\"".to_string())
                } else {
                    Ok(format!("({})", rendered.iter().join(" .. ")))
                }
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.expr(*operand)?;
                Ok(match op {
                    UnaryOp::Not => format!("(not {operand})"),
                    UnaryOp::Neg => format!("(-{operand})"),
                    UnaryOp::TypeOf => format!("type({operand})"),
                })
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(*lhs)?;
                let rhs = self.expr(*rhs)?;
                Ok(match op {
                    BinaryOp::Add => {
                        self.prelude.add = true;
                        self.prelude.to_str = true;
                        format!("__add({lhs}, {rhs})")
                    }
                    BinaryOp::Sub => format!("({lhs} - {rhs})"),
                    BinaryOp::Mul => format!("({lhs} * {rhs})"),
                    BinaryOp::Div => format!("({lhs} / {rhs})"),
                    BinaryOp::Mod => format!("({lhs} % {rhs})"),
                    BinaryOp::Eq | BinaryOp::StrictEq => format!("({lhs} == {rhs})"),
                    BinaryOp::Ne | BinaryOp::StrictNe => format!("({lhs} ~= {rhs})"),
                    BinaryOp::Lt => format!("({lhs} < {rhs})"),
                    BinaryOp::Le => format!("({lhs} <= {rhs})"),
                    BinaryOp::Gt => format!("({lhs} > {rhs})"),
                    BinaryOp::Ge => format!("({lhs} >= {rhs})"),
                })
            }
            NodeKind::Logical { op, lhs, rhs } => {
                let lhs = self.expr(*lhs)?;
                let rhs = self.expr(*rhs)?;
                Ok(match op {
                    LogicalOp::And => format!("({lhs} and {rhs})"),
                    LogicalOp::Or => format!("({lhs} or {rhs})"),
                    LogicalOp::Coalesce => format!(
                        "(function() local __v = {lhs} if __v ~= nil then return __v end return {rhs} end)()"
                    ),
                })
            }
            NodeKind::Assign { target, value } => {
                let target = self.expr(*target)?;
                let value = self.expr(*value)?;
                // Assignment in expression position; statement position is
                // special-cased in `stmt`.
                Ok(format!(
                    "(function() {target} = {value} return {target} end)()"
                ))
            }
            NodeKind::Conditional {
                condition,
                consequent,
                alternate,
            } => {
                let condition = self.expr(*condition)?;
                let consequent = self.expr(*consequent)?;
                let alternate = self.expr(*alternate)?;
                Ok(format!(
                    "(function() if {condition} then return {consequent} end return {alternate} end)()"
                ))
            }
            NodeKind::Call { callee, args } => {
                let args_text = self.arguments(args)?;
                // A call through a named member carries the implicit
                // receiver.
                let callee_kind = self.module.node(*callee).kind.clone();
                if let NodeKind::Member {
                    object,
                    key: KeyRef::Named(name),
                } = &callee_kind
                {
                    if is_lua_ident(name) {
                        let object_text = self.expr(*object)?;
                        return Ok(format!("{object_text}:{name}({args_text})"));
                    }
                }
                let callee = self.expr(*callee)?;
                Ok(format!("{callee}({args_text})"))
            }
            NodeKind::New { callee, args } => {
                let callee = self.expr(*callee)?;
                let args_text = self.arguments(args)?;
                Ok(format!("{callee}.new({args_text})"))
            }
            NodeKind::Member { object, key } => {
                let object = self.expr(*object)?;
                Ok(match key {
                    KeyRef::Named(name) if is_lua_ident(name) => format!("{object}.{name}"),
                    KeyRef::Named(name) => {
                        format!("{object}[\"{}\"]", escape_string(name))
                    }
                    KeyRef::Computed(id) => format!("{object}[{}]", self.expr(*id)?),
                })
            }
            NodeKind::Await { argument } => {
                let argument = self.expr(*argument)?;
                Ok(format!("coroutine.yield({argument})"))
            }
            NodeKind::Yield { argument, delegate } => {
                let argument = match argument {
                    Some(id) => self.expr(*id)?,
                    None => "nil".to_string(),
                };
                if *delegate {
                    Ok(format!(
                        "(function() for __v in {argument} do coroutine.yield(__v) end end)()"
                    ))
                } else {
                    Ok(format!("coroutine.yield({argument})"))
                }
            }
            NodeKind::RuntimeCall { helper, args } => {
                let rendered = args
                    .iter()
                    .map(|id| self.expr(*id))
                    .collect::<Result<Vec<_>, _>>()?;
                let text = rendered.iter().join(", ");
                Ok(match helper {
                    RuntimeHelper::At => {
                        self.prelude.at = true;
                        format!("__at({text})")
                    }
                    RuntimeHelper::SliceFrom => {
                        self.prelude.slice = true;
                        format!("__slice({text})")
                    }
                    RuntimeHelper::OmitKeys => {
                        self.prelude.omit = true;
                        format!("__omit({text})")
                    }
                    RuntimeHelper::ToStr => {
                        self.prelude.to_str = true;
                        format!("__tostr({text})")
                    }
                })
            }
            NodeKind::Function(func) => {
                // Function expression: emit as an immediately-usable value.
                let params = func.params.iter().join(", ");
                let mut inner = LuaEmitter::new(self.module);
                inner.aux = self.aux;
                let body: Result<(), CodegenError> = (|| {
                    for &stmt in &func.body {
                        inner.stmt(stmt)?;
                    }
                    Ok(())
                })();
                body?;
                self.aux = inner.aux;
                self.prelude.to_str |= inner.prelude.to_str;
                self.prelude.add |= inner.prelude.add;
                self.prelude.at |= inner.prelude.at;
                self.prelude.slice |= inner.prelude.slice;
                self.prelude.omit |= inner.prelude.omit;
                let inner_text = inner.w.finish();
                let body_text = inner_text
                    .lines()
                    .map(|l| format!("  {l}"))
                    .join("\n");
                if func.is_generator {
                    Ok(format!(
                        "function({params})\n  return coroutine.wrap(function()\n{body_text}\n  end)\nend"
                    ))
                } else if func.is_async {
                    Ok(format!(
                        "function({params})\n  local __co = coroutine.create(function()\n{body_text}\n  end)\n  return __co\nend"
                    ))
                } else {
                    Ok(format!("function({params})\n{body_text}\nend"))
                }
            }
            _ => Err(self.unsupported(id)),
        }
    }

    fn arguments(&mut self, args: &[Arg]) -> Result<String, CodegenError> {
        let parts = args
            .iter()
            .map(|arg| match arg {
                Arg::Value(id) => self.expr(*id),
                Arg::Spread(id) => Ok(format!("table.unpack({})", self.expr(*id)?)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.iter().join(", "))
    }
}

const LUA_RESERVED: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

fn is_lua_ident(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    head_ok && tail_ok && !LUA_RESERVED.contains(&name)
}
