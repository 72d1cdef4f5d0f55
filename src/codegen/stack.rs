//! Secondary backend: a stack-machine listing. Consumes the same IR as the
//! primary backend and must preserve identical observable behavior
//! (evaluation order, error propagation) under a different instruction
//! encoding. Generators are outside this target's instruction set: a
//! two-way resume channel has no encoding here, so `Yield` raises
//! `UnsupportedNode` instead of silently diverging.

use tracing::{debug, instrument};

use crate::ast::expressions::{BinaryOp, LiteralValue, LogicalOp, UnaryOp};
use crate::ir::{
    Arg, IrModule, IterationMode, KeyRef, MemberKind, NodeId, NodeKind, RuntimeHelper,
    TemplateChunk,
};

use super::{Backend, CodegenError, EmittedModule, Writer, escape_string, format_number};

pub struct StackBackend;

impl Backend for StackBackend {
    fn id(&self) -> &'static str {
        "stack"
    }

    #[instrument(level = "debug", skip_all, fields(module = %module.id))]
    fn emit(&self, module: &IrModule) -> Result<EmittedModule, CodegenError> {
        let mut emitter = StackEmitter {
            module,
            w: Writer::new(),
            labels: 0,
            loops: Vec::new(),
            functions: 0,
        };
        emitter.w.line(format!(".module {}", module.id));
        for directive in &module.directives {
            emitter.w.line(format!(".directive {directive}"));
        }
        emitter.w.line(".entry __main__");
        emitter.w.line(".func __main__ nparams=0");
        emitter.w.indent();
        for &id in &module.body {
            emitter.stmt(id)?;
        }
        emitter.w.line("RET_NIL");
        emitter.w.dedent();
        emitter.w.line(".endfunc");
        debug!("stack emission complete");
        Ok(EmittedModule {
            backend: self.id().to_string(),
            code: emitter.w.finish(),
            source_map: None,
        })
    }
}

struct LoopLabels {
    label: Option<String>,
    continue_label: String,
    break_label: String,
    is_loop: bool,
}

struct StackEmitter<'a> {
    module: &'a IrModule,
    w: Writer,
    labels: usize,
    loops: Vec<LoopLabels>,
    functions: usize,
}

impl StackEmitter<'_> {
    fn fresh_label(&mut self) -> String {
        let label = format!("L{}", self.labels);
        self.labels += 1;
        label
    }

    fn unsupported(&self, id: NodeId) -> CodegenError {
        CodegenError::UnsupportedNode {
            kind: self.module.node(id).kind.name(),
            backend: "stack",
            node: id,
        }
    }

    // ------------------------------------------------------------------
    // statements

    fn stmt(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let node = self.module.node(id).clone();
        match &node.kind {
            NodeKind::Binding { name, init, .. } => {
                self.w.line(format!("DECL {name}"));
                if let Some(init) = init {
                    self.push(*init)?;
                    self.w.line(format!("STORE {name}"));
                }
                Ok(())
            }
            NodeKind::Function(func) => {
                let name = func.name.clone();
                self.emit_function(id)?;
                if let Some(name) = name {
                    self.w.line(format!("DECL {name}"));
                    self.w.line(format!("STORE {name}"));
                } else {
                    self.w.line("POP");
                }
                Ok(())
            }
            NodeKind::TypeDeclaration(decl) => {
                let decl = decl.clone();
                match &decl.superclass {
                    Some(superclass) => {
                        self.w.line(format!("LOAD {superclass}"));
                        self.w
                            .line(format!("CLASS {} extends", decl.name));
                    }
                    None => self.w.line(format!("CLASS {}", decl.name)),
                }
                for member in &decl.members {
                    self.push(member.value)?;
                    let op = match member.kind {
                        MemberKind::Method => "METHOD",
                        MemberKind::Getter => "GETTER",
                        MemberKind::Setter => "SETTER",
                        MemberKind::Field => "FIELD",
                    };
                    let staticness = if member.is_static { " static" } else { "" };
                    self.w.line(format!("{op} {}{staticness}", member.name));
                }
                self.w.line(format!("DECL {}", decl.name));
                self.w.line(format!("STORE {}", decl.name));
                Ok(())
            }
            NodeKind::ExpressionStmt { expr } => {
                self.push(*expr)?;
                self.w.line("POP");
                Ok(())
            }
            NodeKind::Return { value } => {
                match value {
                    Some(value) => {
                        self.push(*value)?;
                        self.w.line("RET");
                    }
                    None => self.w.line("RET_NIL"),
                }
                Ok(())
            }
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let else_label = self.fresh_label();
                let end_label = self.fresh_label();
                self.push(*condition)?;
                self.w.line(format!("JMPF {else_label}"));
                self.block_stmts(*then_block)?;
                if let Some(else_block) = else_block {
                    self.w.line(format!("JMP {end_label}"));
                    self.w.line(format!("{else_label}:"));
                    self.block_stmts(*else_block)?;
                    self.w.line(format!("{end_label}:"));
                } else {
                    self.w.line(format!("{else_label}:"));
                }
                Ok(())
            }
            NodeKind::Block { label, body } => {
                let break_label = self.fresh_label();
                self.loops.push(LoopLabels {
                    label: label.clone(),
                    continue_label: break_label.clone(),
                    break_label: break_label.clone(),
                    is_loop: false,
                });
                for &stmt in body.iter() {
                    self.stmt(stmt)?;
                }
                self.loops.pop();
                self.w.line(format!("{break_label}:"));
                Ok(())
            }
            NodeKind::Loop {
                label,
                condition,
                body,
                check_before,
            } => {
                let head = self.fresh_label();
                let exit = self.fresh_label();
                self.loops.push(LoopLabels {
                    label: label.clone(),
                    continue_label: head.clone(),
                    break_label: exit.clone(),
                    is_loop: true,
                });
                self.w.line(format!("{head}:"));
                if *check_before {
                    self.push(*condition)?;
                    self.w.line(format!("JMPF {exit}"));
                    self.block_stmts(*body)?;
                    self.w.line(format!("JMP {head}"));
                } else {
                    self.block_stmts(*body)?;
                    self.push(*condition)?;
                    self.w.line(format!("JMPT {head}"));
                }
                self.loops.pop();
                self.w.line(format!("{exit}:"));
                Ok(())
            }
            NodeKind::IteratorLoop {
                label,
                mode,
                binding,
                source,
                body,
            } => {
                let head = self.fresh_label();
                let exit = self.fresh_label();
                self.push(*source)?;
                match mode {
                    IterationMode::Values => self.w.line("ITER_INIT values"),
                    IterationMode::Keys => self.w.line("ITER_INIT keys"),
                }
                self.w.line(format!("DECL {binding}"));
                self.loops.push(LoopLabels {
                    label: label.clone(),
                    continue_label: head.clone(),
                    break_label: exit.clone(),
                    is_loop: true,
                });
                self.w.line(format!("{head}:"));
                self.w.line(format!("ITER_NEXT {exit}"));
                self.w.line(format!("STORE {binding}"));
                self.block_stmts(*body)?;
                self.w.line(format!("JMP {head}"));
                self.loops.pop();
                self.w.line(format!("{exit}:"));
                self.w.line("ITER_END");
                Ok(())
            }
            NodeKind::Break { label } => {
                let target = self
                    .loops
                    .iter()
                    .rev()
                    .find(|l| match label {
                        Some(name) => l.label.as_deref() == Some(name.as_str()),
                        None => l.is_loop || l.label.is_none(),
                    })
                    .expect("break target exists after validation");
                self.w.line(format!("JMP {}", target.break_label));
                Ok(())
            }
            NodeKind::Continue { label } => {
                let target = self
                    .loops
                    .iter()
                    .rev()
                    .find(|l| match label {
                        Some(name) => l.is_loop && l.label.as_deref() == Some(name.as_str()),
                        None => l.is_loop,
                    })
                    .expect("continue target exists after validation");
                self.w.line(format!("JMP {}", target.continue_label));
                Ok(())
            }
            NodeKind::Try {
                block,
                handler_param,
                handler,
                finalizer,
            } => {
                let handler_label = self.fresh_label();
                let fin_label = self.fresh_label();
                self.w.line(format!("TRY_PUSH {handler_label}"));
                self.block_stmts(*block)?;
                self.w.line("TRY_POP");
                self.w.line(format!("JMP {fin_label}"));
                self.w.line(format!("{handler_label}:"));
                match handler {
                    Some(handler) => {
                        let param = handler_param.clone().unwrap_or_else(|| "_".to_string());
                        self.w.line(format!("DECL {param}"));
                        self.w.line(format!("STORE {param}"));
                        self.block_stmts(*handler)?;
                    }
                    None => {
                        // No handler: the finalizer still runs, then the
                        // error continues outward.
                        self.w.line("SET_RETHROW");
                    }
                }
                self.w.line(format!("{fin_label}:"));
                if let Some(finalizer) = finalizer {
                    self.block_stmts(*finalizer)?;
                }
                if handler.is_none() {
                    self.w.line("RETHROW_IF_SET");
                }
                Ok(())
            }
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                let cases = cases.clone();
                let exit = self.fresh_label();
                let case_labels: Vec<String> =
                    cases.iter().map(|_| self.fresh_label()).collect();
                self.push(*discriminant)?;
                for (case, case_label) in cases.iter().zip(&case_labels) {
                    if let Some(test) = case.test {
                        self.w.line("DUP");
                        self.push(test)?;
                        self.w.line("BINOP eq");
                        self.w.line(format!("JMPT {case_label}"));
                    }
                }
                // default matches only when nothing else did.
                let default_target = cases
                    .iter()
                    .position(|c| c.test.is_none())
                    .map(|i| case_labels[i].clone())
                    .unwrap_or_else(|| exit.clone());
                self.w.line(format!("JMP {default_target}"));
                self.loops.push(LoopLabels {
                    label: None,
                    continue_label: exit.clone(),
                    break_label: exit.clone(),
                    is_loop: false,
                });
                for (case, case_label) in cases.iter().zip(&case_labels) {
                    self.w.line(format!("{case_label}:"));
                    for &stmt in &case.body {
                        self.stmt(stmt)?;
                    }
                    // Fallthrough into the next case label is implicit.
                }
                self.loops.pop();
                self.w.line(format!("{exit}:"));
                self.w.line("POP");
                Ok(())
            }
            NodeKind::Throw { value } => {
                self.push(*value)?;
                self.w.line("THROW");
                Ok(())
            }
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

    // ------------------------------------------------------------------
    // expressions: every `push` leaves exactly one value on the stack

    fn push(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let node = self.module.node(id).clone();
        match &node.kind {
            NodeKind::Literal { value } => {
                match value {
                    LiteralValue::Null => self.w.line("PUSH_NULL"),
                    LiteralValue::Undefined => self.w.line("PUSH_UNDEF"),
                    LiteralValue::Bool(true) => self.w.line("PUSH_TRUE"),
                    LiteralValue::Bool(false) => self.w.line("PUSH_FALSE"),
                    LiteralValue::Number(n) => {
                        self.w.line(format!("PUSH_NUM {}", format_number(*n)));
                    }
                    LiteralValue::String(s) => {
                        self.w.line(format!("PUSH_STR \"{}\"", escape_string(s)));
                    }
                }
                Ok(())
            }
            NodeKind::NameRef { name, resolution } => {
                match resolution {
                    crate::ir::Resolution::Local => self.w.line(format!("LOAD {name}")),
                    crate::ir::Resolution::Global => {
                        self.w.line(format!("LOAD_GLOBAL {name}"));
                    }
                }
                Ok(())
            }
            NodeKind::This => {
                self.w.line("LOAD_THIS");
                Ok(())
            }
            NodeKind::ArrayLit { elements } => {
                self.w.line("ARR_NEW");
                for element in elements {
                    match element {
                        Arg::Value(id) => {
                            self.push(*id)?;
                            self.w.line("ARR_PUSH");
                        }
                        Arg::Spread(id) => {
                            self.push(*id)?;
                            self.w.line("ARR_SPREAD");
                        }
                    }
                }
                Ok(())
            }
            NodeKind::ObjectLit { properties } => {
                self.w.line("OBJ_NEW");
                for entry in properties {
                    self.push(entry.value)?;
                    match &entry.key {
                        KeyRef::Named(name) => {
                            self.w.line(format!("OBJ_SET \"{}\"", escape_string(name)));
                        }
                        KeyRef::Computed(key) => {
                            self.push(*key)?;
                            self.w.line("OBJ_SET_DYN");
                        }
                    }
                }
                Ok(())
            }
            NodeKind::Template { parts } => {
                self.w.line("PUSH_STR \"\"");
                for part in parts {
                    match part {
                        TemplateChunk::Lit(text) => {
                            self.w.line(format!("PUSH_STR \"{}\"", escape_string(text)));
                        }
                        TemplateChunk::Expr(id) => {
                            self.push(*id)?;
                            self.w.line("TO_STR");
                        }
                    }
                    self.w.line("CONCAT");
                }
                Ok(())
            }
            NodeKind::Unary { op, operand } => {
                self.push(*operand)?;
                let op = match op {
                    UnaryOp::Not => "not",
                    UnaryOp::Neg => "neg",
                    UnaryOp::TypeOf => "typeof",
                };
                self.w.line(format!("UNOP {op}"));
                Ok(())
            }
            NodeKind::Binary { op, lhs, rhs } => {
                self.push(*lhs)?;
                self.push(*rhs)?;
                self.w.line(format!("BINOP {}", binop_name(*op)));
                Ok(())
            }
            NodeKind::Logical { op, lhs, rhs } => {
                // Short-circuit: the right operand is evaluated only when
                // the left does not decide the result.
                let end = self.fresh_label();
                self.push(*lhs)?;
                self.w.line("DUP");
                match op {
                    LogicalOp::And => self.w.line(format!("JMPF {end}")),
                    LogicalOp::Or => self.w.line(format!("JMPT {end}")),
                    LogicalOp::Coalesce => self.w.line(format!("JMP_DEF {end}")),
                }
                self.w.line("POP");
                self.push(*rhs)?;
                self.w.line(format!("{end}:"));
                Ok(())
            }
            NodeKind::Assign { target, value } => {
                match self.module.node(*target).kind.clone() {
                    NodeKind::NameRef { name, .. } => {
                        self.push(*value)?;
                        self.w.line("DUP");
                        self.w.line(format!("STORE {name}"));
                    }
                    NodeKind::Member { object, key } => {
                        self.push(object)?;
                        self.push(*value)?;
                        match key {
                            KeyRef::Named(name) => {
                                self.w
                                    .line(format!("SETF \"{}\"", escape_string(&name)));
                            }
                            KeyRef::Computed(k) => {
                                self.push(k)?;
                                self.w.line("SETI");
                            }
                        }
                    }
                    _ => return Err(self.unsupported(*target)),
                }
                Ok(())
            }
            NodeKind::Conditional {
                condition,
                consequent,
                alternate,
            } => {
                let alt = self.fresh_label();
                let end = self.fresh_label();
                self.push(*condition)?;
                self.w.line(format!("JMPF {alt}"));
                self.push(*consequent)?;
                self.w.line(format!("JMP {end}"));
                self.w.line(format!("{alt}:"));
                self.push(*alternate)?;
                self.w.line(format!("{end}:"));
                Ok(())
            }
            NodeKind::Call { callee, args } => {
                // Evaluation order matches the primary backend: callee,
                // then arguments left to right.
                let callee_kind = self.module.node(*callee).kind.clone();
                if let NodeKind::Member {
                    object,
                    key: KeyRef::Named(name),
                } = &callee_kind
                {
                    self.push(*object)?;
                    self.w.line("DUP");
                    self.w.line(format!("GETF \"{}\"", escape_string(name)));
                    self.w.line("SWAP");
                    let argc = self.push_args(args)?;
                    self.w.line(format!("CALL_METHOD {argc}"));
                    return Ok(());
                }
                self.push(*callee)?;
                let argc = self.push_args(args)?;
                self.w.line(format!("CALL {argc}"));
                Ok(())
            }
            NodeKind::New { callee, args } => {
                self.push(*callee)?;
                let argc = self.push_args(args)?;
                self.w.line(format!("NEW {argc}"));
                Ok(())
            }
            NodeKind::Member { object, key } => {
                self.push(*object)?;
                match key {
                    KeyRef::Named(name) => {
                        self.w.line(format!("GETF \"{}\"", escape_string(name)));
                    }
                    KeyRef::Computed(k) => {
                        self.push(*k)?;
                        self.w.line("GETI");
                    }
                }
                Ok(())
            }
            NodeKind::Await { argument } => {
                self.push(*argument)?;
                self.w.line("SUSPEND");
                Ok(())
            }
            // Two-way generator resume has no encoding in this instruction
            // set.
            NodeKind::Yield { .. } => Err(self.unsupported(id)),
            NodeKind::RuntimeCall { helper, args } => {
                for &arg in args {
                    self.push(arg)?;
                }
                let name = match helper {
                    RuntimeHelper::At => "at",
                    RuntimeHelper::SliceFrom => "slice_from",
                    RuntimeHelper::OmitKeys => "omit_keys",
                    RuntimeHelper::ToStr => "to_str",
                };
                self.w.line(format!("HELPER {name} {}", args.len()));
                Ok(())
            }
            NodeKind::Function(_) => self.emit_function(id),
            _ => Err(self.unsupported(id)),
        }
    }

    fn push_args(&mut self, args: &[Arg]) -> Result<usize, CodegenError> {
        for arg in args {
            match arg {
                Arg::Value(id) => self.push(*id)?,
                Arg::Spread(id) => {
                    self.push(*id)?;
                    self.w.line("SPREAD");
                }
            }
        }
        Ok(args.len())
    }

    /// Emits a closure literal and leaves it on the stack. Async functions
    /// are flagged so the host creates them suspended.
    fn emit_function(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let NodeKind::Function(func) = self.module.node(id).kind.clone() else {
            return Err(self.unsupported(id));
        };
        if func.is_generator {
            return Err(self.unsupported(id));
        }
        let index = self.functions;
        self.functions += 1;
        let name = func
            .name
            .clone()
            .unwrap_or_else(|| format!("__anon{index}"));
        let mut flags = String::new();
        if func.is_async {
            flags.push_str(" async");
        }
        self.w.line(format!(
            ".closure {name} nparams={}{flags}",
            func.params.len()
        ));
        self.w.indent();
        for (slot, param) in func.params.iter().enumerate() {
            self.w.line(format!(".param {slot} {param}"));
        }
        let outer_loops = std::mem::take(&mut self.loops);
        for &stmt in &func.body {
            self.stmt(stmt)?;
        }
        self.loops = outer_loops;
        self.w.line("RET_NIL");
        self.w.dedent();
        self.w.line(".endclosure");
        Ok(())
    }
}

fn binop_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::StrictEq => "seq",
        BinaryOp::StrictNe => "sne",
        BinaryOp::Lt => "lt",
        BinaryOp::Le => "le",
        BinaryOp::Gt => "gt",
        BinaryOp::Ge => "ge",
    }
}
