//! Lowers the resolved AST onto the LFC stack machine.
//!
//! The machine has no frame pointer and no registers: a function's locals
//! live directly on the stack, addressed relative to the top. The
//! generator maintains one invariant throughout: at every statement
//! boundary the stack above the caller's frame holds exactly the
//! function's locals, slot 0 deepest, with nothing on top of them.
//! Expression lowering tracks the transient depth of pushed sub-results,
//! so a local with slot `s` out of `L` is always at address `L - s + depth`.
//!
//! Control flow is emitted against symbolic labels, resolved to 1-indexed
//! ROM addresses by a two-pass assembler.

pub mod isa;

use std::collections::HashMap;

use isa::Instruction;
use lflc_common::Span;
use lflc_parser::ast::*;
use lflc_sema::{signal_index, FnLocals, SemaResult, SIGNAL_COUNT};
use thiserror::Error;

pub const ENTRY_POINT: &str = "main";

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct LinkError {
    pub span: Option<Span>,
    pub message: String,
}

pub type LinkResult<T> = Result<T, LinkError>;

/// A symbolic jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Label(u32);

#[derive(Debug, Clone, Copy)]
enum Pseudo {
    /// A finished instruction.
    Op(Instruction),
    /// A control transfer whose target is still symbolic.
    Branch(BranchKind, Label),
    /// Label definition; occupies no ROM slot.
    Mark(Label),
}

#[derive(Debug, Clone, Copy)]
enum BranchKind {
    Jump,
    JumpNotIf,
    Call,
}

/// Compile a checked program into the final ROM instruction list.
pub fn compile(program: &Program, sema: &SemaResult) -> LinkResult<Vec<Instruction>> {
    let mut codegen = Codegen {
        sema,
        code: Vec::new(),
        next_label: 0,
        fn_labels: HashMap::new(),
    };
    codegen.emit_program(program)?;
    assemble(&codegen.code)
}

/// Human-readable listing: one instruction per line, prefixed with its
/// 1-based ROM index.
pub fn listing(rom: &[Instruction]) -> String {
    let mut out = String::new();
    for (idx, inst) in rom.iter().enumerate() {
        out.push_str(&format!("{}  {inst}\n", idx + 1));
    }
    out
}

struct Codegen<'a> {
    sema: &'a SemaResult,
    code: Vec<Pseudo>,
    next_label: u32,
    fn_labels: HashMap<String, Label>,
}

struct LoopLabels {
    head: Label,
    exit: Label,
}

/// Per-function emission state.
struct FnCtx<'a> {
    locals: &'a FnLocals,
    /// Transient values currently above the locals.
    depth: i32,
    loops: Vec<LoopLabels>,
}

impl<'a> Codegen<'a> {
    fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, ctx: &mut FnCtx, inst: Instruction) {
        ctx.depth += inst.stack_effect();
        self.code.push(Pseudo::Op(inst));
    }

    fn branch(&mut self, ctx: &mut FnCtx, kind: BranchKind, target: Label) {
        if matches!(kind, BranchKind::JumpNotIf) {
            ctx.depth -= 1; // the test value is popped
        }
        self.code.push(Pseudo::Branch(kind, target));
    }

    fn mark(&mut self, label: Label) {
        self.code.push(Pseudo::Mark(label));
    }

    fn emit_program(&mut self, program: &Program) -> LinkResult<()> {
        let main = self.sema.signatures.get(ENTRY_POINT).ok_or_else(|| LinkError {
            span: None,
            message: format!(
                "no entry point: define a void, zero-parameter function named `{ENTRY_POINT}`"
            ),
        })?;
        if main.returns_value {
            return Err(LinkError {
                span: Some(main.span),
                message: "the entry point cannot return a value".to_string(),
            });
        }
        if main.arity != 0 {
            return Err(LinkError {
                span: Some(main.span),
                message: "the entry point takes no parameters".to_string(),
            });
        }

        for function in &program.functions {
            let label = self.fresh_label();
            self.fn_labels.insert(function.name.clone(), label);
        }

        // The machine halts on any jump outside ROM, so the program is a
        // call to the entry point followed by a jump to address 0.
        let entry = self.fn_labels[ENTRY_POINT];
        self.code.push(Pseudo::Branch(BranchKind::Call, entry));
        self.code.push(Pseudo::Op(Instruction::Jump(0)));

        for function in &program.functions {
            self.mark(self.fn_labels[&function.name]);
            self.emit_function(function);
        }
        Ok(())
    }

    fn emit_function(&mut self, function: &Function) {
        let locals = self
            .sema
            .locals
            .get(&function.name)
            .expect("resolver should have recorded locals for every function");
        let mut ctx = FnCtx {
            locals,
            depth: 0,
            loops: Vec::new(),
        };

        // Arguments already occupy the parameter slots; materialise the
        // remaining locals so every slot exists at entry.
        for _ in function.params.len()..locals.count {
            self.code.push(Pseudo::Op(Instruction::Const(0)));
        }

        self.emit_block(&mut ctx, &function.body);

        // Value functions are guaranteed (by sema) to end on a return
        // statement; void functions get an implicit one.
        if !function.returns_value
            && !matches!(function.body.last(), Some(Statement::Return { .. }))
        {
            self.emit_return(&mut ctx, None);
        }
    }

    fn emit_block(&mut self, ctx: &mut FnCtx, block: &[Statement]) {
        for statement in block {
            self.emit_statement(ctx, statement);
        }
    }

    fn emit_statement(&mut self, ctx: &mut FnCtx, statement: &Statement) {
        match statement {
            Statement::Assign { name, expr, .. } => {
                self.emit_expr(ctx, expr);
                self.emit_store(ctx, name);
            }
            Statement::CompoundAssign { name, op, expr, .. } => {
                // `x op= e` lowers as `x = x op e`.
                self.emit_load(ctx, name);
                self.emit_expr(ctx, expr);
                self.emit(ctx, binary_inst(*op));
                self.emit_store(ctx, name);
            }
            Statement::Call { call, .. } => {
                self.emit_call(ctx, call);
            }
            Statement::If {
                arms, else_body, ..
            } => {
                let end = self.fresh_label();
                for arm in arms {
                    let next = self.fresh_label();
                    self.emit_expr(ctx, &arm.condition);
                    self.branch(ctx, BranchKind::JumpNotIf, next);
                    self.emit_block(ctx, &arm.body);
                    self.branch(ctx, BranchKind::Jump, end);
                    self.mark(next);
                }
                if let Some(else_body) = else_body {
                    self.emit_block(ctx, else_body);
                }
                self.mark(end);
            }
            Statement::While {
                condition, body, ..
            } => {
                let head = self.fresh_label();
                let exit = self.fresh_label();
                self.mark(head);
                self.emit_expr(ctx, condition);
                self.branch(ctx, BranchKind::JumpNotIf, exit);
                ctx.loops.push(LoopLabels { head, exit });
                self.emit_block(ctx, body);
                ctx.loops.pop();
                self.branch(ctx, BranchKind::Jump, head);
                self.mark(exit);
            }
            Statement::Return { value, .. } => self.emit_return(ctx, value.as_ref()),
            Statement::Break { .. } => {
                let exit = self
                    .innermost_loop(ctx)
                    .exit;
                self.branch(ctx, BranchKind::Jump, exit);
            }
            Statement::Continue { .. } => {
                let head = self
                    .innermost_loop(ctx)
                    .head;
                self.branch(ctx, BranchKind::Jump, head);
            }
        }
    }

    fn innermost_loop<'c>(&self, ctx: &'c FnCtx) -> &'c LoopLabels {
        ctx.loops
            .last()
            .expect("loop checks should reject break/continue outside a loop")
    }

    /// Leave the function. Locals never outlive the function, so the whole
    /// frame is discarded here: a value function collapses its locals from
    /// under the return value with repeated `SAVE 2`, a void function pops
    /// them.
    fn emit_return(&mut self, ctx: &mut FnCtx, value: Option<&Expr>) {
        match value {
            Some(expr) => {
                self.emit_expr(ctx, expr);
                for _ in 0..ctx.locals.count {
                    self.code.push(Pseudo::Op(Instruction::Save(2)));
                }
            }
            None => {
                for _ in 0..ctx.locals.count {
                    self.code.push(Pseudo::Op(Instruction::Pop));
                }
            }
        }
        self.code.push(Pseudo::Op(Instruction::Ret));
        ctx.depth = 0;
    }

    /// Every expression leaves exactly one new value on top of the stack.
    fn emit_expr(&mut self, ctx: &mut FnCtx, expr: &Expr) {
        match expr {
            Expr::IntLit { value, .. } => {
                self.emit(ctx, Instruction::Const(*value as i32));
            }
            Expr::Var { name, .. } => self.emit_load(ctx, name),
            Expr::Unary {
                op: UnOp::Not,
                operand,
                ..
            } => {
                self.emit_expr(ctx, operand);
                self.emit(ctx, Instruction::Not);
            }
            Expr::Unary {
                op: UnOp::Neg,
                operand,
                ..
            } => {
                // The ISA has no NEG: negation is 0 - x.
                self.emit(ctx, Instruction::Const(0));
                self.emit_expr(ctx, operand);
                self.emit(ctx, Instruction::Sub);
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                self.emit_expr(ctx, left);
                self.emit_expr(ctx, right);
                self.emit(ctx, binary_inst(*op));
            }
            Expr::Call(call) => self.emit_call(ctx, call),
        }
    }

    fn emit_call(&mut self, ctx: &mut FnCtx, call: &CallExpr) {
        for arg in &call.args {
            self.emit_expr(ctx, arg);
        }
        let target = *self
            .fn_labels
            .get(&call.name)
            .expect("call checks should reject unknown functions");
        self.branch(ctx, BranchKind::Call, target);

        // The callee collapses its own frame: the arguments are gone when
        // it returns, and a value-returning callee leaves its result on
        // top.
        let sig = &self.sema.signatures[&call.name];
        ctx.depth -= sig.arity as i32;
        if sig.returns_value {
            ctx.depth += 1;
        }
    }

    fn slot(&self, ctx: &FnCtx, name: &str) -> usize {
        *ctx.locals
            .slots
            .get(name)
            .expect("resolver should have allocated a slot for every local")
    }

    /// Stack address of local slot `s`: slot 0 is deepest, so it sits
    /// `count` below the statement-boundary top, plus whatever transient
    /// values are currently above the frame.
    fn local_address(&self, ctx: &FnCtx, slot: usize) -> i32 {
        ctx.locals.count as i32 - slot as i32 + ctx.depth
    }

    fn emit_load(&mut self, ctx: &mut FnCtx, name: &str) {
        let inst = match signal_index(name) {
            Some(k) => Instruction::Load(-(SIGNAL_COUNT + k)),
            None => Instruction::Load(self.local_address(ctx, self.slot(ctx, name))),
        };
        self.emit(ctx, inst);
    }

    /// Store the value on top of the stack. For a local the address counts
    /// the value itself, so the target slot is one further down than for a
    /// load.
    fn emit_store(&mut self, ctx: &mut FnCtx, name: &str) {
        let inst = match signal_index(name) {
            Some(k) => Instruction::Save(-k),
            None => Instruction::Save(self.local_address(ctx, self.slot(ctx, name))),
        };
        self.emit(ctx, inst);
    }
}

fn binary_inst(op: BinOp) -> Instruction {
    match op {
        BinOp::Add => Instruction::Add,
        BinOp::Sub => Instruction::Sub,
        BinOp::Mul => Instruction::Mul,
        BinOp::Div => Instruction::Div,
        BinOp::Rem => Instruction::Rem,
        BinOp::Pow => Instruction::Pow,
        BinOp::Shl => Instruction::Shl,
        BinOp::Shr => Instruction::Shr,
        BinOp::Eq => Instruction::Eq,
        BinOp::Ne => Instruction::Ne,
        BinOp::Lt => Instruction::Lt,
        BinOp::Le => Instruction::Le,
        BinOp::Gt => Instruction::Gt,
        BinOp::Ge => Instruction::Ge,
        BinOp::And => Instruction::And,
        BinOp::Or => Instruction::Or,
    }
}

/// Resolve labels to 1-indexed ROM addresses and strip the markers.
fn assemble(code: &[Pseudo]) -> LinkResult<Vec<Instruction>> {
    let mut addresses: HashMap<Label, i32> = HashMap::new();
    let mut next = 1i32;
    for item in code {
        match item {
            Pseudo::Mark(label) => {
                addresses.insert(*label, next);
            }
            _ => next += 1,
        }
    }

    let mut rom = Vec::with_capacity(code.len());
    for item in code {
        match item {
            Pseudo::Mark(_) => {}
            Pseudo::Op(inst) => rom.push(*inst),
            Pseudo::Branch(kind, label) => {
                let target = *addresses.get(label).ok_or_else(|| LinkError {
                    span: None,
                    message: "jump to an undefined label".to_string(),
                })?;
                rom.push(match kind {
                    BranchKind::Jump => Instruction::Jump(target),
                    BranchKind::JumpNotIf => Instruction::JumpNotIf(target),
                    BranchKind::Call => Instruction::Jsr(target),
                });
            }
        }
    }
    Ok(rom)
}
