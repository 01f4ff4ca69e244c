//! Stack evaluator: abstract interpretation of the instruction sequence
//! over a symbolic operand stack and local-slot bindings, producing the
//! flat, pc-ordered statement list consumed by the block inferrer.

use std::collections::{BTreeMap, HashSet};

use declass_ir::expr::{BinOp, CompareOp, Expr, FieldRef, InvokeKind, JavaType, MethodRef, UnOp};
use declass_ir::instruction::Instruction;
use declass_ir::stmt::{Statement, StatementKind};
use declass_isa::Opcode;

use crate::context::{Constant, MethodContext};
use crate::error::EvalError;

/// A symbolic operand-stack value: an expression fragment tagged with its
/// inferred type and the pc of the earliest instruction contributing to it.
#[derive(Debug, Clone)]
pub struct SymbolicValue {
    pub expr: Expr,
    pub ty: JavaType,
    pub origin: u32,
}

/// A local-variable binding observed during evaluation (first store wins).
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBinding {
    pub slot: u16,
    pub name: String,
    pub ty: JavaType,
    pub pc: u32,
}

/// Result of evaluating one method.
#[derive(Debug)]
pub struct Evaluation {
    /// Statements in program order.
    pub statements: Vec<Statement>,
    /// First-store bindings, feeding variable-declaration emission.
    pub bindings: Vec<LocalBinding>,
    /// Values left on the operand stack after the last instruction. Zero for
    /// any sequence with balanced stack effects.
    pub residual_stack: usize,
    /// Set when evaluation aborted; `statements` then holds everything
    /// produced before the failing pc.
    pub error: Option<EvalError>,
}

/// The abstract frame: one per evaluation run, discarded at the end, never
/// shared across concurrent runs.
struct Frame {
    stack: Vec<SymbolicValue>,
    slots: BTreeMap<u16, LocalBinding>,
    declared: HashSet<u16>,
}

impl Frame {
    fn new() -> Self {
        Frame {
            stack: Vec::new(),
            slots: BTreeMap::new(),
            declared: HashSet::new(),
        }
    }

    fn push(&mut self, expr: Expr, ty: JavaType, origin: u32) {
        self.stack.push(SymbolicValue { expr, ty, origin });
    }

    fn pop(&mut self, insn: &Instruction) -> Result<SymbolicValue, EvalError> {
        self.stack.pop().ok_or(EvalError::StackUnderflow {
            pc: insn.pc,
            mnemonic: insn.opcode.mnemonic(),
        })
    }
}

/// Evaluate the context's instruction sequence.
pub fn evaluate(ctx: &MethodContext) -> Evaluation {
    let handler_pcs: HashSet<u32> = ctx
        .regions()
        .iter()
        .flat_map(|r| r.handlers().iter().map(|h| h.pc))
        .collect();

    let mut frame = Frame::new();
    let mut statements = Vec::new();
    let mut bindings = Vec::new();
    let instructions = ctx.instructions();

    for (i, insn) in instructions.iter().enumerate() {
        let next_pc = instructions
            .get(i + 1)
            .map(|n| n.pc)
            .unwrap_or_else(|| ctx.code_len());

        if handler_pcs.contains(&insn.pc) {
            // Handler entry: the raised exception is the only stack value.
            frame.stack.clear();
            frame.push(Expr::CaughtException, JavaType::Unknown, insn.pc);
        }

        if let Err(err) = step(ctx, &mut frame, insn, next_pc, &mut statements, &mut bindings) {
            log::error!("evaluation aborted: {err}");
            let residual_stack = frame.stack.len();
            return Evaluation {
                statements,
                bindings,
                residual_stack,
                error: Some(err),
            };
        }
    }

    Evaluation {
        residual_stack: frame.stack.len(),
        statements,
        bindings,
        error: None,
    }
}

fn unsupported(insn: &Instruction) -> EvalError {
    EvalError::UnsupportedOpcode {
        pc: insn.pc,
        mnemonic: insn.opcode.mnemonic(),
    }
}

fn step(
    ctx: &MethodContext,
    frame: &mut Frame,
    insn: &Instruction,
    next_pc: u32,
    statements: &mut Vec<Statement>,
    bindings: &mut Vec<LocalBinding>,
) -> Result<(), EvalError> {
    let pc = insn.pc;
    match insn.opcode {
        Opcode::Nop => {}

        // --- constant pushes ---
        Opcode::Iconst => {
            let v = insn.int().ok_or_else(|| unsupported(insn))?;
            frame.push(Expr::Int(v), JavaType::Int, pc);
        }
        Opcode::Lconst => {
            let v = insn.int().ok_or_else(|| unsupported(insn))?;
            frame.push(Expr::Long(v), JavaType::Long, pc);
        }
        Opcode::Fconst => {
            let v = insn.float().ok_or_else(|| unsupported(insn))?;
            frame.push(Expr::Float(v as f32), JavaType::Float, pc);
        }
        Opcode::Dconst => {
            let v = insn.float().ok_or_else(|| unsupported(insn))?;
            frame.push(Expr::Double(v), JavaType::Double, pc);
        }
        Opcode::AconstNull => frame.push(Expr::Null, JavaType::Unknown, pc),
        Opcode::Ldc => {
            let index = insn.pool().ok_or_else(|| unsupported(insn))?;
            let (expr, ty) = match ctx.resolver.constant(index) {
                Some(Constant::Int(v)) => (Expr::Int(v), JavaType::Int),
                Some(Constant::Long(v)) => (Expr::Long(v), JavaType::Long),
                Some(Constant::Float(v)) => (Expr::Float(v), JavaType::Float),
                Some(Constant::Double(v)) => (Expr::Double(v), JavaType::Double),
                Some(Constant::Str(s)) => (Expr::Str(s), JavaType::Reference("String".into())),
                Some(Constant::Class(name)) => {
                    (Expr::Class(name), JavaType::Reference("Class".into()))
                }
                None => {
                    log::debug!("unresolved constant-pool entry #{index} at pc {pc:#x}");
                    (Expr::Placeholder(format!("const#{index}")), JavaType::Unknown)
                }
            };
            frame.push(expr, ty, pc);
        }

        // --- local loads ---
        Opcode::Iload => load_local(ctx, frame, insn, JavaType::Int)?,
        Opcode::Lload => load_local(ctx, frame, insn, JavaType::Long)?,
        Opcode::Fload => load_local(ctx, frame, insn, JavaType::Float)?,
        Opcode::Dload => load_local(ctx, frame, insn, JavaType::Double)?,
        Opcode::Aload => {
            let slot = insn.slot().ok_or_else(|| unsupported(insn))?;
            if slot == 0 && !ctx.is_static {
                frame.push(Expr::This, JavaType::Unknown, pc);
            } else {
                load_local(ctx, frame, insn, JavaType::Unknown)?;
            }
        }

        // --- local stores ---
        Opcode::Istore => store_local(ctx, frame, insn, next_pc, JavaType::Int, statements, bindings)?,
        Opcode::Lstore => store_local(ctx, frame, insn, next_pc, JavaType::Long, statements, bindings)?,
        Opcode::Fstore => store_local(ctx, frame, insn, next_pc, JavaType::Float, statements, bindings)?,
        Opcode::Dstore => store_local(ctx, frame, insn, next_pc, JavaType::Double, statements, bindings)?,
        Opcode::Astore => store_local(ctx, frame, insn, next_pc, JavaType::Unknown, statements, bindings)?,

        Opcode::Iinc => {
            let slot = insn.slot().ok_or_else(|| unsupported(insn))?;
            let amount = insn.int().ok_or_else(|| unsupported(insn))? as i32;
            let name = slot_name(ctx, frame, slot, pc);
            statements.push(Statement::new(
                pc,
                next_pc,
                StatementKind::Inc {
                    target: Expr::Local { slot, name },
                    amount,
                },
            ));
        }

        // --- arrays ---
        Opcode::ArrayLoad => {
            let index = frame.pop(insn)?;
            let array = frame.pop(insn)?;
            let origin = array.origin.min(index.origin).min(pc);
            let ty = array.ty.element();
            frame.push(
                Expr::ArrayIndex {
                    array: Box::new(array.expr),
                    index: Box::new(index.expr),
                },
                ty,
                origin,
            );
        }
        Opcode::ArrayStore => {
            let value = frame.pop(insn)?;
            let index = frame.pop(insn)?;
            let array = frame.pop(insn)?;
            let start = array.origin.min(index.origin).min(value.origin).min(pc);
            statements.push(Statement::new(
                start,
                next_pc,
                StatementKind::Assign {
                    target: Expr::ArrayIndex {
                        array: Box::new(array.expr),
                        index: Box::new(index.expr),
                    },
                    value: value.expr,
                    declares: None,
                },
            ));
        }
        Opcode::ArrayLength => {
            let array = frame.pop(insn)?;
            let origin = array.origin.min(pc);
            frame.push(Expr::ArrayLength(Box::new(array.expr)), JavaType::Int, origin);
        }
        Opcode::NewArray => {
            let len = frame.pop(insn)?;
            let elem = match (insn.kind(), insn.pool()) {
                (Some(kind), _) => JavaType::from(kind),
                (None, Some(index)) => reference_type(ctx, index, pc),
                (None, None) => return Err(unsupported(insn)),
            };
            let origin = len.origin.min(pc);
            let ty = JavaType::Array(Box::new(elem.clone()));
            frame.push(
                Expr::NewArray { elem, len: Box::new(len.expr) },
                ty,
                origin,
            );
        }

        // --- stack shuffling ---
        Opcode::Pop => {
            let value = frame.pop(insn)?;
            discard(value, next_pc, statements);
        }
        Opcode::Pop2 => {
            let value = frame.pop(insn)?;
            let wide = value.ty.is_wide();
            discard(value, next_pc, statements);
            if !wide {
                let second = frame.pop(insn)?;
                discard(second, next_pc, statements);
            }
        }
        Opcode::Dup => {
            let value = frame.pop(insn)?;
            let dup = dup_of(&value);
            frame.stack.push(value);
            frame.stack.push(dup);
        }
        Opcode::DupX1 => {
            let top = frame.pop(insn)?;
            let under = frame.pop(insn)?;
            let dup = dup_of(&top);
            frame.stack.push(dup);
            frame.stack.push(under);
            frame.stack.push(top);
        }
        Opcode::Dup2 => {
            let top = frame.pop(insn)?;
            if top.ty.is_wide() {
                let dup = dup_of(&top);
                frame.stack.push(top);
                frame.stack.push(dup);
            } else {
                let under = frame.pop(insn)?;
                let dup_under = dup_of(&under);
                let dup_top = dup_of(&top);
                frame.stack.push(under);
                frame.stack.push(top);
                frame.stack.push(dup_under);
                frame.stack.push(dup_top);
            }
        }
        Opcode::Swap => {
            let top = frame.pop(insn)?;
            let under = frame.pop(insn)?;
            frame.stack.push(top);
            frame.stack.push(under);
        }

        // --- arithmetic / bitwise ---
        Opcode::Add => binary(frame, insn, BinOp::Add)?,
        Opcode::Sub => binary(frame, insn, BinOp::Sub)?,
        Opcode::Mul => binary(frame, insn, BinOp::Mul)?,
        Opcode::Div => binary(frame, insn, BinOp::Div)?,
        Opcode::Rem => binary(frame, insn, BinOp::Rem)?,
        Opcode::Shl => binary(frame, insn, BinOp::Shl)?,
        Opcode::Shr => binary(frame, insn, BinOp::Shr)?,
        Opcode::Ushr => binary(frame, insn, BinOp::Ushr)?,
        Opcode::And => binary(frame, insn, BinOp::And)?,
        Opcode::Or => binary(frame, insn, BinOp::Or)?,
        Opcode::Xor => binary(frame, insn, BinOp::Xor)?,
        Opcode::Neg => {
            let value = frame.pop(insn)?;
            let origin = value.origin.min(pc);
            let ty = value.ty.clone();
            frame.push(
                Expr::Unary { op: UnOp::Neg, expr: Box::new(value.expr) },
                ty,
                origin,
            );
        }
        Opcode::Conv => {
            let kind = insn.kind().ok_or_else(|| unsupported(insn))?;
            let value = frame.pop(insn)?;
            let origin = value.origin.min(pc);
            let ty = JavaType::from(kind);
            frame.push(
                Expr::Cast { ty: ty.clone(), expr: Box::new(value.expr) },
                ty,
                origin,
            );
        }
        Opcode::Cmp => {
            let rhs = frame.pop(insn)?;
            let lhs = frame.pop(insn)?;
            let origin = lhs.origin.min(rhs.origin).min(pc);
            frame.push(
                Expr::CmpSign { lhs: Box::new(lhs.expr), rhs: Box::new(rhs.expr) },
                JavaType::Int,
                origin,
            );
        }

        // --- field access ---
        Opcode::GetField => {
            let field = field_ref(ctx, insn)?;
            let object = frame.pop(insn)?;
            let origin = object.origin.min(pc);
            let ty = field.ty.clone();
            frame.push(
                Expr::FieldAccess { object: Some(Box::new(object.expr)), field },
                ty,
                origin,
            );
        }
        Opcode::GetStatic => {
            let field = field_ref(ctx, insn)?;
            let ty = field.ty.clone();
            frame.push(Expr::FieldAccess { object: None, field }, ty, pc);
        }
        Opcode::PutField => {
            let field = field_ref(ctx, insn)?;
            let value = frame.pop(insn)?;
            let object = frame.pop(insn)?;
            let start = object.origin.min(value.origin).min(pc);
            statements.push(Statement::new(
                start,
                next_pc,
                StatementKind::Assign {
                    target: Expr::FieldAccess { object: Some(Box::new(object.expr)), field },
                    value: value.expr,
                    declares: None,
                },
            ));
        }
        Opcode::PutStatic => {
            let field = field_ref(ctx, insn)?;
            let value = frame.pop(insn)?;
            let start = value.origin.min(pc);
            statements.push(Statement::new(
                start,
                next_pc,
                StatementKind::Assign {
                    target: Expr::FieldAccess { object: None, field },
                    value: value.expr,
                    declares: None,
                },
            ));
        }

        // --- invocation ---
        Opcode::InvokeVirtual => invoke(ctx, frame, insn, next_pc, InvokeKind::Virtual, statements)?,
        Opcode::InvokeSpecial => invoke(ctx, frame, insn, next_pc, InvokeKind::Special, statements)?,
        Opcode::InvokeStatic => invoke(ctx, frame, insn, next_pc, InvokeKind::Static, statements)?,
        Opcode::InvokeInterface => {
            invoke(ctx, frame, insn, next_pc, InvokeKind::Interface, statements)?
        }

        // --- object model ---
        Opcode::New => {
            let index = insn.pool().ok_or_else(|| unsupported(insn))?;
            let class_name = class_name(ctx, index, pc);
            let ty = JavaType::Reference(class_name.clone());
            frame.push(Expr::UninitNew { class_name }, ty, pc);
        }
        Opcode::InstanceOf => {
            let index = insn.pool().ok_or_else(|| unsupported(insn))?;
            let value = frame.pop(insn)?;
            let origin = value.origin.min(pc);
            frame.push(
                Expr::InstanceOf {
                    expr: Box::new(value.expr),
                    ty: class_name(ctx, index, pc),
                },
                JavaType::Boolean,
                origin,
            );
        }
        Opcode::CheckCast => {
            let index = insn.pool().ok_or_else(|| unsupported(insn))?;
            let value = frame.pop(insn)?;
            let origin = value.origin.min(pc);
            let ty = reference_type(ctx, index, pc);
            frame.push(
                Expr::Cast { ty: ty.clone(), expr: Box::new(value.expr) },
                ty,
                origin,
            );
        }

        // --- control transfer: recorded, resolved by the block inferrer ---
        Opcode::Goto => {
            let target = insn.target().ok_or_else(|| unsupported(insn))?;
            statements.push(Statement::new(pc, next_pc, StatementKind::Jump { target }));
        }
        Opcode::IfEq => branch_zero(frame, insn, next_pc, CompareOp::Eq, statements)?,
        Opcode::IfNe => branch_zero(frame, insn, next_pc, CompareOp::Ne, statements)?,
        Opcode::IfLt => branch_zero(frame, insn, next_pc, CompareOp::Lt, statements)?,
        Opcode::IfGe => branch_zero(frame, insn, next_pc, CompareOp::Ge, statements)?,
        Opcode::IfGt => branch_zero(frame, insn, next_pc, CompareOp::Gt, statements)?,
        Opcode::IfLe => branch_zero(frame, insn, next_pc, CompareOp::Le, statements)?,
        Opcode::IfCmpEq => branch_pair(frame, insn, next_pc, CompareOp::Eq, statements)?,
        Opcode::IfCmpNe => branch_pair(frame, insn, next_pc, CompareOp::Ne, statements)?,
        Opcode::IfCmpLt => branch_pair(frame, insn, next_pc, CompareOp::Lt, statements)?,
        Opcode::IfCmpGe => branch_pair(frame, insn, next_pc, CompareOp::Ge, statements)?,
        Opcode::IfCmpGt => branch_pair(frame, insn, next_pc, CompareOp::Gt, statements)?,
        Opcode::IfCmpLe => branch_pair(frame, insn, next_pc, CompareOp::Le, statements)?,
        Opcode::IfNull => branch_null(frame, insn, next_pc, CompareOp::Eq, statements)?,
        Opcode::IfNonNull => branch_null(frame, insn, next_pc, CompareOp::Ne, statements)?,

        Opcode::Return => {
            statements.push(Statement::new(pc, next_pc, StatementKind::Return(None)));
        }
        Opcode::ReturnValue => {
            let value = frame.pop(insn)?;
            let start = value.origin.min(pc);
            statements.push(Statement::new(
                start,
                next_pc,
                StatementKind::Return(Some(value.expr)),
            ));
        }
        Opcode::Throw => {
            let value = frame.pop(insn)?;
            let start = value.origin.min(pc);
            statements.push(Statement::new(start, next_pc, StatementKind::Throw(value.expr)));
        }

        Opcode::MonitorEnter | Opcode::MonitorExit => {
            let object = frame.pop(insn)?;
            let start = object.origin.min(pc);
            statements.push(Statement::new(
                start,
                next_pc,
                StatementKind::Monitor {
                    enter: insn.opcode == Opcode::MonitorEnter,
                    object: object.expr,
                },
            ));
        }
    }
    Ok(())
}

// --- helpers ---

fn dup_of(value: &SymbolicValue) -> SymbolicValue {
    SymbolicValue {
        expr: Expr::Dup(Box::new(value.expr.clone())),
        ty: value.ty.clone(),
        origin: value.origin,
    }
}

/// A popped-and-discarded value only survives as a statement when dropping
/// it would lose an observable effect.
fn discard(value: SymbolicValue, next_pc: u32, statements: &mut Vec<Statement>) {
    if value.expr.has_side_effects() {
        let start = value.origin;
        statements.push(Statement::new(start, next_pc, StatementKind::Expr(value.expr)));
    }
}

fn slot_name(ctx: &MethodContext, frame: &Frame, slot: u16, pc: u32) -> String {
    ctx.variables
        .slot_name(slot, pc)
        .or_else(|| frame.slots.get(&slot).map(|b| b.name.clone()))
        .unwrap_or_else(|| format!("var{slot}"))
}

fn load_local(
    ctx: &MethodContext,
    frame: &mut Frame,
    insn: &Instruction,
    ty: JavaType,
) -> Result<(), EvalError> {
    let slot = insn.slot().ok_or_else(|| unsupported(insn))?;
    let name = slot_name(ctx, frame, slot, insn.pc);
    let ty = if ty == JavaType::Unknown {
        frame
            .slots
            .get(&slot)
            .map(|b| b.ty.clone())
            .unwrap_or(JavaType::Unknown)
    } else {
        ty
    };
    frame.push(Expr::Local { slot, name }, ty, insn.pc);
    Ok(())
}

fn store_local(
    ctx: &MethodContext,
    frame: &mut Frame,
    insn: &Instruction,
    next_pc: u32,
    opcode_ty: JavaType,
    statements: &mut Vec<Statement>,
    bindings: &mut Vec<LocalBinding>,
) -> Result<(), EvalError> {
    let slot = insn.slot().ok_or_else(|| unsupported(insn))?;
    let value = frame.pop(insn)?;
    let name = slot_name(ctx, frame, slot, insn.pc);
    let ty = match opcode_ty {
        JavaType::Unknown => value.ty.clone(),
        other => other,
    };

    let declares = if frame.declared.insert(slot) {
        let binding = LocalBinding {
            slot,
            name: name.clone(),
            ty: ty.clone(),
            pc: insn.pc,
        };
        bindings.push(binding);
        Some(ty.clone())
    } else {
        None
    };
    frame.slots.insert(
        slot,
        LocalBinding { slot, name: name.clone(), ty, pc: insn.pc },
    );

    let start = value.origin.min(insn.pc);
    statements.push(Statement::new(
        start,
        next_pc,
        StatementKind::Assign {
            target: Expr::Local { slot, name },
            value: value.expr,
            declares,
        },
    ));
    Ok(())
}

fn binary(frame: &mut Frame, insn: &Instruction, op: BinOp) -> Result<(), EvalError> {
    let rhs = frame.pop(insn)?;
    let lhs = frame.pop(insn)?;
    let origin = lhs.origin.min(rhs.origin).min(insn.pc);
    let ty = match &lhs.ty {
        JavaType::Unknown => rhs.ty.clone(),
        other => other.clone(),
    };
    frame.push(
        Expr::Binary { op, lhs: Box::new(lhs.expr), rhs: Box::new(rhs.expr) },
        ty,
        origin,
    );
    Ok(())
}

/// Compare-against-zero branches. A pending three-way `cmp` result folds
/// into a direct comparison of its operands.
fn branch_zero(
    frame: &mut Frame,
    insn: &Instruction,
    next_pc: u32,
    op: CompareOp,
    statements: &mut Vec<Statement>,
) -> Result<(), EvalError> {
    let target = insn.target().ok_or_else(|| unsupported(insn))?;
    let value = frame.pop(insn)?;
    let start = value.origin.min(insn.pc);
    let cond = match value.expr {
        Expr::CmpSign { lhs, rhs } => Expr::Compare { op, lhs, rhs },
        other => Expr::Compare {
            op,
            lhs: Box::new(other),
            rhs: Box::new(Expr::Int(0)),
        },
    };
    statements.push(Statement::new(start, next_pc, StatementKind::Branch { cond, target }));
    Ok(())
}

fn branch_pair(
    frame: &mut Frame,
    insn: &Instruction,
    next_pc: u32,
    op: CompareOp,
    statements: &mut Vec<Statement>,
) -> Result<(), EvalError> {
    let target = insn.target().ok_or_else(|| unsupported(insn))?;
    let rhs = frame.pop(insn)?;
    let lhs = frame.pop(insn)?;
    let start = lhs.origin.min(rhs.origin).min(insn.pc);
    let cond = Expr::Compare {
        op,
        lhs: Box::new(lhs.expr),
        rhs: Box::new(rhs.expr),
    };
    statements.push(Statement::new(start, next_pc, StatementKind::Branch { cond, target }));
    Ok(())
}

fn branch_null(
    frame: &mut Frame,
    insn: &Instruction,
    next_pc: u32,
    op: CompareOp,
    statements: &mut Vec<Statement>,
) -> Result<(), EvalError> {
    let target = insn.target().ok_or_else(|| unsupported(insn))?;
    let value = frame.pop(insn)?;
    let start = value.origin.min(insn.pc);
    let cond = Expr::Compare {
        op,
        lhs: Box::new(value.expr),
        rhs: Box::new(Expr::Null),
    };
    statements.push(Statement::new(start, next_pc, StatementKind::Branch { cond, target }));
    Ok(())
}

fn class_name(ctx: &MethodContext, index: u16, pc: u32) -> String {
    ctx.resolver.class_name(index).unwrap_or_else(|| {
        log::debug!("unresolved class reference #{index} at pc {pc:#x}");
        format!("class#{index}")
    })
}

fn reference_type(ctx: &MethodContext, index: u16, pc: u32) -> JavaType {
    JavaType::Reference(class_name(ctx, index, pc))
}

fn field_ref(ctx: &MethodContext, insn: &Instruction) -> Result<FieldRef, EvalError> {
    let index = insn.pool().ok_or_else(|| unsupported(insn))?;
    Ok(ctx.resolver.field_ref(index).unwrap_or_else(|| {
        log::debug!("unresolved field reference #{index} at pc {:#x}", insn.pc);
        FieldRef {
            class_name: format!("class#{index}"),
            name: format!("field#{index}"),
            ty: JavaType::Unknown,
        }
    }))
}

fn invoke(
    ctx: &MethodContext,
    frame: &mut Frame,
    insn: &Instruction,
    next_pc: u32,
    kind: InvokeKind,
    statements: &mut Vec<Statement>,
) -> Result<(), EvalError> {
    let pc = insn.pc;
    let index = insn.pool().ok_or_else(|| unsupported(insn))?;
    let method = ctx.resolver.method_ref(index).unwrap_or_else(|| {
        log::debug!("unresolved method reference #{index} at pc {pc:#x}");
        MethodRef {
            class_name: format!("class#{index}"),
            name: format!("method#{index}"),
            params: Vec::new(),
            ret: JavaType::Unknown,
        }
    });

    // Arguments sit on the stack left-to-right, so they pop in reverse.
    let mut args = Vec::with_capacity(method.params.len());
    let mut start = pc;
    for _ in 0..method.params.len() {
        let arg = frame.pop(insn)?;
        start = start.min(arg.origin);
        args.push(arg.expr);
    }
    args.reverse();

    let receiver = match kind {
        InvokeKind::Static => None,
        _ => {
            let r = frame.pop(insn)?;
            start = start.min(r.origin);
            Some(r)
        }
    };

    if kind == InvokeKind::Special && method.name == "<init>" {
        let receiver = receiver.ok_or_else(|| unsupported(insn))?;
        return init_call(frame, receiver, method, args, start, next_pc, statements);
    }

    let ret = method.ret.clone();
    let call = Expr::Call {
        kind,
        receiver: receiver.map(|r| Box::new(r.expr)),
        method,
        args,
    };
    if ret == JavaType::Void {
        statements.push(Statement::new(start, next_pc, StatementKind::Expr(call)));
    } else {
        frame.push(call, ret, start);
    }
    Ok(())
}

/// Constructor invocation. The common `new; dup; <init>` shape collapses
/// into a single constructor expression replacing the uninitialized
/// allocation still sitting on the stack.
fn init_call(
    frame: &mut Frame,
    receiver: SymbolicValue,
    method: MethodRef,
    args: Vec<Expr>,
    start: u32,
    next_pc: u32,
    statements: &mut Vec<Statement>,
) -> Result<(), EvalError> {
    match receiver.expr.unwrap_dup() {
        Expr::UninitNew { class_name } => {
            let class_name = class_name.clone();
            let ctor = Expr::New { class_name: class_name.clone(), args };
            let ty = JavaType::Reference(class_name.clone());
            if matches!(receiver.expr, Expr::Dup(_)) {
                // The original allocation is still below us on the stack.
                let replaced = frame.stack.iter_mut().rev().find(|v| {
                    matches!(v.expr.unwrap_dup(), Expr::UninitNew { class_name: cn } if *cn == class_name)
                });
                match replaced {
                    Some(slot) => {
                        slot.expr = ctor;
                        slot.ty = ty;
                        slot.origin = slot.origin.min(start);
                    }
                    None => {
                        // dup'ed allocation already consumed; keep the value.
                        frame.push(ctor, ty, start);
                    }
                }
            } else {
                // No dup: the result is used (or discarded) directly.
                frame.push(ctor, ty, start);
            }
        }
        _ => {
            // super(...)/this(...) or a constructor call on an arbitrary
            // receiver: a statement either way.
            let call = Expr::Call {
                kind: InvokeKind::Special,
                receiver: Some(Box::new(receiver.expr)),
                method,
                args,
            };
            statements.push(Statement::new(start, next_pc, StatementKind::Expr(call)));
        }
    }
    Ok(())
}
