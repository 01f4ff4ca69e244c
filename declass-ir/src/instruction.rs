use declass_isa::{Opcode, ValueKind};

/// A decoded operand of a bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Local-variable slot index.
    Slot(u16),
    /// Signed integer immediate.
    Int(i64),
    /// Float immediate.
    Float(f64),
    /// Constant-pool index.
    Pool(u16),
    /// Absolute jump-target pc. The decoder resolves relative offsets.
    Target(u32),
    /// Primitive kind, for opcodes whose original encoding spelled the type
    /// in the opcode itself.
    Kind(ValueKind),
}

/// A single decoded instruction with resolved operands.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Program-counter offset within the method's code.
    pub pc: u32,
    /// The opcode.
    pub opcode: Opcode,
    /// Decoded operands.
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(pc: u32, opcode: Opcode, operands: Vec<Operand>) -> Self {
        Instruction { pc, opcode, operands }
    }

    /// First slot operand, if any.
    pub fn slot(&self) -> Option<u16> {
        self.operands.iter().find_map(|op| match op {
            Operand::Slot(s) => Some(*s),
            _ => None,
        })
    }

    /// First integer immediate, if any.
    pub fn int(&self) -> Option<i64> {
        self.operands.iter().find_map(|op| match op {
            Operand::Int(v) => Some(*v),
            _ => None,
        })
    }

    /// First float immediate, if any.
    pub fn float(&self) -> Option<f64> {
        self.operands.iter().find_map(|op| match op {
            Operand::Float(v) => Some(*v),
            _ => None,
        })
    }

    /// First constant-pool index, if any.
    pub fn pool(&self) -> Option<u16> {
        self.operands.iter().find_map(|op| match op {
            Operand::Pool(i) => Some(*i),
            _ => None,
        })
    }

    /// Jump-target pc, if this instruction carries one.
    pub fn target(&self) -> Option<u32> {
        self.operands.iter().find_map(|op| match op {
            Operand::Target(t) => Some(*t),
            _ => None,
        })
    }

    /// Primitive-kind operand, if any.
    pub fn kind(&self) -> Option<ValueKind> {
        self.operands.iter().find_map(|op| match op {
            Operand::Kind(k) => Some(*k),
            _ => None,
        })
    }
}

/// One raw exception-table entry, as persisted in the compiled method's
/// metadata. The caught type is already resolved to a class name by the
/// constant-pool layer; `None` marks the universal (catch-any) handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHandler {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    pub caught_type: Option<String>,
}
