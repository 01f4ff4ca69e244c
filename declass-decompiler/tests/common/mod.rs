#![allow(dead_code)]

use std::collections::HashMap;

use declass_decompiler::context::{
    Constant, ConstantResolver, InstructionDecoder, MethodContext, VariableTable,
};
use declass_decompiler::error::DecodeError;
use declass_ir::expr::{FieldRef, JavaType, MethodRef};
use declass_ir::instruction::{Instruction, Operand, RawHandler};
use declass_isa::Opcode;

// --- instruction shorthand (one pc per instruction) ---

pub fn insn(pc: u32, opcode: Opcode) -> Instruction {
    Instruction::new(pc, opcode, vec![])
}

pub fn insn_slot(pc: u32, opcode: Opcode, slot: u16) -> Instruction {
    Instruction::new(pc, opcode, vec![Operand::Slot(slot)])
}

pub fn insn_int(pc: u32, opcode: Opcode, value: i64) -> Instruction {
    Instruction::new(pc, opcode, vec![Operand::Int(value)])
}

pub fn insn_pool(pc: u32, opcode: Opcode, index: u16) -> Instruction {
    Instruction::new(pc, opcode, vec![Operand::Pool(index)])
}

pub fn insn_target(pc: u32, opcode: Opcode, target: u32) -> Instruction {
    Instruction::new(pc, opcode, vec![Operand::Target(target)])
}

pub fn iinc(pc: u32, slot: u16, amount: i64) -> Instruction {
    Instruction::new(pc, Opcode::Iinc, vec![Operand::Slot(slot), Operand::Int(amount)])
}

pub fn handler(start: u32, end: u32, handler_pc: u32, caught: Option<&str>) -> RawHandler {
    RawHandler {
        start_pc: start,
        end_pc: end,
        handler_pc,
        caught_type: caught.map(str::to_string),
    }
}

// --- map-backed collaborators ---

#[derive(Default)]
pub struct MapResolver {
    pub constants: HashMap<u16, Constant>,
    pub classes: HashMap<u16, String>,
    pub fields: HashMap<u16, FieldRef>,
    pub methods: HashMap<u16, MethodRef>,
}

impl MapResolver {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, index: u16, method: MethodRef) -> Self {
        self.methods.insert(index, method);
        self
    }

    pub fn with_field(mut self, index: u16, field: FieldRef) -> Self {
        self.fields.insert(index, field);
        self
    }

    pub fn with_class(mut self, index: u16, name: &str) -> Self {
        self.classes.insert(index, name.to_string());
        self
    }

    pub fn with_constant(mut self, index: u16, constant: Constant) -> Self {
        self.constants.insert(index, constant);
        self
    }
}

impl ConstantResolver for MapResolver {
    fn constant(&self, index: u16) -> Option<Constant> {
        self.constants.get(&index).cloned()
    }
    fn class_name(&self, index: u16) -> Option<String> {
        self.classes.get(&index).cloned()
    }
    fn field_ref(&self, index: u16) -> Option<FieldRef> {
        self.fields.get(&index).cloned()
    }
    fn method_ref(&self, index: u16) -> Option<MethodRef> {
        self.methods.get(&index).cloned()
    }
}

#[derive(Default)]
pub struct MapVarTable {
    pub names: HashMap<u16, String>,
}

impl MapVarTable {
    pub fn named(pairs: &[(u16, &str)]) -> Self {
        MapVarTable {
            names: pairs.iter().map(|(s, n)| (*s, n.to_string())).collect(),
        }
    }
}

impl VariableTable for MapVarTable {
    fn slot_name(&self, slot: u16, _pc: u32) -> Option<String> {
        self.names.get(&slot).cloned()
    }
}

// --- decoders for the decode path ---

pub struct ListDecoder(pub Vec<Instruction>);

impl InstructionDecoder for ListDecoder {
    fn decode(&self, _bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        Ok(self.0.clone())
    }
}

pub struct FailingDecoder;

impl InstructionDecoder for FailingDecoder {
    fn decode(&self, _bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        Err(DecodeError::new("truncated instruction stream"))
    }
}

// --- misc ---

pub fn static_method(class: &str, name: &str, params: Vec<JavaType>, ret: JavaType) -> MethodRef {
    MethodRef {
        class_name: class.to_string(),
        name: name.to_string(),
        params,
        ret,
    }
}

pub fn context<'a>(
    instructions: Vec<Instruction>,
    handlers: &[RawHandler],
    resolver: &'a MapResolver,
    vars: &'a MapVarTable,
) -> MethodContext<'a> {
    MethodContext::from_instructions(instructions, handlers, resolver, vars, true)
}
