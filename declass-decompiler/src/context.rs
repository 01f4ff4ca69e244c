use declass_ir::expr::{FieldRef, MethodRef};
use declass_ir::instruction::{Instruction, RawHandler};

use crate::error::DecodeError;
use crate::exception::{self, ExceptionRegion};

/// External instruction decoder: turns a method's raw byte payload into the
/// typed instruction sequence. No other component parses bytes.
pub trait InstructionDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError>;
}

/// A literal constant resolved from the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Class(String),
}

/// External constant-pool resolver. Queried without mutation; a `None`
/// answer degrades to a placeholder token downstream, never an abort.
pub trait ConstantResolver {
    fn constant(&self, index: u16) -> Option<Constant>;
    fn class_name(&self, index: u16) -> Option<String>;
    fn field_ref(&self, index: u16) -> Option<FieldRef>;
    fn method_ref(&self, index: u16) -> Option<MethodRef>;
}

/// External variable table: names for local slots, scoped by pc.
pub trait VariableTable {
    fn slot_name(&self, slot: u16, pc: u32) -> Option<String>;
}

/// Binds one method's decoded instruction sequence to the constant-pool
/// resolver, the variable table, and the normalized exception regions.
///
/// Everything here is read-only for the rest of the pipeline; concurrent
/// runs over different methods may share the resolver and variable table.
pub struct MethodContext<'a> {
    instructions: Vec<Instruction>,
    regions: Vec<ExceptionRegion>,
    pub resolver: &'a dyn ConstantResolver,
    pub variables: &'a dyn VariableTable,
    pub is_static: bool,
    decode_error: Option<DecodeError>,
}

impl<'a> MethodContext<'a> {
    /// Decode `bytes` and bind the result. A decode failure is logged and
    /// leaves an empty instruction sequence; downstream stages degrade to an
    /// empty block tree instead of failing.
    pub fn new(
        bytes: &[u8],
        decoder: &dyn InstructionDecoder,
        handlers: &[RawHandler],
        resolver: &'a dyn ConstantResolver,
        variables: &'a dyn VariableTable,
        is_static: bool,
    ) -> Self {
        let (instructions, decode_error) = match decoder.decode(bytes) {
            Ok(list) => (list, None),
            Err(err) => {
                log::error!("instruction decode failed: {err}");
                (Vec::new(), Some(err))
            }
        };
        Self::from_instructions(instructions, handlers, resolver, variables, is_static)
            .with_decode_error(decode_error)
    }

    /// Bind an already-decoded instruction sequence.
    pub fn from_instructions(
        instructions: Vec<Instruction>,
        handlers: &[RawHandler],
        resolver: &'a dyn ConstantResolver,
        variables: &'a dyn VariableTable,
        is_static: bool,
    ) -> Self {
        let regions = exception::normalize_regions(handlers);
        MethodContext {
            instructions,
            regions,
            resolver,
            variables,
            is_static,
            decode_error: None,
        }
    }

    fn with_decode_error(mut self, err: Option<DecodeError>) -> Self {
        self.decode_error = err;
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    /// The pc one past the last instruction.
    pub fn code_len(&self) -> u32 {
        self.instructions.last().map(|i| i.pc + 1).unwrap_or(0)
    }

    pub fn decode_error(&self) -> Option<&DecodeError> {
        self.decode_error.as_ref()
    }
}
