use thiserror::Error;

/// The external instruction decoder could not parse a method's byte payload.
#[derive(Debug, Clone, Error)]
#[error("malformed bytecode: {message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        DecodeError { message: message.into() }
    }
}

/// Fatal evaluation conditions. Both abort the current method's evaluation
/// only; the statements produced before the failing pc are still returned.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("operand stack underflow at pc {pc:#x} ({mnemonic})")]
    StackUnderflow { pc: u32, mnemonic: &'static str },

    #[error("unsupported instruction {mnemonic} at pc {pc:#x}")]
    UnsupportedOpcode { pc: u32, mnemonic: &'static str },
}

/// A method-scoped pipeline failure, surfaced to the caller alongside
/// whatever partial output the pipeline still produced.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, Error>;
