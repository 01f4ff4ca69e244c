//! Decompilation pipeline for stack-machine bytecode: abstract
//! interpretation into a flat statement list, structured-control-flow
//! recovery, and source-text emission.

pub mod context;
pub mod emitter;
pub mod error;
pub mod evaluator;
pub mod exception;
pub mod inferrer;

pub use context::{Constant, ConstantResolver, InstructionDecoder, MethodContext, VariableTable};
pub use error::{DecodeError, Error, EvalError};

/// Output of one method's pipeline run. `source` is always present; a
/// decode or evaluation failure leaves it partial but inspectable.
#[derive(Debug)]
pub struct Decompilation {
    pub source: String,
    pub failure: Option<Error>,
}

/// Run the full pipeline over the method bound in `ctx`: evaluate the
/// instruction sequence, infer the block tree, emit source text.
pub fn decompile_method(ctx: &MethodContext) -> Decompilation {
    let evaluation = evaluator::evaluate(ctx);
    let root = inferrer::infer_blocks(ctx, &evaluation.statements);
    let source = emitter::emit_to_string(&root);

    let failure = ctx
        .decode_error()
        .cloned()
        .map(Error::Decode)
        .or_else(|| evaluation.error.map(Error::Eval));
    Decompilation { source, failure }
}
