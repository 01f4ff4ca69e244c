//! Code emission: renders a block tree to source text through a per-kind
//! begin/current/end writer protocol driven by one shared recursive walk.

use std::fmt::Write;

use declass_ir::block::{Block, LoopKind};
use declass_ir::expr::{Expr, InvokeKind};
use declass_ir::stmt::{Statement, StatementKind};

/// Statement terminator of the emitted language.
const END_OF_STATEMENT: &str = ";";

/// Append-only text sink with indentation bookkeeping. Emission writes in
/// document order; there is no seeking or rewriting.
pub struct EmitterTarget {
    out: String,
    indent: usize,
}

impl EmitterTarget {
    pub fn new() -> Self {
        EmitterTarget { out: String::new(), indent: 0 }
    }

    /// Append one indented line.
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn outdent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

impl Default for EmitterTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-block-kind writer: three hooks applied around a block's children.
/// New block kinds supply a writer; the recursive driver stays unchanged.
pub trait BlockWriter {
    fn begin(&self, block: &Block, target: &mut EmitterTarget);
    fn current(&self, block: &Block, target: &mut EmitterTarget);
    fn end(&self, block: &Block, target: &mut EmitterTarget);
}

/// Recursive driver: begin, current, children, end. Siblings are emitted in
/// tree order, never reordered.
pub fn emit(block: &Block, target: &mut EmitterTarget) {
    let writer = writer_for(block);
    writer.begin(block, target);
    writer.current(block, target);
    for child in block.children() {
        emit(child, target);
    }
    writer.end(block, target);
}

/// Emit a whole tree into a fresh target and return the text.
pub fn emit_to_string(block: &Block) -> String {
    let mut target = EmitterTarget::new();
    emit(block, &mut target);
    target.into_string()
}

fn writer_for(block: &Block) -> &'static dyn BlockWriter {
    match block {
        Block::Statement(_) => &StatementWriter,
        Block::Sequence { .. } => &SequenceWriter,
        Block::Conditional { .. } => &ConditionalWriter,
        Block::Else { .. } => &ElseWriter,
        Block::Loop { .. } => &LoopWriter,
        Block::Try { .. } => &TryWriter,
        Block::Catch { .. } => &CatchWriter,
    }
}

struct SequenceWriter;

impl BlockWriter for SequenceWriter {
    fn begin(&self, block: &Block, target: &mut EmitterTarget) {
        if let Block::Sequence { unstructured: true, .. } = block {
            target.line("// unstructured control flow");
        }
    }
    fn current(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn end(&self, _block: &Block, _target: &mut EmitterTarget) {}
}

struct StatementWriter;

impl BlockWriter for StatementWriter {
    fn begin(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn current(&self, block: &Block, target: &mut EmitterTarget) {
        if let Block::Statement(stmt) = block {
            target.line(&statement_text(stmt));
        }
    }
    fn end(&self, _block: &Block, _target: &mut EmitterTarget) {}
}

struct ConditionalWriter;

impl BlockWriter for ConditionalWriter {
    fn begin(&self, block: &Block, target: &mut EmitterTarget) {
        if let Block::Conditional { cond, .. } = block {
            target.line(&format!("if ({}) {{", expr_text(cond)));
            target.indent();
        }
    }
    fn current(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn end(&self, _block: &Block, target: &mut EmitterTarget) {
        target.outdent();
        target.line("}");
    }
}

struct ElseWriter;

impl BlockWriter for ElseWriter {
    fn begin(&self, _block: &Block, target: &mut EmitterTarget) {
        target.outdent();
        target.line("} else {");
        target.indent();
    }
    fn current(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn end(&self, _block: &Block, _target: &mut EmitterTarget) {}
}

struct LoopWriter;

impl BlockWriter for LoopWriter {
    fn begin(&self, block: &Block, target: &mut EmitterTarget) {
        if let Block::Loop { kind, cond, .. } = block {
            match kind {
                LoopKind::PreTest => target.line(&format!("while ({}) {{", expr_text(cond))),
                LoopKind::PostTest => target.line("do {"),
            }
            target.indent();
        }
    }
    fn current(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn end(&self, block: &Block, target: &mut EmitterTarget) {
        if let Block::Loop { kind, cond, .. } = block {
            target.outdent();
            match kind {
                LoopKind::PreTest => target.line("}"),
                LoopKind::PostTest => {
                    target.line(&format!("}} while ({}){END_OF_STATEMENT}", expr_text(cond)))
                }
            }
        }
    }
}

struct TryWriter;

impl BlockWriter for TryWriter {
    fn begin(&self, _block: &Block, target: &mut EmitterTarget) {
        target.line("try {");
        target.indent();
    }
    fn current(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn end(&self, _block: &Block, target: &mut EmitterTarget) {
        target.outdent();
        target.line("}");
    }
}

struct CatchWriter;

impl BlockWriter for CatchWriter {
    fn begin(&self, block: &Block, target: &mut EmitterTarget) {
        if let Block::Catch { caught, var, .. } = block {
            let ty = caught.as_deref().unwrap_or("Throwable");
            target.outdent();
            target.line(&format!("}} catch ({} {var}) {{", simple_name(ty)));
            target.indent();
        }
    }
    fn current(&self, _block: &Block, _target: &mut EmitterTarget) {}
    fn end(&self, _block: &Block, _target: &mut EmitterTarget) {}
}

// --- statement rendering ---

fn statement_text(stmt: &Statement) -> String {
    match &stmt.kind {
        StatementKind::Assign { target, value, declares } => match declares {
            Some(ty) => format!(
                "{} {} = {}{END_OF_STATEMENT}",
                ty.source_name(),
                expr_text(target),
                expr_text(value)
            ),
            None => format!(
                "{} = {}{END_OF_STATEMENT}",
                expr_text(target),
                expr_text(value)
            ),
        },
        StatementKind::Expr(e) => format!("{}{END_OF_STATEMENT}", expr_text(e)),
        StatementKind::Inc { target, amount } => match amount {
            1 => format!("{}++{END_OF_STATEMENT}", expr_text(target)),
            -1 => format!("{}--{END_OF_STATEMENT}", expr_text(target)),
            n if *n < 0 => format!("{} -= {}{END_OF_STATEMENT}", expr_text(target), -n),
            n => format!("{} += {n}{END_OF_STATEMENT}", expr_text(target)),
        },
        StatementKind::Return(None) => format!("return{END_OF_STATEMENT}"),
        StatementKind::Return(Some(e)) => {
            format!("return {}{END_OF_STATEMENT}", expr_text(e))
        }
        StatementKind::Throw(e) => format!("throw {}{END_OF_STATEMENT}", expr_text(e)),
        StatementKind::Monitor { enter: true, object } => {
            format!("// monitor enter ({})", expr_text(object))
        }
        StatementKind::Monitor { enter: false, object } => {
            format!("// monitor exit ({})", expr_text(object))
        }
        // Residual jumps only survive inside unstructured fallback regions.
        StatementKind::Branch { cond, target } => {
            format!("// if ({}) jump to {target:#x}", expr_text(cond))
        }
        StatementKind::Jump { target } => format!("// jump to {target:#x}"),
        StatementKind::Break => format!("break{END_OF_STATEMENT}"),
        StatementKind::Continue => format!("continue{END_OF_STATEMENT}"),
    }
}

// --- expression rendering ---

fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Int(v) => format!("{v}"),
        Expr::Long(v) => format!("{v}L"),
        Expr::Float(v) => float_text(*v as f64, "f"),
        Expr::Double(v) => float_text(*v, ""),
        Expr::Str(s) => format!("\"{}\"", escape_string(s)),
        Expr::Class(name) => format!("{}.class", simple_name(name)),
        Expr::Bool(b) => format!("{b}"),
        Expr::Null => "null".into(),
        Expr::Local { name, .. } => name.clone(),
        Expr::This => "this".into(),
        Expr::CaughtException => "exception".into(),
        Expr::Binary { op, lhs, rhs } => {
            format!("{} {op} {}", paren_text(lhs), paren_text(rhs))
        }
        Expr::Unary { op, expr } => format!("{op}{}", paren_text(expr)),
        Expr::Compare { op, lhs, rhs } => {
            format!("{} {op} {}", paren_text(lhs), paren_text(rhs))
        }
        Expr::CmpSign { lhs, rhs } => {
            let l = paren_text(lhs);
            let r = paren_text(rhs);
            format!("({l} < {r} ? -1 : ({l} == {r} ? 0 : 1))")
        }
        Expr::Cast { ty, expr } => format!("({}) {}", ty.source_name(), paren_text(expr)),
        Expr::InstanceOf { expr, ty } => {
            format!("{} instanceof {}", paren_text(expr), simple_name(ty))
        }
        Expr::FieldAccess { object, field } => match object {
            Some(obj) => format!("{}.{}", paren_text(obj), field.name),
            None => format!("{}.{}", simple_name(&field.class_name), field.name),
        },
        Expr::ArrayIndex { array, index } => {
            format!("{}[{}]", paren_text(array), expr_text(index))
        }
        Expr::ArrayLength(array) => format!("{}.length", paren_text(array)),
        Expr::Call { kind, receiver, method, args } => {
            let args = arg_list(args);
            match receiver {
                Some(recv) if method.name == "<init>" => {
                    // Constructor chaining off `this` is a super call once
                    // the receiver's own class is out of the picture.
                    match recv.as_ref() {
                        Expr::This => format!("super({args})"),
                        other => format!("{}.{}({args})", paren_text(other), method.name),
                    }
                }
                Some(recv) => format!("{}.{}({args})", paren_text(recv), method.name),
                None => {
                    debug_assert_eq!(*kind, InvokeKind::Static);
                    format!("{}.{}({args})", simple_name(&method.class_name), method.name)
                }
            }
        }
        Expr::New { class_name, args } => {
            format!("new {}({})", simple_name(class_name), arg_list(args))
        }
        Expr::NewArray { elem, len } => {
            format!("new {}[{}]", elem.source_name(), expr_text(len))
        }
        Expr::Dup(inner) => expr_text(inner),
        Expr::UninitNew { class_name } => format!("new {}()", simple_name(class_name)),
        Expr::Placeholder(token) => format!("<{token}>"),
    }
}

/// Wrap composite sub-expressions so operator nesting stays unambiguous.
fn paren_text(expr: &Expr) -> String {
    match expr.unwrap_dup() {
        Expr::Binary { .. }
        | Expr::Compare { .. }
        | Expr::Unary { .. }
        | Expr::Cast { .. }
        | Expr::InstanceOf { .. } => format!("({})", expr_text(expr)),
        _ => expr_text(expr),
    }
}

fn arg_list(args: &[Expr]) -> String {
    args.iter().map(expr_text).collect::<Vec<_>>().join(", ")
}

fn float_text(v: f64, suffix: &str) -> String {
    if v.is_nan() {
        return if suffix == "f" { "Float.NaN".into() } else { "Double.NaN".into() };
    }
    if v.is_infinite() {
        let name = if suffix == "f" { "Float" } else { "Double" };
        return if v > 0.0 {
            format!("{name}.POSITIVE_INFINITY")
        } else {
            format!("{name}.NEGATIVE_INFINITY")
        };
    }
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}{suffix}", v)
    } else {
        format!("{v}{suffix}")
    }
}

/// Last segment of a possibly qualified class name.
fn simple_name(name: &str) -> &str {
    name.rsplit(['.', '/']).next().unwrap_or(name)
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
