use std::fmt;

use declass_isa::ValueKind;

/// A source-level data type recovered from the bytecode.
#[derive(Debug, Clone, PartialEq)]
pub enum JavaType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Byte,
    Char,
    Short,
    Void,
    /// Class or interface type, by source name.
    Reference(String),
    Array(Box<JavaType>),
    Unknown,
}

impl JavaType {
    /// Occupies two operand-stack slots in the original encoding.
    pub fn is_wide(&self) -> bool {
        matches!(self, JavaType::Long | JavaType::Double)
    }

    /// Name as written in source.
    pub fn source_name(&self) -> String {
        match self {
            JavaType::Int => "int".into(),
            JavaType::Long => "long".into(),
            JavaType::Float => "float".into(),
            JavaType::Double => "double".into(),
            JavaType::Boolean => "boolean".into(),
            JavaType::Byte => "byte".into(),
            JavaType::Char => "char".into(),
            JavaType::Short => "short".into(),
            JavaType::Void => "void".into(),
            JavaType::Reference(name) => name.clone(),
            JavaType::Array(inner) => format!("{}[]", inner.source_name()),
            JavaType::Unknown => "Object".into(),
        }
    }

    /// Element type of an array type, `Unknown` otherwise.
    pub fn element(&self) -> JavaType {
        match self {
            JavaType::Array(inner) => (**inner).clone(),
            _ => JavaType::Unknown,
        }
    }
}

impl From<ValueKind> for JavaType {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => JavaType::Int,
            ValueKind::Long => JavaType::Long,
            ValueKind::Float => JavaType::Float,
            ValueKind::Double => JavaType::Double,
            ValueKind::Ref => JavaType::Unknown,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        };
        f.write_str(s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        };
        f.write_str(s)
    }
}

/// Comparison operators used in branch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CompareOp {
    /// The comparison that holds exactly when this one does not.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        };
        f.write_str(s)
    }
}

/// Invocation kind of a resolved method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub class_name: String,
    pub name: String,
    pub ty: JavaType,
}

/// A resolved method reference.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub class_name: String,
    pub name: String,
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

/// Expression tree node: a value-producing computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals.
    Int(i64),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Class(String),
    Bool(bool),
    Null,

    // Variables.
    Local { slot: u16, name: String },
    This,
    /// The exception object live at a handler's entry.
    CaughtException,

    // Operations.
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, expr: Box<Expr> },
    Compare { op: CompareOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Three-way comparison result (-1/0/1), before it is folded into a
    /// branch condition.
    CmpSign { lhs: Box<Expr>, rhs: Box<Expr> },
    Cast { ty: JavaType, expr: Box<Expr> },
    InstanceOf { expr: Box<Expr>, ty: String },

    // Field and array access.
    FieldAccess { object: Option<Box<Expr>>, field: FieldRef },
    ArrayIndex { array: Box<Expr>, index: Box<Expr> },
    ArrayLength(Box<Expr>),

    // Invocation and allocation.
    Call {
        kind: InvokeKind,
        receiver: Option<Box<Expr>>,
        method: MethodRef,
        args: Vec<Expr>,
    },
    New { class_name: String, args: Vec<Expr> },
    NewArray { elem: JavaType, len: Box<Expr> },

    // Stack bookkeeping, eliminated before emission where possible.
    /// A duplicate of another stack value, keeping its provenance.
    Dup(Box<Expr>),
    /// Allocation whose constructor has not run yet.
    UninitNew { class_name: String },

    /// Fallback when a symbolic reference could not be resolved.
    Placeholder(String),
}

impl Expr {
    /// Strip `Dup` wrappers.
    pub fn unwrap_dup(&self) -> &Expr {
        match self {
            Expr::Dup(inner) => inner.unwrap_dup(),
            other => other,
        }
    }

    /// Whether discarding this expression would lose an observable effect.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Expr::Call { .. } | Expr::New { .. } | Expr::Placeholder(_)
        )
    }
}
