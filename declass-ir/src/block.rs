use crate::expr::Expr;
use crate::stmt::Statement;

/// Half-open program-counter range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcRange {
    pub start: u32,
    pub end: u32,
}

impl PcRange {
    pub fn new(start: u32, end: u32) -> Self {
        PcRange { start, end }
    }

    pub fn contains(&self, pc: u32) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// Loop shape: where the condition is tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// `while (cond) { ... }`
    PreTest,
    /// `do { ... } while (cond);`
    PostTest,
}

/// A node of the structured-control-flow tree.
///
/// The else arm of a conditional and the catch clauses of a try block are
/// dedicated child-node kinds rather than fields, so the begin/current/end
/// emission protocol treats every seam (`} else {`, `} catch (...) {`)
/// uniformly. A `Conditional`'s children are its then-statements, optionally
/// followed by one trailing `Else` child; a `Try`'s children are its body
/// statements followed by its `Catch` children in handler order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Leaf statement.
    Statement(Statement),
    /// Ordered children; `unstructured` marks an irreducible-control-flow
    /// fallback region.
    Sequence {
        range: PcRange,
        children: Vec<Block>,
        unstructured: bool,
    },
    Conditional {
        range: PcRange,
        cond: Expr,
        children: Vec<Block>,
    },
    Else {
        range: PcRange,
        children: Vec<Block>,
    },
    Loop {
        range: PcRange,
        kind: LoopKind,
        cond: Expr,
        children: Vec<Block>,
    },
    Try {
        range: PcRange,
        children: Vec<Block>,
    },
    Catch {
        range: PcRange,
        /// Caught class name; `None` is the universal handler.
        caught: Option<String>,
        /// Binding name of the exception object.
        var: String,
        children: Vec<Block>,
    },
}

impl Block {
    /// The pc range this node spans.
    pub fn range(&self) -> PcRange {
        match self {
            Block::Statement(s) => PcRange::new(s.start_pc, s.end_pc),
            Block::Sequence { range, .. }
            | Block::Conditional { range, .. }
            | Block::Else { range, .. }
            | Block::Loop { range, .. }
            | Block::Try { range, .. }
            | Block::Catch { range, .. } => *range,
        }
    }

    /// Child nodes in emission order. Leaves have none.
    pub fn children(&self) -> &[Block] {
        match self {
            Block::Statement(_) => &[],
            Block::Sequence { children, .. }
            | Block::Conditional { children, .. }
            | Block::Else { children, .. }
            | Block::Loop { children, .. }
            | Block::Try { children, .. }
            | Block::Catch { children, .. } => children,
        }
    }

    /// Collect the pc ranges of all leaf statements, in tree order.
    pub fn leaf_ranges(&self, out: &mut Vec<PcRange>) {
        match self {
            Block::Statement(_) => out.push(self.range()),
            _ => {
                for child in self.children() {
                    child.leaf_ranges(out);
                }
            }
        }
    }

    /// Collect the covered pc ranges, in tree order: leaf statement ranges
    /// plus, for structural nodes, the sub-ranges of their own span not
    /// occupied by children (the branch/jump instructions consumed into the
    /// node's condition or seams). For a well-formed tree the union over the
    /// root is its full range, each pc covered exactly once.
    pub fn coverage(&self, out: &mut Vec<PcRange>) {
        match self {
            Block::Statement(_) => out.push(self.range()),
            _ => {
                let range = self.range();
                let mut cursor = range.start;
                for child in self.children() {
                    let child_range = child.range();
                    if cursor < child_range.start {
                        out.push(PcRange::new(cursor, child_range.start));
                    }
                    child.coverage(out);
                    cursor = cursor.max(child_range.end);
                }
                if cursor < range.end {
                    out.push(PcRange::new(cursor, range.end));
                }
            }
        }
    }
}
