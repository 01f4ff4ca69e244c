//! Block inference: re-imposes structured control flow (conditionals,
//! loops, try/catch) on the flat, pc-ordered statement list produced by the
//! evaluator, guided by the method's exception regions.

use declass_ir::block::{Block, LoopKind, PcRange};
use declass_ir::expr::{Expr, UnOp};
use declass_ir::stmt::{Statement, StatementKind};

use crate::context::MethodContext;
use crate::exception::ExceptionRegion;

/// Infer the structured block tree for the given statement list. The result
/// is always a root sequence spanning the whole method; irreducible control
/// flow degrades to annotated flat sequences, never to a failure.
pub fn infer_blocks(ctx: &MethodContext, statements: &[Statement]) -> Block {
    let code_len = ctx.code_len();
    let mut inferrer = Inferrer {
        stack: vec![OpenCtx {
            kind: CtxKind::Root,
            start_pc: 0,
            end_pc: code_len,
            children: Vec::new(),
        }],
        regions: ctx.regions(),
        region_opened: vec![false; ctx.regions().len()],
        spans: find_loop_spans(statements),
        pending_entry: None,
        code_len,
    };

    for stmt in statements {
        inferrer.close_at(stmt.start_pc);
        inferrer.open_at(stmt.start_pc);
        inferrer.feed(stmt.clone());
    }
    inferrer.close_at(code_len);

    // Anything still open at this point had a malformed span; fold it up.
    while inferrer.stack.len() > 1 {
        inferrer.close_one();
    }

    let root = inferrer.stack.pop().expect("root context");
    Block::Sequence {
        range: PcRange::new(0, code_len),
        children: root.children,
        unstructured: false,
    }
}

/// A loop recognized in the pre-pass: `start` is the back-edge target (the
/// header), `end` the pc just past the back-edge.
#[derive(Debug, Clone, Copy)]
struct LoopSpan {
    start: u32,
    end: u32,
}

/// Back-edge targets and their widest extent.
fn find_loop_spans(statements: &[Statement]) -> Vec<LoopSpan> {
    let mut spans: Vec<LoopSpan> = Vec::new();
    for stmt in statements {
        let Some(target) = stmt.kind.jump_target() else {
            continue;
        };
        if target > stmt.start_pc {
            continue;
        }
        match spans.iter_mut().find(|s| s.start == target) {
            Some(span) => span.end = span.end.max(stmt.end_pc),
            None => spans.push(LoopSpan { start: target, end: stmt.end_pc }),
        }
    }
    spans
}

/// The entry `goto` of a loop whose condition trails the body.
#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    jump_pc: u32,
    test_pc: u32,
}

/// One catch clause waiting to be walked.
#[derive(Debug, Clone)]
struct PendingCatch {
    handler_pc: u32,
    end_pc: u32,
    caught: Option<String>,
}

enum CtxKind {
    Root,
    Cond {
        cond: Expr,
    },
    /// Else arm being collected; carries the pieces of the conditional it
    /// completes.
    Else {
        cond_range: PcRange,
        cond: Expr,
        then_children: Vec<Block>,
    },
    Loop {
        header_pc: u32,
        entry_test: bool,
        kind: Option<LoopKind>,
        cond: Option<Expr>,
    },
    /// Try region while its body is being collected.
    TryBody {
        region_idx: usize,
    },
    /// Try whose body is done; catch blocks are appended as they close.
    TryCatches {
        queue: Vec<PendingCatch>,
        next: usize,
    },
    Catch {
        caught: Option<String>,
    },
}

struct OpenCtx {
    kind: CtxKind,
    start_pc: u32,
    end_pc: u32,
    children: Vec<Block>,
}

struct Inferrer<'a> {
    stack: Vec<OpenCtx>,
    regions: &'a [ExceptionRegion],
    region_opened: Vec<bool>,
    spans: Vec<LoopSpan>,
    pending_entry: Option<PendingEntry>,
    code_len: u32,
}

enum Open {
    Try(usize),
    Loop(LoopSpan),
}

impl<'a> Inferrer<'a> {
    fn top(&self) -> &OpenCtx {
        self.stack.last().expect("context stack never empty")
    }

    fn top_mut(&mut self) -> &mut OpenCtx {
        self.stack.last_mut().expect("context stack never empty")
    }

    fn attach(&mut self, block: Block) {
        self.top_mut().children.push(block);
    }

    /// Close every context whose span ends at or before `pc`.
    fn close_at(&mut self, pc: u32) {
        while self.stack.len() > 1 && self.top().end_pc <= pc {
            self.close_one();
        }
    }

    /// Close (or transition) the innermost open context.
    fn close_one(&mut self) {
        if let CtxKind::TryBody { region_idx } = self.top().kind {
            self.transition_try(region_idx);
            return;
        }

        let ctx = self.stack.pop().expect("context stack never empty");
        let range = PcRange::new(ctx.start_pc, ctx.end_pc);
        match ctx.kind {
            CtxKind::Root => unreachable!("root context never closes"),
            CtxKind::Cond { cond } => {
                let mut children = ctx.children;
                // A trailing forward jump out of the then-arm marks an else
                // arm reaching to the jump target.
                let else_target = match children.last() {
                    Some(Block::Statement(Statement {
                        kind: StatementKind::Jump { target },
                        ..
                    })) if *target > ctx.end_pc => Some(*target),
                    _ => None,
                };
                if let Some(target) = else_target {
                    children.pop();
                    let else_end = target.min(self.top().end_pc);
                    self.stack.push(OpenCtx {
                        kind: CtxKind::Else {
                            cond_range: range,
                            cond,
                            then_children: children,
                        },
                        start_pc: ctx.end_pc,
                        end_pc: else_end,
                        children: Vec::new(),
                    });
                } else {
                    self.attach(Block::Conditional { range, cond, children });
                }
            }
            CtxKind::Else {
                cond_range,
                cond,
                then_children,
            } => {
                let mut else_children = ctx.children;
                strip_trailing_jump(&mut else_children, ctx.end_pc);
                let mut children = then_children;
                children.push(Block::Else { range, children: else_children });
                self.attach(Block::Conditional {
                    range: PcRange::new(cond_range.start, ctx.end_pc),
                    cond,
                    children,
                });
            }
            CtxKind::Loop { kind, cond, .. } => {
                let (kind, cond) = match (kind, cond) {
                    (Some(kind), Some(cond)) => (kind, cond),
                    // No conditional edge found: an unconditional back-edge.
                    _ => (LoopKind::PreTest, Expr::Bool(true)),
                };
                self.attach(Block::Loop { range, kind, cond, children: ctx.children });
            }
            CtxKind::TryBody { .. } => unreachable!("transitioned above"),
            CtxKind::TryCatches { .. } => {
                self.attach(Block::Try { range, children: ctx.children });
            }
            CtxKind::Catch { caught } => {
                let mut children = ctx.children;
                strip_trailing_jump(&mut children, ctx.end_pc);
                let var = absorb_binding(&mut children).unwrap_or_else(|| "e".to_string());
                self.attach(Block::Catch { range, caught, var, children });

                // The parent is the owning try; line up its next catch.
                let pending = match &mut self.top_mut().kind {
                    CtxKind::TryCatches { queue, next } => {
                        let p = queue.get(*next).cloned();
                        *next += 1;
                        p
                    }
                    _ => None,
                };
                if let Some(p) = pending {
                    self.stack.push(OpenCtx {
                        kind: CtxKind::Catch { caught: p.caught },
                        start_pc: p.handler_pc,
                        end_pc: p.end_pc,
                        children: Vec::new(),
                    });
                }
            }
        }
    }

    /// Move a try context from its body phase to walking its catch clauses.
    fn transition_try(&mut self, region_idx: usize) {
        let regions = self.regions;
        let region = &regions[region_idx];
        let parent_end = self.stack[self.stack.len() - 2].end_pc;
        let code_len = self.code_len;

        let ctx = self.top_mut();
        // The try body's trailing jump skips the handlers; its target is
        // where control resumes after the whole construct.
        let post_try = match ctx.children.last() {
            Some(Block::Statement(Statement {
                kind: StatementKind::Jump { target },
                ..
            })) if *target >= ctx.end_pc => {
                let target = *target;
                ctx.children.pop();
                Some(target)
            }
            _ => None,
        };

        let mut handlers: Vec<_> = region
            .handlers()
            .iter()
            .filter(|h| h.pc >= region.end_pc())
            .cloned()
            .collect();
        handlers.sort_by_key(|h| h.pc);

        let last_end = post_try.unwrap_or(code_len).min(parent_end);
        let mut queue = Vec::with_capacity(handlers.len());
        for (i, handler) in handlers.iter().enumerate() {
            let end = match handlers.get(i + 1) {
                Some(next) => next.pc,
                None => last_end.max(handler.pc),
            };
            if end <= handler.pc {
                log::warn!("dropping degenerate catch clause at pc {:#x}", handler.pc);
                continue;
            }
            queue.push(PendingCatch {
                handler_pc: handler.pc,
                end_pc: end,
                caught: handler.caught_type.clone(),
            });
        }

        let first = queue.first().cloned();
        ctx.end_pc = queue.last().map(|c| c.end_pc).unwrap_or(ctx.end_pc);
        ctx.kind = CtxKind::TryCatches {
            queue,
            next: if first.is_some() { 1 } else { 0 },
        };
        if let Some(p) = first {
            self.stack.push(OpenCtx {
                kind: CtxKind::Catch { caught: p.caught },
                start_pc: p.handler_pc,
                end_pc: p.end_pc,
                children: Vec::new(),
            });
        }
    }

    /// Open every try region and loop span starting at `pc`, widest first.
    fn open_at(&mut self, pc: u32) {
        let mut opens: Vec<(u32, Open)> = Vec::new();
        for (idx, region) in self.regions.iter().enumerate() {
            if region.start_pc() == pc && !self.region_opened[idx] {
                opens.push((region.end_pc(), Open::Try(idx)));
            }
        }
        if let Some(pos) = self.spans.iter().position(|s| s.start == pc) {
            let span = self.spans.remove(pos);
            opens.push((span.end, Open::Loop(span)));
        }
        opens.sort_by(|a, b| b.0.cmp(&a.0));

        for (end, open) in opens {
            if end > self.top().end_pc {
                log::warn!(
                    "control-flow span [{pc:#x}, {end:#x}) crosses an enclosing structure; leaving it flat"
                );
                if let Open::Try(idx) = open {
                    self.region_opened[idx] = true;
                }
                continue;
            }
            match open {
                Open::Try(idx) => {
                    self.region_opened[idx] = true;
                    self.stack.push(OpenCtx {
                        kind: CtxKind::TryBody { region_idx: idx },
                        start_pc: pc,
                        end_pc: end,
                        children: Vec::new(),
                    });
                }
                Open::Loop(span) => {
                    let entry = self
                        .pending_entry
                        .take()
                        .filter(|p| p.test_pc > span.start && p.test_pc < span.end);
                    self.stack.push(OpenCtx {
                        kind: CtxKind::Loop {
                            header_pc: span.start,
                            entry_test: entry.is_some(),
                            kind: None,
                            cond: None,
                        },
                        start_pc: entry.map(|p| p.jump_pc).unwrap_or(span.start),
                        end_pc: span.end,
                        children: Vec::new(),
                    });
                }
            }
        }
        self.pending_entry = None;
    }

    fn feed(&mut self, stmt: Statement) {
        match &stmt.kind {
            StatementKind::Branch { cond, target } => {
                let (cond, target) = (cond.clone(), *target);
                if target > stmt.start_pc {
                    self.feed_forward_branch(stmt, cond, target);
                } else {
                    self.feed_backward_branch(stmt, cond, target);
                }
            }
            StatementKind::Jump { target } => {
                let target = *target;
                if target > stmt.start_pc {
                    self.feed_forward_jump(stmt, target);
                } else {
                    self.feed_backward_jump(stmt, target);
                }
            }
            _ => self.attach(Block::Statement(stmt)),
        }
    }

    fn feed_forward_branch(&mut self, stmt: Statement, cond: Expr, target: u32) {
        // Loop exit takes precedence over ambiguous conditional detection
        // when the branch target coincides with the innermost loop's end.
        if let Some((idx, loop_end, cond_unset)) = self.innermost_loop() {
            if loop_end == target {
                let is_header_test =
                    cond_unset && idx == self.stack.len() - 1 && self.stack[idx].children.is_empty();
                if is_header_test {
                    // The loop's own exit test: branch taken leaves the loop.
                    if let CtxKind::Loop { cond: c, kind: k, .. } = &mut self.stack[idx].kind {
                        *c = Some(negate(cond));
                        *k = Some(LoopKind::PreTest);
                    }
                } else {
                    // A later exit: `if (cond) break;`
                    let range = PcRange::new(stmt.start_pc, stmt.end_pc);
                    let brk = Statement::new(stmt.start_pc, stmt.end_pc, StatementKind::Break);
                    self.attach(Block::Conditional {
                        range,
                        cond,
                        children: vec![Block::Statement(brk)],
                    });
                }
                return;
            }
        }

        if target <= self.top().end_pc {
            // Plain forward conditional: the branch jumps over the then-arm.
            self.stack.push(OpenCtx {
                kind: CtxKind::Cond { cond: negate(cond) },
                start_pc: stmt.start_pc,
                end_pc: target,
                children: Vec::new(),
            });
        } else {
            self.fallback(stmt, "forward branch crosses enclosing structure");
        }
    }

    fn feed_backward_branch(&mut self, stmt: Statement, cond: Expr, target: u32) {
        if self.is_defining_back_edge(&stmt, target) {
            let entry_test = match &self.top().kind {
                CtxKind::Loop { entry_test, cond, .. } if cond.is_none() => Some(*entry_test),
                _ => None,
            };
            if let Some(entry_test) = entry_test {
                if let CtxKind::Loop { kind, cond: loop_cond, .. } = &mut self.top_mut().kind {
                    // Branch taken re-enters the loop, so this is the
                    // continue condition as written.
                    *loop_cond = Some(cond);
                    *kind = Some(if entry_test {
                        LoopKind::PreTest
                    } else {
                        LoopKind::PostTest
                    });
                }
                return;
            }
        }
        if self.open_loop_with_header(target) {
            // A back-edge that is not the defining one: `if (cond) continue;`
            let range = PcRange::new(stmt.start_pc, stmt.end_pc);
            let cont = Statement::new(stmt.start_pc, stmt.end_pc, StatementKind::Continue);
            self.attach(Block::Conditional {
                range,
                cond,
                children: vec![Block::Statement(cont)],
            });
            return;
        }
        self.fallback(stmt, "backward branch without a matching loop");
    }

    fn feed_forward_jump(&mut self, stmt: Statement, target: u32) {
        // Jump to the innermost loop's end: a break.
        if self.innermost_loop().map(|(_, end, _)| end) == Some(target) {
            let brk = Statement::new(stmt.start_pc, stmt.end_pc, StatementKind::Break);
            self.attach(Block::Statement(brk));
            return;
        }
        // Entry jump of a loop whose condition trails the body: the next
        // statement starts a loop span containing the jump target.
        if self
            .spans
            .iter()
            .any(|s| s.start == stmt.end_pc && target > s.start && target < s.end)
        {
            self.pending_entry = Some(PendingEntry {
                jump_pc: stmt.start_pc,
                test_pc: target,
            });
            return;
        }
        // Otherwise keep the jump; closing contexts recognize trailing jumps
        // as else/post-try markers, anything left over stays a flat leaf.
        self.attach(Block::Statement(stmt));
    }

    fn feed_backward_jump(&mut self, stmt: Statement, target: u32) {
        if self.is_defining_back_edge(&stmt, target) {
            // Unconditional back-edge: the loop closes with no exit test.
            return;
        }
        if self.open_loop_with_header(target) {
            let cont = Statement::new(stmt.start_pc, stmt.end_pc, StatementKind::Continue);
            self.attach(Block::Statement(cont));
            return;
        }
        self.fallback(stmt, "backward jump without a matching loop");
    }

    /// Whether `stmt` is the back-edge delimiting the innermost open loop:
    /// it targets the loop header and ends on the loop's end pc.
    fn is_defining_back_edge(&self, stmt: &Statement, target: u32) -> bool {
        match &self.top().kind {
            CtxKind::Loop { header_pc, .. } => {
                *header_pc == target && stmt.end_pc >= self.top().end_pc
            }
            _ => false,
        }
    }

    /// Innermost open loop: (stack index, end pc, condition still unset).
    fn innermost_loop(&self) -> Option<(usize, u32, bool)> {
        self.stack
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, ctx)| match &ctx.kind {
                CtxKind::Loop { cond, .. } => Some((i, ctx.end_pc, cond.is_none())),
                _ => None,
            })
    }

    /// Is a loop with this header pc currently open?
    fn open_loop_with_header(&self, header: u32) -> bool {
        self.stack
            .iter()
            .any(|ctx| matches!(ctx.kind, CtxKind::Loop { header_pc, .. } if header_pc == header))
    }

    /// Irreducible control flow: keep the statement, annotated, and move on.
    fn fallback(&mut self, stmt: Statement, reason: &str) {
        log::warn!(
            "unstructured control flow at pc {:#x}: {reason}",
            stmt.start_pc
        );
        let range = PcRange::new(stmt.start_pc, stmt.end_pc);
        self.attach(Block::Sequence {
            range,
            children: vec![Block::Statement(stmt)],
            unstructured: true,
        });
    }
}

/// Drop a trailing jump that leaves the block for its join point.
fn strip_trailing_jump(children: &mut Vec<Block>, end_pc: u32) {
    if let Some(Block::Statement(Statement {
        kind: StatementKind::Jump { target },
        ..
    })) = children.last()
    {
        if *target >= end_pc {
            children.pop();
        }
    }
}

/// Take the handler's leading caught-exception store as the catch binding.
fn absorb_binding(children: &mut Vec<Block>) -> Option<String> {
    let name = match children.first() {
        Some(Block::Statement(Statement {
            kind:
                StatementKind::Assign {
                    target: Expr::Local { name, .. },
                    value,
                    ..
                },
            ..
        })) if matches!(value.unwrap_dup(), Expr::CaughtException) => Some(name.clone()),
        _ => None,
    };
    if name.is_some() {
        children.remove(0);
    }
    name
}

/// Negate a branch condition, folding comparisons and double negation.
fn negate(cond: Expr) -> Expr {
    match cond {
        Expr::Compare { op, lhs, rhs } => Expr::Compare { op: op.negate(), lhs, rhs },
        Expr::Unary { op: UnOp::Not, expr } => *expr,
        Expr::Bool(b) => Expr::Bool(!b),
        other => Expr::Unary { op: UnOp::Not, expr: Box::new(other) },
    }
}
