mod common;

use common::*;
use declass_decompiler::evaluator::evaluate;
use declass_decompiler::inferrer::infer_blocks;
use declass_ir::block::{Block, LoopKind, PcRange};
use declass_ir::expr::{CompareOp, Expr, JavaType};
use declass_ir::stmt::StatementKind;
use declass_isa::Opcode;

fn infer(ctx: &declass_decompiler::MethodContext) -> Block {
    let eval = evaluate(ctx);
    assert!(eval.error.is_none(), "evaluation failed: {:?}", eval.error);
    infer_blocks(ctx, &eval.statements)
}

/// Assert the coverage invariant: the tree tiles [0, code_len) exactly once.
fn assert_covers(root: &Block, code_len: u32) {
    let mut ranges = Vec::new();
    root.coverage(&mut ranges);
    ranges.retain(|r| r.start < r.end);
    ranges.sort_by_key(|r| r.start);
    let mut cursor = 0;
    for range in &ranges {
        assert_eq!(
            range.start, cursor,
            "coverage gap or overlap at pc {cursor:#x} in {ranges:?}"
        );
        cursor = range.end;
    }
    assert_eq!(cursor, code_len, "coverage stops short in {ranges:?}");
}

// --- straight-line code ---

#[test]
fn single_statement_method_yields_single_leaf_root() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "a"), (2, "b")]);
    let ctx = context(
        vec![
            insn_slot(0, Opcode::Iload, 1),
            insn_slot(1, Opcode::Iload, 2),
            insn(2, Opcode::Add),
            insn(3, Opcode::ReturnValue),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    match &root {
        Block::Sequence { range, children, unstructured } => {
            assert_eq!(*range, PcRange::new(0, 4));
            assert!(!unstructured);
            assert_eq!(children.len(), 1);
            assert!(matches!(children[0], Block::Statement(_)));
        }
        other => panic!("expected root sequence, got {other:?}"),
    }
    assert_covers(&root, 4);
}

#[test]
fn empty_instruction_sequence_degrades_to_empty_tree() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::default();
    let ctx = context(vec![], &[], &resolver, &vars);

    let root = infer(&ctx);
    match &root {
        Block::Sequence { range, children, .. } => {
            assert_eq!(*range, PcRange::new(0, 0));
            assert!(children.is_empty());
        }
        other => panic!("expected empty root sequence, got {other:?}"),
    }
}

// --- conditionals ---

#[test]
fn forward_branch_around_one_statement_is_then_only_conditional() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "a"), (2, "b")]);
    let ctx = context(
        vec![
            insn_slot(0, Opcode::Iload, 1),
            insn_target(1, Opcode::IfEq, 4),
            insn_int(2, Opcode::Iconst, 1),
            insn_slot(3, Opcode::Istore, 2),
            insn(4, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let children = root.children();
    assert_eq!(children.len(), 2, "conditional plus trailing return");
    match &children[0] {
        Block::Conditional { range, cond, children } => {
            assert_eq!(*range, PcRange::new(0, 4));
            // Branch-taken (a == 0) skips the body, so the if-condition is
            // the negation.
            assert_eq!(
                *cond,
                Expr::Compare {
                    op: CompareOp::Ne,
                    lhs: Box::new(Expr::Local { slot: 1, name: "a".into() }),
                    rhs: Box::new(Expr::Int(0)),
                }
            );
            assert_eq!(children.len(), 1, "then-child only, no else");
            assert!(matches!(children[0], Block::Statement(_)));
        }
        other => panic!("expected conditional, got {other:?}"),
    }
    assert_covers(&root, 5);
}

#[test]
fn then_goto_over_alternative_recovers_else_arm() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "a"), (2, "b")]);
    let ctx = context(
        vec![
            insn_slot(0, Opcode::Iload, 1),
            insn_target(1, Opcode::IfEq, 5),
            insn_int(2, Opcode::Iconst, 1),
            insn_slot(3, Opcode::Istore, 2),
            insn_target(4, Opcode::Goto, 7),
            insn_int(5, Opcode::Iconst, 2),
            insn_slot(6, Opcode::Istore, 2),
            insn(7, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let children = root.children();
    assert_eq!(children.len(), 2);
    match &children[0] {
        Block::Conditional { range, children, .. } => {
            assert_eq!(*range, PcRange::new(0, 7));
            assert_eq!(children.len(), 2, "then statement plus else child");
            assert!(matches!(children[0], Block::Statement(_)));
            match &children[1] {
                Block::Else { range, children } => {
                    assert_eq!(*range, PcRange::new(5, 7));
                    assert_eq!(children.len(), 1);
                }
                other => panic!("expected else child, got {other:?}"),
            }
        }
        other => panic!("expected conditional, got {other:?}"),
    }
    assert_covers(&root, 8);
}

// --- loops ---

#[test]
fn backward_branch_is_a_loop_not_a_conditional() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "i")]);
    let ctx = context(
        vec![
            insn_int(0, Opcode::Iconst, 0),
            insn_slot(1, Opcode::Istore, 1),
            iinc(2, 1, 1),
            insn_slot(3, Opcode::Iload, 1),
            insn_int(4, Opcode::Iconst, 10),
            insn_target(5, Opcode::IfCmpLt, 2),
            insn(6, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let children = root.children();
    assert_eq!(children.len(), 3, "declaration, loop, return");
    match &children[1] {
        Block::Loop { range, kind, cond, children } => {
            assert_eq!(*range, PcRange::new(2, 6));
            assert_eq!(*kind, LoopKind::PostTest);
            assert_eq!(
                *cond,
                Expr::Compare {
                    op: CompareOp::Lt,
                    lhs: Box::new(Expr::Local { slot: 1, name: "i".into() }),
                    rhs: Box::new(Expr::Int(10)),
                }
            );
            assert_eq!(children.len(), 1);
        }
        other => panic!("expected post-test loop, got {other:?}"),
    }
    assert_covers(&root, 7);
}

#[test]
fn head_tested_loop_becomes_while() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "i")]);
    let ctx = context(
        vec![
            insn_slot(0, Opcode::Iload, 1),
            insn_target(1, Opcode::IfLe, 4),
            iinc(2, 1, -1),
            insn_target(3, Opcode::Goto, 0),
            insn(4, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let children = root.children();
    assert_eq!(children.len(), 2);
    match &children[0] {
        Block::Loop { range, kind, cond, children } => {
            assert_eq!(*range, PcRange::new(0, 4));
            assert_eq!(*kind, LoopKind::PreTest);
            // Branch taken (i <= 0) exits, so the loop runs while i > 0.
            assert_eq!(
                *cond,
                Expr::Compare {
                    op: CompareOp::Gt,
                    lhs: Box::new(Expr::Local { slot: 1, name: "i".into() }),
                    rhs: Box::new(Expr::Int(0)),
                }
            );
            assert_eq!(children.len(), 1);
        }
        other => panic!("expected while loop, got {other:?}"),
    }
    assert_covers(&root, 5);
}

#[test]
fn entry_jump_to_trailing_test_becomes_while() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "i")]);
    let ctx = context(
        vec![
            insn_target(0, Opcode::Goto, 2),
            iinc(1, 1, -1),
            insn_slot(2, Opcode::Iload, 1),
            insn_target(3, Opcode::IfGt, 1),
            insn(4, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let children = root.children();
    assert_eq!(children.len(), 2);
    match &children[0] {
        Block::Loop { range, kind, cond, children } => {
            // The entry jump is part of the loop's span.
            assert_eq!(*range, PcRange::new(0, 4));
            assert_eq!(*kind, LoopKind::PreTest);
            // Branch taken re-enters the body: loop runs while i > 0.
            assert_eq!(
                *cond,
                Expr::Compare {
                    op: CompareOp::Gt,
                    lhs: Box::new(Expr::Local { slot: 1, name: "i".into() }),
                    rhs: Box::new(Expr::Int(0)),
                }
            );
            assert_eq!(children.len(), 1);
        }
        other => panic!("expected while loop, got {other:?}"),
    }
    assert_covers(&root, 5);
}

#[test]
fn unconditional_back_edge_is_an_infinite_loop() {
    let resolver = MapResolver::empty()
        .with_method(1, static_method("Util", "tick", vec![], JavaType::Void));
    let vars = MapVarTable::default();
    let ctx = context(
        vec![
            insn_pool(0, Opcode::InvokeStatic, 1),
            insn_target(1, Opcode::Goto, 0),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    match &root.children()[0] {
        Block::Loop { kind, cond, children, .. } => {
            assert_eq!(*kind, LoopKind::PreTest);
            assert_eq!(*cond, Expr::Bool(true));
            assert_eq!(children.len(), 1);
        }
        other => panic!("expected infinite loop, got {other:?}"),
    }
    assert_covers(&root, 2);
}

#[test]
fn branch_to_loop_end_synthesizes_break() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "i"), (2, "j")]);
    let ctx = context(
        vec![
            insn_slot(0, Opcode::Iload, 1),
            insn_target(1, Opcode::IfLe, 6),
            insn_slot(2, Opcode::Iload, 2),
            insn_target(3, Opcode::IfNe, 6),
            iinc(4, 1, 1),
            insn_target(5, Opcode::Goto, 0),
            insn(6, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    match &root.children()[0] {
        Block::Loop { kind, children, .. } => {
            assert_eq!(*kind, LoopKind::PreTest);
            assert_eq!(children.len(), 2, "break conditional plus increment");
            match &children[0] {
                Block::Conditional { cond, children, .. } => {
                    // Loop exit keeps the branch-taken condition as written.
                    assert_eq!(
                        *cond,
                        Expr::Compare {
                            op: CompareOp::Ne,
                            lhs: Box::new(Expr::Local { slot: 2, name: "j".into() }),
                            rhs: Box::new(Expr::Int(0)),
                        }
                    );
                    assert_eq!(children.len(), 1);
                    match &children[0] {
                        Block::Statement(stmt) => {
                            assert_eq!(stmt.kind, StatementKind::Break)
                        }
                        other => panic!("expected break leaf, got {other:?}"),
                    }
                }
                other => panic!("expected break conditional, got {other:?}"),
            }
        }
        other => panic!("expected loop, got {other:?}"),
    }
    assert_covers(&root, 7);
}

// --- try/catch ---

#[test]
fn exception_region_becomes_try_with_catch() {
    let resolver = MapResolver::empty()
        .with_method(1, static_method("Util", "run", vec![], JavaType::Void));
    let vars = MapVarTable::named(&[(1, "e")]);
    let ctx = context(
        vec![
            insn_pool(0, Opcode::InvokeStatic, 1),
            insn_target(1, Opcode::Goto, 4),
            insn_slot(2, Opcode::Astore, 1),
            insn_pool(3, Opcode::InvokeStatic, 1),
            insn(4, Opcode::Return),
        ],
        &[handler(0, 2, 2, Some("IOException"))],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let children = root.children();
    assert_eq!(children.len(), 2, "try block plus trailing return");
    match &children[0] {
        Block::Try { range, children } => {
            assert_eq!(*range, PcRange::new(0, 4));
            assert_eq!(children.len(), 2, "body statement plus one catch");
            assert!(matches!(children[0], Block::Statement(_)));
            match &children[1] {
                Block::Catch { range, caught, var, children } => {
                    assert_eq!(*range, PcRange::new(2, 4));
                    assert_eq!(caught.as_deref(), Some("IOException"));
                    assert_eq!(var, "e", "binding taken from the handler store");
                    assert_eq!(children.len(), 1, "binding store absorbed");
                }
                other => panic!("expected catch child, got {other:?}"),
            }
        }
        other => panic!("expected try block, got {other:?}"),
    }
    assert_covers(&root, 5);
}

#[test]
fn merged_region_yields_one_try_with_two_catches() {
    let resolver = MapResolver::empty()
        .with_method(1, static_method("Util", "run", vec![], JavaType::Void));
    let vars = MapVarTable::named(&[(1, "e1"), (2, "e2")]);
    let ctx = context(
        vec![
            insn_pool(0, Opcode::InvokeStatic, 1),
            insn_target(1, Opcode::Goto, 6),
            insn_slot(2, Opcode::Astore, 1),
            insn_target(3, Opcode::Goto, 6),
            insn_slot(4, Opcode::Astore, 2),
            insn_pool(5, Opcode::InvokeStatic, 1),
            insn(6, Opcode::Return),
        ],
        &[
            handler(0, 2, 2, Some("IOException")),
            handler(0, 2, 4, Some("RuntimeException")),
        ],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    match &root.children()[0] {
        Block::Try { children, .. } => {
            assert_eq!(children.len(), 3, "one body statement plus two catches");
            match (&children[1], &children[2]) {
                (
                    Block::Catch { caught: c1, var: v1, children: k1, .. },
                    Block::Catch { caught: c2, var: v2, children: k2, .. },
                ) => {
                    assert_eq!(c1.as_deref(), Some("IOException"));
                    assert_eq!(v1, "e1");
                    assert!(k1.is_empty(), "binding and join jump both absorbed");
                    assert_eq!(c2.as_deref(), Some("RuntimeException"));
                    assert_eq!(v2, "e2");
                    assert_eq!(k2.len(), 1);
                }
                other => panic!("expected two catches, got {other:?}"),
            }
        }
        other => panic!("expected try block, got {other:?}"),
    }
    assert_covers(&root, 7);
}

// --- fallback ---

#[test]
fn crossing_branch_degrades_to_annotated_flat_block() {
    let resolver = MapResolver::empty();
    let vars = MapVarTable::named(&[(1, "a"), (2, "b")]);
    let ctx = context(
        vec![
            insn_slot(0, Opcode::Iload, 1),
            insn_target(1, Opcode::IfEq, 4),
            insn_slot(2, Opcode::Iload, 2),
            insn_target(3, Opcode::IfEq, 6),
            insn(4, Opcode::Return),
            insn(5, Opcode::Nop),
            insn(6, Opcode::Return),
        ],
        &[],
        &resolver,
        &vars,
    );

    let root = infer(&ctx);
    let conditional = &root.children()[0];
    let inner = &conditional.children()[0];
    match inner {
        Block::Sequence { unstructured, children, .. } => {
            assert!(*unstructured, "crossing branch must be annotated");
            assert!(matches!(
                children[0],
                Block::Statement(declass_ir::stmt::Statement {
                    kind: StatementKind::Branch { .. },
                    ..
                })
            ));
        }
        other => panic!("expected unstructured fallback, got {other:?}"),
    }
}
