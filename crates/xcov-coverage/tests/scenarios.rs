//! End-to-end coverage scenarios over hand-built executables.

use std::io::Write;

use xcov_coverage::{
    Address, BranchClass, BranchPath, ExecutableContext, ExecutableId, InstructionLine, RangeKind,
    SymbolRegistry,
};

/// Register `lines` as `symbol` in `ctx` the way the disassembly parser does.
fn add_symbol(ctx: &mut ExecutableContext, symbol: &str, low: Address, high: Address, lines: &[InstructionLine]) {
    ctx.symbol_table_mut().add(symbol, low, high - low + 1);
    let map = ctx.create_coverage_map(symbol, low, high).unwrap();
    for line in lines {
        let addr = line.address.unwrap();
        map.set_instruction_start(addr);
        if line.is_branch {
            map.set_branch(addr);
        }
    }
}

fn resolve(registry: &mut SymbolRegistry, ctx: &ExecutableContext, symbol: &str, lines: Vec<InstructionLine>) {
    let entry = ctx.symbol_table().find(symbol).unwrap().clone();
    registry
        .adopt_instructions(symbol, entry.base_address, lines, ctx.id())
        .unwrap();
    registry.create_or_get_coverage_map(symbol, entry.size).unwrap();
}

#[test]
fn test_task_init_covered_across_two_executables() {
    let lines: Vec<_> = (0x400..=0x420)
        .step_by(4)
        .map(|a| InstructionLine::instruction(a, "insn"))
        .collect();

    let mut registry = SymbolRegistry::new();
    registry.insert("task_init");

    let mut a = ExecutableContext::new(ExecutableId(0), "a.exe");
    add_symbol(&mut a, "task_init", 0x400, 0x420, &lines);
    let mut b = ExecutableContext::new(ExecutableId(1), "b.exe");
    add_symbol(&mut b, "task_init", 0x400, 0x420, &lines);
    resolve(&mut registry, &a, "task_init", lines.clone());
    resolve(&mut registry, &b, "task_init", lines);

    for pc in (0x400..=0x410).step_by(4) {
        a.mark_executed(pc);
    }
    for pc in (0x408..=0x420).step_by(4) {
        b.mark_executed(pc);
    }
    a.merge_into(&mut registry).unwrap();
    b.merge_into(&mut registry).unwrap();
    registry.compute_uncovered();
    let totals = registry.compute_statistics().unwrap();

    let info = registry.find("task_init").unwrap();
    assert_eq!(info.source, Some(ExecutableId(0)));
    let unified = info.unified.as_ref().unwrap();
    assert!((0..=0x20).all(|offset| unified.was_executed(offset)));
    assert!(info.uncovered_ranges.is_empty());
    assert_eq!(totals.stats.size_in_bytes, 0x21);
    assert_eq!(totals.stats.uncovered_bytes, 0);
    assert_eq!(totals.stats.percent_executed_bytes(), 100);
}

#[test]
fn test_branch_always_taken_reports_fall_through() {
    let lines = vec![
        InstructionLine::instruction(0x450, "450:\tbeq 460").with_branch(Some(0x460)),
        InstructionLine::instruction(0x452, "452:\tmov"),
        InstructionLine::instruction(0x460, "460:\tret"),
    ];
    let mut registry = SymbolRegistry::new();
    registry.insert("check");
    let mut ctx = ExecutableContext::new(ExecutableId(0), "a.exe");
    add_symbol(&mut ctx, "check", 0x450, 0x461, &lines);
    resolve(&mut registry, &ctx, "check", lines);

    ctx.mark_executed(0x450);
    ctx.mark_executed(0x460);
    ctx.merge_into(&mut registry).unwrap();
    registry.compute_uncovered();
    let totals = registry.compute_statistics().unwrap();

    let info = registry.find("check").unwrap();
    assert_eq!(info.uncovered_branches.len(), 1);
    let branch = &info.uncovered_branches[0];
    assert_eq!(branch.start, 0x450);
    assert_eq!(branch.kind, RangeKind::Branch(BranchClass::AlwaysTaken));
    assert_eq!(branch.unexercised(), &[BranchPath::FallThrough]);
    assert_eq!(totals.stats.branches_always_taken, 1);
    assert_eq!(totals.stats.branches_uncovered(), 1);

    // The fall-through instruction itself is an uncovered range.
    assert_eq!(info.uncovered_ranges.len(), 1);
    assert_eq!(info.uncovered_ranges[0].start, 0x452);
    assert_eq!(info.uncovered_ranges[0].end, 0x45f);
}

#[test]
fn test_symbol_list_from_file_with_unresolved_symbol() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# analyzed\ntask_init\n\ntask_exit").unwrap();

    let mut registry = SymbolRegistry::new();
    assert_eq!(registry.load_file(file.path()).unwrap(), 2);
    registry
        .adopt_instructions("task_init", 0x400, Vec::new(), ExecutableId(0))
        .unwrap();
    registry.compute_uncovered();
    let totals = registry.compute_statistics().unwrap();

    assert_eq!(registry.unresolved().collect::<Vec<_>>(), vec!["task_exit"]);
    assert_eq!(totals.symbols, 2);
    assert_eq!(totals.unresolved_symbols, 1);
    assert_eq!(totals.stats.percent_uncovered_instructions(), 0);
}
