//! Merge order and repetition must not change the unified result.

use proptest::prelude::*;
use xcov_coverage::{
    Address, CoverageMap, ExecutableContext, ExecutableId, InstructionLine, SymbolRegistry,
};

const BASE: Address = 0x400;
const SIZE: u32 = 0x40;

fn instructions() -> Vec<InstructionLine> {
    (BASE..BASE + SIZE)
        .step_by(4)
        .map(|addr| {
            let line = InstructionLine::instruction(addr, format!("{addr:x}:\tinsn"));
            if addr % 16 == 4 {
                line.with_branch(Some(addr + 8))
            } else {
                line
            }
        })
        .collect()
}

fn executable(id: usize, trace: &[Address]) -> ExecutableContext {
    let mut ctx = ExecutableContext::new(ExecutableId(id), format!("exe{id}"));
    ctx.symbol_table_mut().add("f", BASE, SIZE);
    let map = ctx.create_coverage_map("f", BASE, BASE + SIZE - 1).unwrap();
    for line in instructions() {
        let addr = line.address.unwrap();
        map.set_instruction_start(addr);
        if line.is_branch {
            map.set_branch(addr);
        }
    }
    for &pc in trace {
        ctx.mark_executed(pc);
    }
    ctx
}

fn registry() -> SymbolRegistry {
    let mut registry = SymbolRegistry::new();
    registry.insert("f");
    registry
        .adopt_instructions("f", BASE, instructions(), ExecutableId(0))
        .unwrap();
    registry.create_or_get_coverage_map("f", SIZE).unwrap();
    registry
}

fn unified(registry: &SymbolRegistry) -> CoverageMap {
    registry.find("f").unwrap().unified.clone().unwrap()
}

fn trace_strategy() -> impl Strategy<Value = Vec<Address>> {
    prop::collection::vec((0u32..SIZE / 4).prop_map(|i| BASE + i * 4), 0..16)
}

proptest! {
    #[test]
    fn prop_merging_twice_equals_once(trace in trace_strategy()) {
        let ctx = executable(0, &trace);

        let mut once = registry();
        ctx.merge_into(&mut once).unwrap();

        let mut twice = registry();
        ctx.merge_into(&mut twice).unwrap();
        ctx.merge_into(&mut twice).unwrap();

        prop_assert_eq!(unified(&once), unified(&twice));
    }

    #[test]
    fn prop_merge_order_is_irrelevant(
        a in trace_strategy(),
        b in trace_strategy(),
        c in trace_strategy(),
    ) {
        let exes = [executable(0, &a), executable(1, &b), executable(2, &c)];

        let mut forward = registry();
        for ctx in &exes {
            ctx.merge_into(&mut forward).unwrap();
        }
        let mut backward = registry();
        for ctx in exes.iter().rev() {
            ctx.merge_into(&mut backward).unwrap();
        }
        prop_assert_eq!(unified(&forward), unified(&backward));

        forward.compute_uncovered();
        backward.compute_uncovered();
        let totals_forward = forward.compute_statistics().unwrap();
        let totals_backward = backward.compute_statistics().unwrap();
        prop_assert_eq!(totals_forward, totals_backward);
    }
}
