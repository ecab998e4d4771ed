//! Uncovered-range and branch analysis over a symbol's unified map.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Address, CoverageMap, InstructionLine, SymbolInfo};

/// How a branch site was exercised across all runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchClass {
    /// Only the target path was seen.
    AlwaysTaken,
    /// The branch ran but its target path was never seen.
    NeverTaken,
    /// The branch instruction itself never ran.
    NotExecuted,
    /// Both directions were seen.
    ExecutedBoth,
}

/// One outgoing path of a conditional branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchPath {
    Taken,
    FallThrough,
}

impl BranchClass {
    /// Paths never observed for a branch of this class.
    #[must_use]
    pub const fn unexercised(self) -> &'static [BranchPath] {
        match self {
            Self::AlwaysTaken => &[BranchPath::FallThrough],
            Self::NeverTaken => &[BranchPath::Taken],
            Self::NotExecuted => &[BranchPath::Taken, BranchPath::FallThrough],
            Self::ExecutedBoth => &[],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysTaken => "always taken",
            Self::NeverTaken => "never taken",
            Self::NotExecuted => "not executed",
            Self::ExecutedBoth => "executed both",
        }
    }
}

impl fmt::Display for BranchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// Instructions no run executed.
    NotExecuted,
    /// A branch site with at least one direction never observed.
    Branch(BranchClass),
}

/// Contiguous span of a symbol needing attention in the report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncoveredRange {
    pub symbol: String,
    pub start: Address,
    /// Inclusive.
    pub end: Address,
    /// Instruction starts inside the range.
    pub instructions: usize,
    pub kind: RangeKind,
}

impl UncoveredRange {
    #[must_use]
    pub const fn size_in_bytes(&self) -> u32 {
        self.end - self.start + 1
    }

    #[must_use]
    pub const fn unexercised(&self) -> &'static [BranchPath] {
        match self.kind {
            RangeKind::Branch(class) => class.unexercised(),
            RangeKind::NotExecuted => &[],
        }
    }
}

/// Output of [`analyze_symbol`].
#[derive(Clone, Debug, Default)]
pub struct SymbolAnalysis {
    pub uncovered_ranges: Vec<UncoveredRange>,
    pub uncovered_branches: Vec<UncoveredRange>,
}

/// Analyze the unified map of one symbol.
///
/// Branch and nop marks are refreshed from the canonical instruction list
/// first. Branches are classified before nop padding that follows executed
/// code is folded into the executed set, so padding after a branch never
/// counts as its fall-through path.
pub fn analyze_symbol(info: &mut SymbolInfo) -> SymbolAnalysis {
    let base = info.base_address;
    let Some(map) = info.unified.as_mut() else {
        return SymbolAnalysis::default();
    };

    let targets = mark_instructions(map, base, &info.instructions);
    let uncovered_branches = classify_branches(&info.name, map, base, &targets);
    fill_padding_after_executed(map);
    let uncovered_ranges = uncovered_ranges(&info.name, map, base);

    SymbolAnalysis {
        uncovered_ranges,
        uncovered_branches,
    }
}

/// Set start/branch/nop bits from the instruction list. Returns branch
/// offsets mapped to their static target offsets.
fn mark_instructions(
    map: &mut CoverageMap,
    base: Address,
    instructions: &[InstructionLine],
) -> BTreeMap<Address, Address> {
    let mut targets = BTreeMap::new();
    for line in instructions {
        let Some(offset) = line.address.and_then(|a| a.checked_sub(base)) else {
            continue;
        };
        map.set_instruction_start(offset);
        if line.is_nop {
            map.set_nop(offset);
        }
        if line.is_branch {
            map.set_branch(offset);
            if let Some(target) = line.branch_target.and_then(|t| t.checked_sub(base)) {
                targets.insert(offset, target);
            }
        }
    }
    targets
}

/// Classify one branch from the execution bits around it.
///
/// Direction bits recorded by a trace reader are authoritative. Without
/// them, the fall-through path counts as seen when the next instruction
/// ran, and the taken path when the static target ran. When the target is
/// outside the symbol or unknown the taken path cannot be observed, so it
/// is only inferred: as taken when the branch did not fall through, and
/// never reported missing when it did.
#[must_use]
pub fn classify_branch(map: &CoverageMap, branch: Address, target: Option<Address>) -> BranchClass {
    let flags = map.flags(branch);
    if !flags.was_executed() {
        return BranchClass::NotExecuted;
    }
    let (taken, fell_through) = if flags.has_direction() {
        (flags.was_taken(), flags.was_not_taken())
    } else {
        let fell_through = map
            .next_instruction_start(branch)
            .is_some_and(|next| map.was_executed(next));
        let taken = match target {
            Some(t) if map.contains(t) => map.was_executed(t),
            _ => true,
        };
        (taken, fell_through)
    };
    match (taken, fell_through) {
        (true, true) => BranchClass::ExecutedBoth,
        (true, false) => BranchClass::AlwaysTaken,
        (false, _) => BranchClass::NeverTaken,
    }
}

fn classify_branches(
    symbol: &str,
    map: &CoverageMap,
    base: Address,
    targets: &BTreeMap<Address, Address>,
) -> Vec<UncoveredRange> {
    map.instruction_starts()
        .filter(|&offset| map.is_branch(offset))
        .filter_map(|offset| {
            let class = classify_branch(map, offset, targets.get(&offset).copied());
            (class != BranchClass::ExecutedBoth).then(|| UncoveredRange {
                symbol: symbol.to_string(),
                start: base + offset,
                end: base + instruction_end(map, offset),
                instructions: 1,
                kind: RangeKind::Branch(class),
            })
        })
        .collect()
}

/// Treat nop padding that directly follows executed code as executed.
fn fill_padding_after_executed(map: &mut CoverageMap) {
    let starts: Vec<Address> = map.instruction_starts().collect();
    let mut previous_executed = false;
    for offset in starts {
        let flags = map.flags(offset);
        if flags.is_nop() && !flags.was_executed() && previous_executed {
            map.mark_executed(offset);
        } else {
            previous_executed = flags.was_executed();
        }
    }
}

/// Maximal runs of unexecuted instruction starts. A run ends one byte before
/// the next executed instruction, or at the end of the symbol.
fn uncovered_ranges(symbol: &str, map: &CoverageMap, base: Address) -> Vec<UncoveredRange> {
    let mut ranges = Vec::new();
    let mut open: Option<(Address, usize)> = None;
    let mut close = |start: Address, end: Address, instructions: usize| {
        ranges.push(UncoveredRange {
            symbol: symbol.to_string(),
            start: base + start,
            end: base + end,
            instructions,
            kind: RangeKind::NotExecuted,
        });
    };

    for offset in map.instruction_starts() {
        if map.was_executed(offset) {
            if let Some((start, count)) = open.take() {
                close(start, offset - 1, count);
            }
        } else {
            match open.as_mut() {
                Some((_, count)) => *count += 1,
                None => open = Some((offset, 1)),
            }
        }
    }
    if let Some((start, count)) = open {
        close(start, map.high(), count);
    }
    ranges
}

fn instruction_end(map: &CoverageMap, offset: Address) -> Address {
    map.next_instruction_start(offset)
        .map_or(map.high(), |next| next - 1)
}
