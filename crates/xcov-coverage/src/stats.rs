//! Per-symbol statistics and registry totals.

use crate::{BranchClass, RangeKind, SymbolInfo, SymbolRegistry};

/// Counts derived from a symbol's unified map and computed ranges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub size_in_bytes: u64,
    pub size_in_instructions: u64,
    pub uncovered_bytes: u64,
    pub uncovered_instructions: u64,
    pub uncovered_ranges: u64,
    pub branches_always_taken: u64,
    pub branches_never_taken: u64,
    pub branches_executed_both: u64,
    pub branches_not_executed: u64,
}

impl Statistics {
    /// Derive statistics from the already-computed ranges of `info`.
    #[must_use]
    pub fn for_symbol(info: &SymbolInfo) -> Self {
        let Some(map) = info.unified.as_ref() else {
            return Self::default();
        };
        let mut stats = Self {
            size_in_bytes: u64::from(map.size()),
            size_in_instructions: map.instruction_count() as u64,
            uncovered_ranges: info.uncovered_ranges.len() as u64,
            ..Self::default()
        };
        for range in &info.uncovered_ranges {
            stats.uncovered_bytes += u64::from(range.size_in_bytes());
            stats.uncovered_instructions += range.instructions as u64;
        }

        let branches = map
            .instruction_starts()
            .filter(|&offset| map.is_branch(offset))
            .count() as u64;
        for range in &info.uncovered_branches {
            match range.kind {
                RangeKind::Branch(BranchClass::AlwaysTaken) => stats.branches_always_taken += 1,
                RangeKind::Branch(BranchClass::NeverTaken) => stats.branches_never_taken += 1,
                RangeKind::Branch(BranchClass::NotExecuted) => stats.branches_not_executed += 1,
                RangeKind::Branch(BranchClass::ExecutedBoth) | RangeKind::NotExecuted => {}
            }
        }
        stats.branches_executed_both = branches.saturating_sub(info.uncovered_branches.len() as u64);
        stats
    }

    #[must_use]
    pub const fn branches_found(&self) -> u64 {
        self.branches_always_taken
            + self.branches_never_taken
            + self.branches_executed_both
            + self.branches_not_executed
    }

    /// Branches with at least one direction never observed.
    #[must_use]
    pub const fn branches_uncovered(&self) -> u64 {
        self.branches_always_taken + self.branches_never_taken + self.branches_not_executed
    }

    #[must_use]
    pub const fn percent_uncovered_bytes(&self) -> u64 {
        percent(self.uncovered_bytes, self.size_in_bytes)
    }

    #[must_use]
    pub const fn percent_uncovered_instructions(&self) -> u64 {
        percent(self.uncovered_instructions, self.size_in_instructions)
    }

    #[must_use]
    pub const fn percent_executed_bytes(&self) -> u64 {
        percent(
            self.size_in_bytes.saturating_sub(self.uncovered_bytes),
            self.size_in_bytes,
        )
    }

    fn add(&mut self, other: &Self) {
        self.size_in_bytes += other.size_in_bytes;
        self.size_in_instructions += other.size_in_instructions;
        self.uncovered_bytes += other.uncovered_bytes;
        self.uncovered_instructions += other.uncovered_instructions;
        self.uncovered_ranges += other.uncovered_ranges;
        self.branches_always_taken += other.branches_always_taken;
        self.branches_never_taken += other.branches_never_taken;
        self.branches_executed_both += other.branches_executed_both;
        self.branches_not_executed += other.branches_not_executed;
    }
}

/// Totals over every symbol in the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub symbols: u64,
    pub unresolved_symbols: u64,
    pub stats: Statistics,
}

/// `part / total * 100`, truncated; `0` when `total` is `0`.
#[must_use]
pub const fn percent(part: u64, total: u64) -> u64 {
    if total == 0 { 0 } else { part * 100 / total }
}

/// Sum the stored statistics of every symbol.
#[must_use]
pub fn aggregate(registry: &SymbolRegistry) -> Totals {
    let mut totals = Totals::default();
    for info in registry.iter() {
        totals.symbols += 1;
        if !info.is_resolved() {
            totals.unresolved_symbols += 1;
        }
        totals.stats.add(&info.stats);
    }
    totals
}
