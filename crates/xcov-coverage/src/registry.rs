//! The set of symbols under analysis and their unified coverage.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::{
    Address, CoverageError, CoverageMap, ExecutableId, InstructionLine, Result, Statistics,
    Totals, UncoveredRange, aggregate, analyze_symbol,
};

/// Everything known about one analyzed symbol across all executables.
#[derive(Clone, Debug, Default)]
pub struct SymbolInfo {
    pub name: String,
    /// Base address in the executable that resolved the symbol first.
    pub base_address: Address,
    /// Canonical instruction list, captured once.
    pub instructions: Vec<InstructionLine>,
    /// Executable the canonical instruction list came from.
    pub source: Option<ExecutableId>,
    pub stats: Statistics,
    pub uncovered_ranges: Vec<UncoveredRange>,
    pub uncovered_branches: Vec<UncoveredRange>,
    /// OR of every executable's map, addressed by offset from the symbol start.
    pub unified: Option<CoverageMap>,
}

impl SymbolInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.source.is_some()
    }
}

/// Registry of desired symbols.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    symbols: BTreeMap<String, SymbolInfo>,
    analyzed: bool,
}

impl SymbolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol to the analysis set. Returns `false` if already present.
    pub fn insert(&mut self, name: &str) -> bool {
        match self.symbols.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(SymbolInfo::new(name));
                true
            }
        }
    }

    /// Load symbol names, one per line. Blank lines and `#` comments are
    /// skipped; only the first field of a line is used.
    pub fn load(&mut self, reader: impl BufRead) -> Result<usize> {
        let mut added = 0;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let name = line.split_whitespace().next().unwrap_or(line);
            if self.insert(name) {
                added += 1;
            }
        }
        debug!(symbols = added, "loaded symbol list");
        Ok(added)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let file = File::open(path).map_err(|source| CoverageError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.load(BufReader::new(file))
    }

    #[must_use]
    pub fn is_desired(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut SymbolInfo> {
        self.symbols.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Capture the canonical instruction list for `name`. Only the first
    /// executable to resolve a symbol is recorded; later calls are ignored and
    /// return `false`.
    pub fn adopt_instructions(
        &mut self,
        name: &str,
        base_address: Address,
        instructions: Vec<InstructionLine>,
        source: ExecutableId,
    ) -> Result<bool> {
        let info = self
            .symbols
            .get_mut(name)
            .ok_or_else(|| CoverageError::UnknownSymbol(name.to_string()))?;
        if info.is_resolved() {
            return Ok(false);
        }
        info.base_address = base_address;
        info.instructions = instructions;
        info.source = Some(source);
        Ok(true)
    }

    /// Unified map for `name`, created with `size` bytes on first use.
    pub fn create_or_get_coverage_map(&mut self, name: &str, size: u32) -> Result<&mut CoverageMap> {
        let info = self
            .symbols
            .get_mut(name)
            .ok_or_else(|| CoverageError::UnknownSymbol(name.to_string()))?;
        if info.unified.is_none() {
            info.unified = Some(CoverageMap::with_size(size)?);
        }
        info.unified
            .as_mut()
            .ok_or_else(|| CoverageError::NoUnifiedMap(name.to_string()))
    }

    /// OR `map` into the unified map for `name`.
    pub fn merge_coverage(&mut self, name: &str, map: &CoverageMap) -> Result<()> {
        let info = self
            .symbols
            .get_mut(name)
            .ok_or_else(|| CoverageError::UnknownSymbol(name.to_string()))?;
        let Some(unified) = info.unified.as_mut() else {
            return Err(CoverageError::NoUnifiedMap(name.to_string()));
        };
        unified.merge_from(map);
        self.analyzed = false;
        Ok(())
    }

    /// Compute uncovered ranges and branches for every resolved symbol.
    pub fn compute_uncovered(&mut self) {
        for info in self.symbols.values_mut() {
            if info.unified.is_some() {
                let analysis = analyze_symbol(info);
                info.uncovered_ranges = analysis.uncovered_ranges;
                info.uncovered_branches = analysis.uncovered_branches;
            }
        }
        self.analyzed = true;
    }

    /// Derive per-symbol statistics and registry totals. Requires
    /// [`compute_uncovered`](Self::compute_uncovered) to have run since the
    /// last merge.
    pub fn compute_statistics(&mut self) -> Result<Totals> {
        if !self.analyzed {
            return Err(CoverageError::NotAnalyzed);
        }
        for info in self.symbols.values_mut() {
            info.stats = Statistics::for_symbol(info);
        }
        Ok(aggregate(self))
    }

    /// Desired symbols no executable resolved.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.symbols
            .values()
            .filter(|info| !info.is_resolved())
            .map(|info| info.name.as_str())
    }

    /// Warn about every unresolved symbol. Returns how many there were.
    pub fn warn_unresolved(&self) -> usize {
        let mut count = 0;
        for name in self.unresolved() {
            warn!(symbol = name, "symbol not found in any executable");
            count += 1;
        }
        count
    }
}
