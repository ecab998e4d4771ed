//! Per-executable coverage state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Address, CoverageError, CoverageMap, Result, SymbolRegistry, SymbolTable};

/// Index of an executable in the session's executable list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutableId(pub usize);

/// One executable (or dynamic library) and the coverage maps built for it.
///
/// Maps stay private to the context until [`merge_into`](Self::merge_into),
/// so contexts can be parsed and traced on separate threads.
#[derive(Debug)]
pub struct ExecutableContext {
    id: ExecutableId,
    file_name: PathBuf,
    library_name: Option<String>,
    load_address: Address,
    symbols: SymbolTable,
    maps: BTreeMap<String, CoverageMap>,
    /// Static targets of direct branches, by branch address.
    branch_targets: BTreeMap<Address, Address>,
}

impl ExecutableContext {
    pub fn new(id: ExecutableId, file_name: impl Into<PathBuf>) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            library_name: None,
            load_address: 0,
            symbols: SymbolTable::new(),
            maps: BTreeMap::new(),
            branch_targets: BTreeMap::new(),
        }
    }

    /// Analyze `library` loaded by this executable instead of the executable
    /// itself. Its load address must be set before parsing.
    #[must_use]
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library_name = Some(library.into());
        self
    }

    #[must_use]
    pub const fn id(&self) -> ExecutableId {
        self.id
    }

    #[must_use]
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    #[must_use]
    pub fn library_name(&self) -> Option<&str> {
        self.library_name.as_deref()
    }

    #[must_use]
    pub const fn is_dynamic_library(&self) -> bool {
        self.library_name.is_some()
    }

    /// Bias added to every disassembly offset.
    #[must_use]
    pub const fn load_address(&self) -> Address {
        self.load_address
    }

    pub fn set_load_address(&mut self, address: Address) {
        debug!(
            file = %self.file_name.display(),
            load_address = %format!("0x{address:x}"),
            "load address set"
        );
        self.load_address = address;
    }

    #[must_use]
    pub const fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }

    pub const fn symbol_table_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Create the map for `symbol` over `[low, high]`.
    pub fn create_coverage_map(
        &mut self,
        symbol: &str,
        low: Address,
        high: Address,
    ) -> Result<&mut CoverageMap> {
        if self.maps.contains_key(symbol) {
            return Err(CoverageError::DuplicateSymbol(symbol.to_string()));
        }
        let map = CoverageMap::new(low, high)?;
        Ok(self.maps.entry(symbol.to_string()).or_insert(map))
    }

    #[must_use]
    pub fn coverage_map(&self, symbol: &str) -> Option<&CoverageMap> {
        self.maps.get(symbol)
    }

    /// Map whose range contains `address`.
    #[must_use]
    pub fn coverage_map_at(&self, address: Address) -> Option<&CoverageMap> {
        let entry = self.symbols.symbol_at(address)?;
        self.maps
            .get(&entry.name)
            .filter(|map| map.contains(address))
    }

    pub fn coverage_map_at_mut(&mut self, address: Address) -> Option<&mut CoverageMap> {
        let entry = self.symbols.symbol_at(address)?;
        self.maps
            .get_mut(&entry.name)
            .filter(|map| map.contains(address))
    }

    pub fn coverage_maps(&self) -> impl Iterator<Item = (&str, &CoverageMap)> {
        self.maps.iter().map(|(name, map)| (name.as_str(), map))
    }

    pub fn set_branch_target(&mut self, branch: Address, target: Address) {
        self.branch_targets.insert(branch, target);
    }

    /// Static target of the branch at `branch`, when the disassembler
    /// printed one.
    #[must_use]
    pub fn branch_target(&self, branch: Address) -> Option<Address> {
        self.branch_targets.get(&branch).copied()
    }

    /// Mark the instruction at a traced address as executed. Returns `false`
    /// when the address is outside every analyzed symbol.
    pub fn mark_executed(&mut self, address: Address) -> bool {
        self.coverage_map_at_mut(address)
            .is_some_and(|map| map.mark_executed(address))
    }

    /// Record an observed branch direction at `address`.
    pub fn mark_branch_direction(&mut self, address: Address, taken: bool) -> bool {
        self.coverage_map_at_mut(address).is_some_and(|map| {
            if taken {
                map.set_taken(address)
            } else {
                map.set_not_taken(address)
            }
        })
    }

    /// OR every owned map into the registry's unified maps.
    pub fn merge_into(&self, registry: &mut SymbolRegistry) -> Result<usize> {
        for (name, map) in &self.maps {
            registry.merge_coverage(name, map)?;
        }
        debug!(
            file = %self.file_name.display(),
            symbols = self.maps.len(),
            "merged executable coverage"
        );
        Ok(self.maps.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(symbol: &str, low: Address, high: Address) -> ExecutableContext {
        let mut ctx = ExecutableContext::new(ExecutableId(0), "a.exe");
        ctx.symbol_table_mut().add(symbol, low, high - low + 1);
        let map = ctx.create_coverage_map(symbol, low, high).unwrap();
        for addr in (low..=high).step_by(4) {
            map.set_instruction_start(addr);
        }
        ctx
    }

    #[test]
    fn test_coverage_map_at() {
        let ctx = context_with("task_init", 0x400, 0x41f);
        assert_eq!(ctx.coverage_map_at(0x410).unwrap().low(), 0x400);
        assert!(ctx.coverage_map_at(0x420).is_none());
        assert!(ctx.coverage_map("task_init").is_some());
    }

    #[test]
    fn test_duplicate_map_is_error() {
        let mut ctx = context_with("f", 0x100, 0x103);
        assert!(matches!(
            ctx.create_coverage_map("f", 0x100, 0x103),
            Err(CoverageError::DuplicateSymbol(_))
        ));
    }

    #[test]
    fn test_mark_executed_by_trace_address() {
        let mut ctx = context_with("f", 0x100, 0x10f);
        assert!(ctx.mark_executed(0x104));
        assert!(!ctx.mark_executed(0x200));
        let map = ctx.coverage_map("f").unwrap();
        assert!(map.was_executed(0x107));
        assert!(!map.was_executed(0x108));

        assert!(ctx.mark_branch_direction(0x104, true));
        assert!(ctx.coverage_map("f").unwrap().flags(0x104).was_taken());
    }

    #[test]
    fn test_branch_targets() {
        let mut ctx = context_with("f", 0x100, 0x10f);
        assert_eq!(ctx.branch_target(0x104), None);
        ctx.set_branch_target(0x104, 0x2000);
        assert_eq!(ctx.branch_target(0x104), Some(0x2000));
        assert_eq!(ctx.branch_target(0x108), None);
    }

    #[test]
    fn test_merge_into_registry() {
        let mut registry = SymbolRegistry::new();
        registry.insert("f");
        registry.create_or_get_coverage_map("f", 16).unwrap();

        let mut ctx = context_with("f", 0x100, 0x10f);
        ctx.mark_executed(0x100);
        assert_eq!(ctx.merge_into(&mut registry).unwrap(), 1);

        let unified = registry.find("f").unwrap().unified.as_ref().unwrap();
        assert!(unified.was_executed(0));
        assert!(!unified.was_executed(4));
    }

    #[test]
    fn test_merge_unknown_symbol_fails() {
        let mut registry = SymbolRegistry::new();
        let ctx = context_with("g", 0x100, 0x10f);
        assert!(matches!(
            ctx.merge_into(&mut registry),
            Err(CoverageError::UnknownSymbol(_))
        ));
    }
}
