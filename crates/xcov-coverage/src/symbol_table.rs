use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::Address;

/// Where one symbol lives in one executable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub base_address: Address,
    pub size: u32,
}

impl SymbolEntry {
    /// Last byte of the symbol.
    #[must_use]
    pub const fn end_address(&self) -> Address {
        self.base_address + self.size.saturating_sub(1)
    }

    #[must_use]
    pub const fn contains(&self, address: Address) -> bool {
        address >= self.base_address && address <= self.end_address()
    }
}

/// Per-executable symbol index, ordered by base address.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    by_address: BTreeMap<Address, SymbolEntry>,
    by_name: FxHashMap<String, Address>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, base_address: Address, size: u32) {
        if let Some(old) = self.by_name.insert(name.to_string(), base_address) {
            self.by_address.remove(&old);
        }
        self.by_address.insert(
            base_address,
            SymbolEntry {
                name: name.to_string(),
                base_address,
                size,
            },
        );
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SymbolEntry> {
        self.by_name
            .get(name)
            .and_then(|base| self.by_address.get(base))
    }

    /// Symbol whose range contains `address`.
    #[must_use]
    pub fn symbol_at(&self, address: Address) -> Option<&SymbolEntry> {
        self.by_address
            .range(..=address)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.contains(address))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.by_address.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
