//! Dense per-address coverage record for one symbol.

use tracing::warn;

use crate::{Address, AddressFlags, CoverageError, Result};

/// Coverage bits for every byte in `[low, high]`.
///
/// Executable maps use absolute (biased) addresses. The unified map kept by
/// the registry uses offsets from the symbol start, so `low` is `0`. Merging
/// aligns the two by offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageMap {
    low: Address,
    high: Address,
    flags: Vec<AddressFlags>,
}

impl CoverageMap {
    pub fn new(low: Address, high: Address) -> Result<Self> {
        if high < low {
            return Err(CoverageError::InvalidRange { low, high });
        }
        let len = (high - low) as usize + 1;
        Ok(Self {
            low,
            high,
            flags: vec![AddressFlags::empty(); len],
        })
    }

    /// Unified map of `size` bytes addressed by offset.
    pub fn with_size(size: u32) -> Result<Self> {
        match size.checked_sub(1) {
            Some(high) => Self::new(0, high),
            None => Err(CoverageError::InvalidRange { low: 0, high: 0 }),
        }
    }

    #[must_use]
    pub const fn low(&self) -> Address {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> Address {
        self.high
    }

    /// Number of bytes covered.
    #[must_use]
    pub const fn size(&self) -> u32 {
        (self.high - self.low).saturating_add(1)
    }

    #[must_use]
    pub const fn contains(&self, address: Address) -> bool {
        address >= self.low && address <= self.high
    }

    fn index(&self, address: Address) -> Option<usize> {
        self.contains(address)
            .then(|| (address - self.low) as usize)
    }

    #[must_use]
    pub fn flags(&self, address: Address) -> AddressFlags {
        self.index(address)
            .map_or_else(AddressFlags::empty, |i| self.flags[i])
    }

    /// Set `flag` at `address`; out-of-range addresses are ignored.
    pub fn set(&mut self, address: Address, flag: u8) -> bool {
        match self.index(address) {
            Some(i) => {
                self.flags[i].set_flag(flag, true);
                true
            }
            None => false,
        }
    }

    pub fn set_instruction_start(&mut self, address: Address) -> bool {
        self.set(address, AddressFlags::START_OF_INSTRUCTION)
    }

    pub fn set_branch(&mut self, address: Address) -> bool {
        self.set(address, AddressFlags::BRANCH)
    }

    pub fn set_nop(&mut self, address: Address) -> bool {
        self.set(address, AddressFlags::NOP)
    }

    pub fn set_executed(&mut self, address: Address) -> bool {
        self.set(address, AddressFlags::EXECUTED)
    }

    pub fn set_taken(&mut self, address: Address) -> bool {
        self.set(address, AddressFlags::TAKEN)
    }

    pub fn set_not_taken(&mut self, address: Address) -> bool {
        self.set(address, AddressFlags::NOT_TAKEN)
    }

    #[must_use]
    pub fn is_instruction_start(&self, address: Address) -> bool {
        self.flags(address).is_instruction_start()
    }

    #[must_use]
    pub fn is_branch(&self, address: Address) -> bool {
        self.flags(address).is_branch()
    }

    #[must_use]
    pub fn is_nop(&self, address: Address) -> bool {
        self.flags(address).is_nop()
    }

    #[must_use]
    pub fn was_executed(&self, address: Address) -> bool {
        self.flags(address).was_executed()
    }

    /// First instruction start strictly after `address`.
    #[must_use]
    pub fn next_instruction_start(&self, address: Address) -> Option<Address> {
        let from = match self.index(address) {
            Some(i) => i + 1,
            None if address < self.low => 0,
            None => return None,
        };
        self.flags[from..]
            .iter()
            .position(|f| f.is_instruction_start())
            .map(|p| self.address_at(from + p))
    }

    /// Mark every byte of the instruction starting at `address` as executed:
    /// from `address` up to the next instruction start, or `high`.
    pub fn mark_executed(&mut self, address: Address) -> bool {
        let Some(start) = self.index(address) else {
            return false;
        };
        let end = self.flags[start + 1..]
            .iter()
            .position(|f| f.is_instruction_start())
            .map_or(self.flags.len(), |p| start + 1 + p);
        for flag in &mut self.flags[start..end] {
            flag.set_flag(AddressFlags::EXECUTED, true);
        }
        true
    }

    /// Instruction starts in the whole map.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.flags.iter().filter(|f| f.is_instruction_start()).count()
    }

    /// Instruction starts in `[start, end]`, clamped to the map.
    #[must_use]
    pub fn instruction_count_in(&self, start: Address, end: Address) -> usize {
        let start = start.max(self.low);
        let end = end.min(self.high);
        if end < start {
            return 0;
        }
        self.flags[(start - self.low) as usize..=(end - self.low) as usize]
            .iter()
            .filter(|f| f.is_instruction_start())
            .count()
    }

    /// Instruction-start addresses in ascending order.
    pub fn instruction_starts(&self) -> impl Iterator<Item = Address> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_instruction_start())
            .map(|(i, _)| self.address_at(i))
    }

    /// OR every bit of `other` into `self`, aligned by offset from `low`.
    ///
    /// Both maps are expected to describe the same code; when sizes differ
    /// only the common prefix is merged.
    pub fn merge_from(&mut self, other: &Self) {
        if self.flags.len() != other.flags.len() {
            warn!(
                expected = self.size(),
                actual = other.size(),
                "coverage map size mismatch, merging common prefix"
            );
        }
        for (dst, src) in self.flags.iter_mut().zip(&other.flags) {
            *dst |= *src;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn address_at(&self, index: usize) -> Address {
        // index <= high - low
        self.low + index as Address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_starts(low: Address, high: Address, starts: &[Address]) -> CoverageMap {
        let mut map = CoverageMap::new(low, high).unwrap();
        for &s in starts {
            map.set_instruction_start(s);
        }
        map
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        assert!(matches!(
            CoverageMap::new(0x20, 0x10),
            Err(CoverageError::InvalidRange { low: 0x20, high: 0x10 })
        ));
        assert_eq!(CoverageMap::new(0x10, 0x10).unwrap().size(), 1);
        assert!(CoverageMap::with_size(0).is_err());
        assert_eq!(CoverageMap::with_size(8).unwrap().high(), 7);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut map = CoverageMap::new(0x100, 0x10f).unwrap();
        assert!(!map.set_executed(0xff));
        assert!(!map.set_executed(0x110));
        assert!(!map.was_executed(0x110));
        assert!(map.set_executed(0x10f));
        assert!(map.was_executed(0x10f));
    }

    #[test]
    fn test_mark_executed_covers_whole_instruction() {
        let mut map = map_with_starts(0x100, 0x10b, &[0x100, 0x104, 0x106]);
        assert!(map.mark_executed(0x104));
        assert!(!map.was_executed(0x103));
        assert!(map.was_executed(0x104));
        assert!(map.was_executed(0x105));
        assert!(!map.was_executed(0x106));

        map.mark_executed(0x106);
        assert!(map.was_executed(0x10b));
    }

    #[test]
    fn test_next_instruction_start() {
        let map = map_with_starts(0x100, 0x10b, &[0x100, 0x104, 0x106]);
        assert_eq!(map.next_instruction_start(0x100), Some(0x104));
        assert_eq!(map.next_instruction_start(0x104), Some(0x106));
        assert_eq!(map.next_instruction_start(0x106), None);
        assert_eq!(map.next_instruction_start(0x50), Some(0x100));
        assert_eq!(map.next_instruction_start(0x200), None);
    }

    #[test]
    fn test_instruction_counts() {
        let map = map_with_starts(0x100, 0x10b, &[0x100, 0x104, 0x106]);
        assert_eq!(map.instruction_count(), 3);
        assert_eq!(map.instruction_count_in(0x101, 0x106), 2);
        assert_eq!(map.instruction_count_in(0x0, 0xffff), 3);
        assert_eq!(map.instruction_count_in(0x107, 0x101), 0);
        assert_eq!(
            map.instruction_starts().collect::<Vec<_>>(),
            vec![0x100, 0x104, 0x106]
        );
    }

    #[test]
    fn test_merge_aligns_by_offset() {
        let mut unified = CoverageMap::with_size(8).unwrap();
        let mut exe = map_with_starts(0x400, 0x407, &[0x400, 0x404]);
        exe.mark_executed(0x404);

        unified.merge_from(&exe);
        assert!(unified.is_instruction_start(0));
        assert!(unified.is_instruction_start(4));
        assert!(!unified.was_executed(3));
        assert!(unified.was_executed(4));
        assert!(unified.was_executed(7));
    }

    #[test]
    fn test_merge_size_mismatch_uses_prefix() {
        let mut unified = CoverageMap::with_size(4).unwrap();
        let mut exe = CoverageMap::new(0x10, 0x17).unwrap();
        exe.set_executed(0x13);
        exe.set_executed(0x16);
        unified.merge_from(&exe);
        assert!(unified.was_executed(3));
        assert_eq!(unified.size(), 4);
    }
}
