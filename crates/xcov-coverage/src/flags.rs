use std::ops::{BitOr, BitOrAssign};

/// Per-address coverage bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AddressFlags(u8);

impl AddressFlags {
    pub const START_OF_INSTRUCTION: u8 = 1 << 0;
    pub const BRANCH: u8 = 1 << 1;
    pub const NOP: u8 = 1 << 2;
    pub const EXECUTED: u8 = 1 << 3;
    /// Trace saw the branch jump to its target.
    pub const TAKEN: u8 = 1 << 4;
    /// Trace saw the branch fall through.
    pub const NOT_TAKEN: u8 = 1 << 5;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn set_flag(&mut self, flag: u8, enabled: bool) {
        if enabled {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    #[must_use]
    pub const fn has_flag(self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    #[must_use]
    pub const fn is_instruction_start(self) -> bool {
        self.has_flag(Self::START_OF_INSTRUCTION)
    }

    #[must_use]
    pub const fn is_branch(self) -> bool {
        self.has_flag(Self::BRANCH)
    }

    #[must_use]
    pub const fn is_nop(self) -> bool {
        self.has_flag(Self::NOP)
    }

    #[must_use]
    pub const fn was_executed(self) -> bool {
        self.has_flag(Self::EXECUTED)
    }

    #[must_use]
    pub const fn was_taken(self) -> bool {
        self.has_flag(Self::TAKEN)
    }

    #[must_use]
    pub const fn was_not_taken(self) -> bool {
        self.has_flag(Self::NOT_TAKEN)
    }

    /// Whether a trace recorded either branch direction.
    #[must_use]
    pub const fn has_direction(self) -> bool {
        self.has_flag(Self::TAKEN | Self::NOT_TAKEN)
    }
}

impl BitOr for AddressFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AddressFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut flags = AddressFlags::empty();
        flags.set_flag(AddressFlags::BRANCH, true);
        flags.set_flag(AddressFlags::EXECUTED, true);
        assert!(flags.is_branch());
        assert!(flags.was_executed());
        assert!(!flags.is_nop());

        flags.set_flag(AddressFlags::BRANCH, false);
        assert!(!flags.is_branch());
        assert!(flags.was_executed());
    }

    #[test]
    fn test_or_is_union() {
        let mut a = AddressFlags::empty();
        a.set_flag(AddressFlags::TAKEN, true);
        let mut b = AddressFlags::empty();
        b.set_flag(AddressFlags::NOT_TAKEN, true);
        let merged = a | b;
        assert!(merged.was_taken() && merged.was_not_taken());
        assert_eq!(merged | merged, merged);
        assert!(!AddressFlags::empty().has_direction());
        assert!(a.has_direction());
    }
}
