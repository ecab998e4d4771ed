use crate::Address;

/// One disassembly line kept in a symbol body.
///
/// Source annotations and other free text inside a body are kept for context
/// with no address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionLine {
    /// Biased address, `None` for non-instruction lines.
    pub address: Option<Address>,
    pub raw_text: String,
    pub is_nop: bool,
    /// Padding size in bytes, meaningful when `is_nop`.
    pub nop_size: u32,
    pub is_branch: bool,
    /// Statically displayed branch destination (biased).
    pub branch_target: Option<Address>,
}

impl InstructionLine {
    /// Free-text line inside a symbol body.
    pub fn text(raw_text: impl Into<String>) -> Self {
        Self {
            address: None,
            raw_text: raw_text.into(),
            is_nop: false,
            nop_size: 0,
            is_branch: false,
            branch_target: None,
        }
    }

    pub fn instruction(address: Address, raw_text: impl Into<String>) -> Self {
        Self {
            address: Some(address),
            ..Self::text(raw_text)
        }
    }

    #[must_use]
    pub const fn with_nop(mut self, size: u32) -> Self {
        self.is_nop = true;
        self.nop_size = size;
        self
    }

    #[must_use]
    pub const fn with_branch(mut self, target: Option<Address>) -> Self {
        self.is_branch = true;
        self.branch_target = target;
        self
    }

    #[must_use]
    pub const fn is_instruction(&self) -> bool {
        self.address.is_some()
    }
}
