//! Architecture families and their branch/nop tables.

use crate::line::{has_displaced_label, ObjdumpLine};
use crate::TargetInfo;

/// Supported architecture families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Architecture {
    Arm,
    I386,
    M68k,
    PowerPc,
    RiscV,
    Sparc,
}

impl Architecture {
    /// Map the family part of a target name (`sparc`, `riscv64`, ...).
    pub fn from_family(family: &str) -> Option<Self> {
        let family = family.to_ascii_lowercase();
        let arch = match family.as_str() {
            "arm" | "armv7" | "armv7m" | "thumb" => Self::Arm,
            "i386" | "i486" | "i586" | "i686" | "x86" => Self::I386,
            "m68k" | "coldfire" => Self::M68k,
            "powerpc" | "ppc" => Self::PowerPc,
            "riscv" | "riscv32" | "riscv64" => Self::RiscV,
            "sparc" | "sparc64" => Self::Sparc,
            _ => return None,
        };
        Some(arch)
    }

    /// Instruction width used when objdump shows no encoding column.
    pub const fn default_insn_size(self) -> u32 {
        match self {
            Self::I386 => 1,
            Self::M68k => 2,
            Self::Arm | Self::PowerPc | Self::RiscV | Self::Sparc => 4,
        }
    }

    /// Conditional branch mnemonics, after suffix normalization.
    const fn branch_mnemonics(self) -> &'static [&'static str] {
        match self {
            Self::Arm => &[
                "beq", "bne", "bcs", "bhs", "bcc", "blo", "bmi", "bpl", "bvs", "bvc", "bhi", "bls",
                "bge", "blt", "bgt", "ble", "cbz", "cbnz",
            ],
            Self::I386 => &[
                "ja", "jae", "jb", "jbe", "jc", "jcxz", "jecxz", "je", "jg", "jge", "jl", "jle",
                "jna", "jnae", "jnb", "jnbe", "jnc", "jne", "jng", "jnge", "jnl", "jnle", "jno",
                "jnp", "jns", "jnz", "jo", "jp", "jpe", "jpo", "js", "jz", "loop", "loope",
                "loopne", "loopnz", "loopz",
            ],
            Self::M68k => &[
                "bhi", "bls", "bcc", "bcs", "bhs", "blo", "bne", "beq", "bvc", "bvs", "bpl", "bmi",
                "bge", "blt", "bgt", "ble", "dbhi", "dbls", "dbcc", "dbcs", "dbne", "dbeq", "dbvc",
                "dbvs", "dbpl", "dbmi", "dbge", "dblt", "dbgt", "dble", "dbf", "dbra",
            ],
            Self::PowerPc => &[
                "bc", "bca", "bcl", "bcla", "bdnz", "bdz", "bdnzt", "bdnzf", "bdzt", "bdzf", "beq",
                "bne", "blt", "ble", "bgt", "bge", "bnl", "bng", "bso", "bns", "bun", "bnu",
            ],
            Self::RiscV => &[
                "beq", "bne", "blt", "bge", "bltu", "bgeu", "beqz", "bnez", "blez", "bgez", "bltz",
                "bgtz", "bgt", "ble", "bgtu", "bleu", "c.beqz", "c.bnez",
            ],
            Self::Sparc => &[
                "bne", "be", "bg", "ble", "bge", "bl", "bgu", "bleu", "bcc", "bcs", "bpos", "bneg",
                "bvc", "bvs", "bz", "bnz", "bgeu", "blu", "brz", "brlez", "brlz", "brnz", "brgz",
                "brgez", "fbne", "fbe", "fbg", "fbge", "fbl", "fble", "fblg", "fbu", "fbug",
                "fbuge", "fbul", "fbule", "fbue", "fbo",
            ],
        }
    }

    /// Mnemonics whose `<label+0x..>` operand marks jump-table data.
    const fn jump_table_calls(self) -> &'static [&'static str] {
        match self {
            Self::I386 => &["call", "calll", "callw"],
            Self::Sparc => &["call"],
            Self::RiscV => &["call", "jal"],
            Self::M68k => &["jsr", "bsr", "bsrl", "bsrw"],
            Self::Arm => &["bl", "blx"],
            Self::PowerPc => &["bl"],
        }
    }

    fn normalize(self, mnemonic: &str) -> String {
        let lower = mnemonic.to_ascii_lowercase();
        match self {
            // Thumb-2 width qualifiers.
            Self::Arm => lower
                .trim_end_matches(".n")
                .trim_end_matches(".w")
                .to_string(),
            // Annul and prediction qualifiers: `bne,a`, `bne,pt`.
            Self::Sparc => lower.split(',').next().unwrap_or_default().to_string(),
            // Static prediction hints: `beq+`, `bne-`.
            Self::PowerPc => lower.trim_end_matches(['+', '-']).to_string(),
            Self::M68k => lower.replace('.', ""),
            Self::I386 | Self::RiscV => lower,
        }
    }

    fn is_branch(self, mnemonic: &str) -> bool {
        let table = self.branch_mnemonics();
        let name = self.normalize(mnemonic);
        if table.contains(&name.as_str()) {
            return true;
        }
        match self {
            // Size suffixes: `bnes`, `beqw`, `dbfl`.
            Self::M68k => name
                .strip_suffix(['s', 'w', 'l', 'b'])
                .is_some_and(|base| table.contains(&base)),
            // Link/absolute/register forms: `bltl`, `beqlr`, `bnectr`.
            Self::PowerPc => ["lrl", "ctrl", "lr", "ctr", "la", "l", "a"]
                .iter()
                .filter_map(|suffix| name.strip_suffix(suffix))
                .any(|base| table.contains(&base)),
            _ => false,
        }
    }

    fn nop_size(self, insn: &ObjdumpLine<'_>) -> Option<u32> {
        let mnemonic = insn.mnemonic.to_ascii_lowercase();
        let operands: String = insn.operands.split_whitespace().collect();
        let is_nop = match self {
            Self::I386 => {
                mnemonic.starts_with("nop")
                    || (mnemonic == "xchg" && operands == "%ax,%ax")
                    || (mnemonic == "lea"
                        && matches!(
                            operands.as_str(),
                            "0x0(%esi),%esi"
                                | "0x0(%edi),%edi"
                                | "0x0(%esi,%eiz,1),%esi"
                                | "0x0(%edi,%eiz,1),%edi"
                        ))
                    || (mnemonic == "mov" && matches!(operands.as_str(), "%esi,%esi" | "%edi,%edi"))
            }
            Self::Arm => {
                mnemonic == "nop" || (mnemonic == "mov" && operands == "r0,r0")
            }
            Self::PowerPc => mnemonic == "nop" || (mnemonic == "ori" && operands == "r0,r0,0"),
            Self::RiscV => mnemonic == "nop" || mnemonic == "c.nop",
            Self::M68k | Self::Sparc => mnemonic == "nop",
        };
        if !is_nop {
            return None;
        }
        let fallback = match (self, mnemonic.as_str()) {
            (Self::RiscV, "c.nop") => 2,
            _ => self.default_insn_size(),
        };
        Some(insn.size_or(fallback))
    }
}

/// Capability for one named target, dispatching on its architecture family.
#[derive(Clone, Debug)]
pub struct Target {
    name: String,
    arch: Architecture,
}

impl Target {
    pub fn new(name: &str, arch: Architecture) -> Self {
        Self {
            name: name.to_string(),
            arch,
        }
    }

    pub const fn architecture(&self) -> Architecture {
        self.arch
    }
}

impl TargetInfo for Target {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_branch_instruction(&self, mnemonic: &str) -> bool {
        self.arch.is_branch(mnemonic)
    }

    fn is_nop_line(&self, line: &str) -> Option<u32> {
        ObjdumpLine::parse(line).and_then(|insn| self.arch.nop_size(&insn))
    }

    fn is_jump_table_sentinel(&self, line: &str) -> bool {
        ObjdumpLine::parse(line).is_some_and(|insn| {
            self.arch
                .jump_table_calls()
                .contains(&insn.mnemonic.to_ascii_lowercase().as_str())
                && has_displaced_label(insn.operands)
        })
    }
}
