//! Per-architecture knowledge of disassembler output.
//!
//! The coverage engine never decodes machine code itself. Everything it needs
//! to know about an instruction (is it a conditional branch, is it padding,
//! where does it jump) is answered by a [`TargetInfo`] selected once per run
//! from the target name (e.g. `sparc-rtems6`, `riscv64-unknown-elf`).

mod arch;
mod line;

pub use arch::*;
pub use line::*;

use thiserror::Error;

/// Target lookup errors.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("empty target name")]
    EmptyTarget,
    #[error("unknown architecture '{arch}' in target '{target}'")]
    UnknownArchitecture { target: String, arch: String },
}

pub type Result<T> = std::result::Result<T, TargetError>;

/// Architecture capability consulted while parsing disassembly.
///
/// Implementations must be pure functions of the line text; the parser calls
/// them from several threads when executables are processed in parallel.
pub trait TargetInfo: Send + Sync {
    /// Full target name as given on the command line.
    fn name(&self) -> &str;

    /// Whether `mnemonic` is a conditional branch on this architecture.
    fn is_branch_instruction(&self, mnemonic: &str) -> bool;

    /// If the disassembly line is a padding instruction, its size in bytes.
    fn is_nop_line(&self, line: &str) -> Option<u32>;

    /// Whether the disassembly line holds a conditional branch.
    fn is_branch_line(&self, line: &str) -> bool {
        ObjdumpLine::parse(line).is_some_and(|insn| self.is_branch_instruction(insn.mnemonic))
    }

    /// Whether the line is a call into the middle of a symbol, which objdump
    /// emits when it decodes a jump table that follows a noreturn call.
    fn is_jump_table_sentinel(&self, line: &str) -> bool {
        ObjdumpLine::parse(line).is_some_and(|insn| {
            insn.mnemonic.contains("call") && has_displaced_label(insn.operands)
        })
    }

    /// Branch destination as displayed by the disassembler, if static.
    fn branch_target(&self, line: &str) -> Option<u32> {
        ObjdumpLine::parse(line).and_then(|insn| displayed_target(insn.operands))
    }

    /// Disassembler executable for this target.
    fn disassembler_path(&self) -> String {
        format!("{}-objdump", self.name())
    }
}

/// Select the capability for a target name.
///
/// The architecture family is the text before the first `-`, so
/// `sparc-rtems6` and `sparc` both select SPARC.
pub fn target_for(name: &str) -> Result<Box<dyn TargetInfo>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TargetError::EmptyTarget);
    }
    let family = name.split('-').next().unwrap_or(name);
    let arch = Architecture::from_family(family).ok_or_else(|| TargetError::UnknownArchitecture {
        target: name.to_string(),
        arch: family.to_string(),
    })?;
    Ok(Box::new(Target::new(name, arch)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_for_known_families() {
        for (name, arch) in [
            ("sparc-rtems6", Architecture::Sparc),
            ("i386-rtems6", Architecture::I386),
            ("arm-rtems6", Architecture::Arm),
            ("m68k-rtems6", Architecture::M68k),
            ("powerpc-rtems6", Architecture::PowerPc),
            ("riscv64-unknown-elf", Architecture::RiscV),
            ("riscv32", Architecture::RiscV),
        ] {
            let target = Target::new(name, arch);
            assert_eq!(target.architecture(), arch);
            assert!(target_for(name).is_ok(), "{name} should resolve");
        }
    }

    #[test]
    fn test_target_for_unknown_is_error() {
        let err = target_for("vax-bsd").err().unwrap();
        assert!(matches!(err, TargetError::UnknownArchitecture { ref arch, .. } if arch == "vax"));
        assert!(matches!(target_for("  "), Err(TargetError::EmptyTarget)));
    }

    #[test]
    fn test_disassembler_path() {
        let target = target_for("sparc-rtems6").unwrap();
        assert_eq!(target.disassembler_path(), "sparc-rtems6-objdump");
    }
}
