//! Line classification.

use std::io::BufRead;
use std::sync::OnceLock;

use regex::Regex;
use xcov_coverage::Address;
use xcov_target::{ObjdumpLine, TargetInfo};

use crate::Result;

/// What one disassembly line is, in classification priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// `00000400 <task_init>:`
    SymbolHeader { offset: u32, label: &'a str },
    /// A call into the middle of a symbol; jump-table data follows.
    JumpTableSentinel { offset: u32 },
    /// `     400:\t55   \tpush %ebp`
    Instruction { offset: u32 },
    /// Source annotations, file markers, encoding continuation lines.
    Text,
}

static SYMBOL_HEADER: OnceLock<Regex> = OnceLock::new();
static INSTRUCTION: OnceLock<Regex> = OnceLock::new();

fn symbol_header_re() -> &'static Regex {
    SYMBOL_HEADER.get_or_init(|| Regex::new(r"^\s*([0-9a-fA-F]+)\s+<(.+)>:\s*$").unwrap())
}

fn instruction_re() -> &'static Regex {
    INSTRUCTION.get_or_init(|| Regex::new(r"^\s*([0-9a-fA-F]+):\t").unwrap())
}

/// Classify one line.
pub fn classify<'a>(line: &'a str, target: &dyn TargetInfo) -> LineKind<'a> {
    if let Some(caps) = symbol_header_re().captures(line) {
        if let (Some(offset), Some(label)) = (parse_hex(&caps[1]), caps.get(2)) {
            return LineKind::SymbolHeader {
                offset,
                label: label.as_str(),
            };
        }
    }

    if target.is_jump_table_sentinel(line) {
        if let Some(insn) = ObjdumpLine::parse(line) {
            return LineKind::JumpTableSentinel { offset: insn.offset };
        }
    }

    if let Some(caps) = instruction_re().captures(line) {
        // Bytes-only continuation of a long encoding is not an instruction.
        let has_mnemonic = ObjdumpLine::parse(line).is_some_and(|insn| !insn.mnemonic.is_empty());
        if let (Some(offset), true) = (parse_hex(&caps[1]), has_mnemonic) {
            return LineKind::Instruction { offset };
        }
    }

    LineKind::Text
}

fn parse_hex(text: &str) -> Option<u32> {
    u32::from_str_radix(text, 16).ok()
}

/// Every instruction address in a dump, biased by `bias`, in listing order.
///
/// The address following an instruction is the next entry, which is how
/// the size of an instruction is recovered when no encoding is shown.
pub fn instruction_addresses(
    reader: impl BufRead,
    target: &dyn TargetInfo,
    bias: Address,
) -> Result<Vec<Address>> {
    let mut addresses = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let LineKind::Instruction { offset } | LineKind::JumpTableSentinel { offset } =
            classify(&line, target)
        {
            addresses.push(bias.wrapping_add(offset));
        }
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcov_target::target_for;

    #[test]
    fn test_classify_priority() {
        let target = target_for("i386-rtems6").unwrap();
        let target = target.as_ref();

        assert_eq!(
            classify("00000400 <task_init>:", target),
            LineKind::SymbolHeader {
                offset: 0x400,
                label: "task_init"
            }
        );
        assert_eq!(
            classify("1000: call 2000 <foo+0x10>", target),
            LineKind::JumpTableSentinel { offset: 0x1000 }
        );
        assert_eq!(
            classify("     400:\t55                   \tpush   %ebp", target),
            LineKind::Instruction { offset: 0x400 }
        );
        assert_eq!(classify("/src/task.c:42", target), LineKind::Text);
        assert_eq!(classify("  x = 1;", target), LineKind::Text);
        assert_eq!(classify("", target), LineKind::Text);
        assert_eq!(classify("Disassembly of section .text:", target), LineKind::Text);
    }

    #[test]
    fn test_demangled_header_label() {
        let target = target_for("sparc-rtems6").unwrap();
        assert_eq!(
            classify("40001000 <Foo::bar(int) const>:", target.as_ref()),
            LineKind::SymbolHeader {
                offset: 0x4000_1000,
                label: "Foo::bar(int) const"
            }
        );
    }

    #[test]
    fn test_continuation_is_text() {
        let target = target_for("i386").unwrap();
        assert_eq!(classify("     407:\t00 00 00 ", target.as_ref()), LineKind::Text);
    }

    #[test]
    fn test_instruction_addresses() {
        let target = target_for("i386").unwrap();
        let dump = "00000400 <f>:\n 400:\t55 \tpush %ebp\n 401:\t89 e5 \tmov %esp,%ebp\nsrc line\n 403:\tc3 \tret\n";
        let addrs = instruction_addresses(dump.as_bytes(), target.as_ref(), 0x1000).unwrap();
        assert_eq!(addrs, vec![0x1400, 0x1401, 0x1403]);
    }
}
