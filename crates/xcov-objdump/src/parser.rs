//! Symbol reconstruction state machine.

use std::io::BufRead;
use std::mem;

use tracing::{debug, warn};
use xcov_coverage::{
    Address, ExecutableContext, ExecutableId, InstructionLine, SymbolRegistry,
};
use xcov_target::TargetInfo;

use crate::{LineKind, Result, classify};

/// A desired symbol found in one executable's disassembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub name: String,
    pub base_address: Address,
    pub size: u32,
    pub instructions: Vec<InstructionLine>,
}

impl ResolvedSymbol {
    /// Hand the symbol to the registry: the first executable to resolve a
    /// name supplies its canonical instruction list, and the unified map is
    /// created once with this symbol's size.
    pub fn adopt_into(self, registry: &mut SymbolRegistry, source: ExecutableId) -> Result<bool> {
        registry.create_or_get_coverage_map(&self.name, self.size)?;
        let adopted =
            registry.adopt_instructions(&self.name, self.base_address, self.instructions, source)?;
        Ok(adopted)
    }
}

/// Symbol body being accumulated.
#[derive(Debug)]
struct OpenSymbol {
    name: String,
    start: Address,
    lines: Vec<InstructionLine>,
    last_address: Option<Address>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InSymbol(OpenSymbol),
    /// Inside jump-table data; skip until the next symbol header.
    Suppressed,
}

/// Parses one executable's disassembly against the desired-symbol set.
pub struct ObjdumpParser<'a> {
    target: &'a dyn TargetInfo,
    registry: &'a SymbolRegistry,
}

impl<'a> ObjdumpParser<'a> {
    pub fn new(target: &'a dyn TargetInfo, registry: &'a SymbolRegistry) -> Self {
        Self { target, registry }
    }

    /// Parse a full listing into `ctx`, creating one coverage map per
    /// desired symbol. Returns the resolved symbols in listing order.
    pub fn parse(
        &self,
        reader: impl BufRead,
        ctx: &mut ExecutableContext,
    ) -> Result<Vec<ResolvedSymbol>> {
        let bias = ctx.load_address();
        let mut state = State::Idle;
        let mut resolved = Vec::new();

        for line in reader.lines() {
            let line = line?;
            match classify(&line, self.target) {
                LineKind::SymbolHeader { offset, label } => {
                    let address = bias.wrapping_add(offset);
                    if let State::InSymbol(open) = mem::take(&mut state) {
                        self.finalize(open, address.wrapping_sub(1), ctx, &mut resolved)?;
                    }
                    if self.registry.is_desired(label) {
                        state = State::InSymbol(OpenSymbol {
                            name: label.to_string(),
                            start: address,
                            lines: vec![InstructionLine::text(line.as_str())],
                            last_address: None,
                        });
                    }
                }
                LineKind::JumpTableSentinel { offset } => {
                    if let State::InSymbol(open) = mem::take(&mut state) {
                        let address = bias.wrapping_add(offset);
                        debug!(
                            symbol = %open.name,
                            address = %format!("0x{address:x}"),
                            "jump table follows, ending symbol"
                        );
                        self.finalize(open, address.wrapping_sub(1), ctx, &mut resolved)?;
                        state = State::Suppressed;
                    }
                }
                LineKind::Instruction { offset } => {
                    if let State::InSymbol(open) = &mut state {
                        let address = bias.wrapping_add(offset);
                        open.lines.push(self.instruction_line(address, &line, bias));
                        open.last_address = Some(address);
                    }
                }
                LineKind::Text => {
                    if let State::InSymbol(open) = &mut state {
                        open.lines.push(InstructionLine::text(line));
                    }
                }
            }
        }

        if let State::InSymbol(open) = state {
            let end = open.last_address.unwrap_or(open.start);
            warn!(
                symbol = %open.name,
                "symbol ends the listing, assuming its last instruction is one byte"
            );
            self.finalize(open, end, ctx, &mut resolved)?;
        }

        debug!(
            file = %ctx.file_name().display(),
            symbols = resolved.len(),
            "parsed disassembly"
        );
        Ok(resolved)
    }

    fn instruction_line(&self, address: Address, line: &str, bias: Address) -> InstructionLine {
        let mut insn = InstructionLine::instruction(address, line);
        if let Some(size) = self.target.is_nop_line(line) {
            insn = insn.with_nop(size);
        }
        if self.target.is_branch_line(line) {
            let target = self
                .target
                .branch_target(line)
                .map(|t| bias.wrapping_add(t));
            insn = insn.with_branch(target);
        }
        insn
    }

    /// Close a symbol body spanning `[open.start, end]`.
    fn finalize(
        &self,
        open: OpenSymbol,
        end: Address,
        ctx: &mut ExecutableContext,
        resolved: &mut Vec<ResolvedSymbol>,
    ) -> Result<()> {
        let OpenSymbol {
            name,
            start,
            mut lines,
            ..
        } = open;

        let trimmed = trim_trailing_padding(&mut lines);
        let Some(end) = end.checked_sub(trimmed).filter(|&end| end >= start) else {
            warn!(symbol = %name, "symbol has no code after trimming padding, skipping");
            return Ok(());
        };
        if ctx.coverage_map(&name).is_some() {
            warn!(
                symbol = %name,
                file = %ctx.file_name().display(),
                "symbol defined more than once, keeping the first definition"
            );
            return Ok(());
        }

        let size = end - start + 1;
        ctx.symbol_table_mut().add(&name, start, size);
        let map = ctx.create_coverage_map(&name, start, end)?;
        for line in &lines {
            let Some(address) = line.address else {
                continue;
            };
            map.set_instruction_start(address);
            if line.is_branch {
                map.set_branch(address);
            }
            if line.is_nop {
                map.set_nop(address);
            }
        }
        for line in lines.iter().filter(|line| line.is_branch) {
            if let (Some(address), Some(target)) = (line.address, line.branch_target) {
                ctx.set_branch_target(address, target);
            }
        }

        resolved.push(ResolvedSymbol {
            name,
            base_address: start,
            size,
            instructions: lines,
        });
        Ok(())
    }
}

/// Drop the run of nop padding that ends the symbol's code. Returns the
/// number of bytes removed from the end of the symbol.
///
/// Text after the last instruction is kept, and any text line between two
/// nops ends the run.
pub fn trim_trailing_padding(lines: &mut Vec<InstructionLine>) -> u32 {
    let Some(last) = lines.iter().rposition(InstructionLine::is_instruction) else {
        return 0;
    };
    let first = lines[..=last]
        .iter()
        .rposition(|line| !line.is_nop)
        .map_or(0, |index| index + 1);
    if first > last {
        return 0;
    }
    lines
        .drain(first..=last)
        .fold(0u32, |trimmed, line| trimmed.saturating_add(line.nop_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcov_target::target_for;

    fn registry(names: &[&str]) -> SymbolRegistry {
        let mut registry = SymbolRegistry::new();
        for name in names {
            registry.insert(name);
        }
        registry
    }

    fn parse(target: &str, names: &[&str], dump: &str) -> (ExecutableContext, Vec<ResolvedSymbol>) {
        let target = target_for(target).unwrap();
        let registry = registry(names);
        let mut ctx = ExecutableContext::new(ExecutableId(0), "test.exe");
        let resolved = ObjdumpParser::new(target.as_ref(), &registry)
            .parse(dump.as_bytes(), &mut ctx)
            .unwrap();
        (ctx, resolved)
    }

    const I386_DUMP: &str = "\
00000400 <task_init>:
task_init():
/src/task.c:10
 400:\t55                   \tpush   %ebp
 401:\t89 e5                \tmov    %esp,%ebp
 403:\t74 03                \tje     408 <task_init+0x8>
 405:\t5d                   \tpop    %ebp
 406:\t66 90                \txchg   %ax,%ax
 408:\tc3                   \tret
 409:\t66 90                \txchg   %ax,%ax
 40b:\t8d 74 26 00          \tlea    0x0(%esi,%eiz,1),%esi

0000040f <helper>:
 40f:\tc3                   \tret

00000410 <task_exit>:
 410:\t55                   \tpush   %ebp
 411:\tc3                   \tret
";

    #[test]
    fn test_symbols_and_trailing_padding() {
        let (ctx, resolved) = parse("i386-rtems6", &["task_init", "task_exit"], I386_DUMP);
        assert_eq!(resolved.len(), 2);

        let init = &resolved[0];
        assert_eq!(init.name, "task_init");
        assert_eq!(init.base_address, 0x400);
        // 0x40e minus the trailing 2 + 4 bytes of padding.
        assert_eq!(init.size, 0x9);
        let last = init.instructions.iter().rev().find(|l| l.is_instruction()).unwrap();
        assert_eq!(last.address, Some(0x408));
        assert!(init.instructions.iter().filter(|l| l.is_nop).count() == 1);

        let branch = init.instructions.iter().find(|l| l.is_branch).unwrap();
        assert_eq!(branch.address, Some(0x403));
        assert_eq!(branch.branch_target, Some(0x408));
        assert_eq!(ctx.branch_target(0x403), Some(0x408));

        let map = ctx.coverage_map("task_init").unwrap();
        assert_eq!((map.low(), map.high()), (0x400, 0x408));
        assert!(map.is_branch(0x403));
        assert!(map.is_nop(0x406));
        assert_eq!(map.instruction_count(), 6);
        assert!(ctx.coverage_map("helper").is_none());
        assert_eq!(ctx.symbol_table().find("task_init").unwrap().size, 9);
    }

    #[test]
    fn test_header_and_source_lines_are_kept_as_text() {
        let (_, resolved) = parse("i386", &["task_init"], I386_DUMP);
        let lines = &resolved[0].instructions;
        assert_eq!(lines[0].raw_text, "00000400 <task_init>:");
        assert!(!lines[0].is_instruction());
        assert_eq!(lines[1].raw_text, "task_init():");
        assert_eq!(lines[2].raw_text, "/src/task.c:10");
    }

    #[test]
    fn test_last_symbol_assumes_one_byte() {
        let (ctx, resolved) = parse("i386", &["task_exit"], I386_DUMP);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].base_address, 0x410);
        assert_eq!(resolved[0].size, 2);
        assert_eq!(ctx.coverage_map("task_exit").unwrap().high(), 0x411);
    }

    #[test]
    fn test_trim_two_nops() {
        let mut lines = vec![
            InstructionLine::instruction(0x100, "insn"),
            InstructionLine::instruction(0x104, "nop").with_nop(2),
            InstructionLine::instruction(0x106, "nop").with_nop(4),
            InstructionLine::text(""),
        ];
        assert_eq!(trim_trailing_padding(&mut lines), 6);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].address, Some(0x100));
        assert_eq!(lines[1].raw_text, "");
    }

    #[test]
    fn test_trim_stops_at_text_between_nops() {
        let mut lines = vec![
            InstructionLine::instruction(0x100, "insn"),
            InstructionLine::instruction(0x104, "nop").with_nop(2),
            InstructionLine::text("/src/pad.c:1"),
            InstructionLine::instruction(0x106, "nop").with_nop(4),
            InstructionLine::text("trailing"),
        ];
        assert_eq!(trim_trailing_padding(&mut lines), 4);
        let kept: Vec<_> = lines.iter().map(|l| (l.address, l.raw_text.as_str())).collect();
        assert_eq!(
            kept,
            vec![
                (Some(0x100), "insn"),
                (Some(0x104), "nop"),
                (None, "/src/pad.c:1"),
                (None, "trailing"),
            ]
        );
    }

    #[test]
    fn test_trim_without_padding_is_noop() {
        let mut lines = vec![
            InstructionLine::text("f():"),
            InstructionLine::instruction(0x100, "ret"),
        ];
        assert_eq!(trim_trailing_padding(&mut lines), 0);
        assert_eq!(lines.len(), 2);
        let mut only_text = vec![InstructionLine::text("f():")];
        assert_eq!(trim_trailing_padding(&mut only_text), 0);
    }

    #[test]
    fn test_jump_table_sentinel_suppresses_until_next_header() {
        let dump = "\
00000f00 <dispatch>:
 f00:\t55                   \tpush   %ebp
 f01:\tff 24 85 10 10 00 00 \tjmp    *0x1010(,%eax,4)
1000: call 2000 <foo+0x10>
 1005:\t20 10                \tand    %dl,(%eax)
 1007:\t00 00                \tadd    %al,(%eax)
00001100 <after>:
 1100:\tc3                   \tret
";
        let (ctx, resolved) = parse("i386", &["dispatch", "after"], dump);
        assert_eq!(resolved.len(), 2);
        let dispatch = &resolved[0];
        assert_eq!(dispatch.base_address + dispatch.size, 0x1000);
        assert!(dispatch
            .instructions
            .iter()
            .all(|l| l.address.is_none_or(|a| a < 0x1000)));
        assert_eq!(ctx.coverage_map("dispatch").unwrap().high(), 0xfff);
        assert_eq!(ctx.coverage_map("after").unwrap().low(), 0x1100);
    }

    #[test]
    fn test_undesired_symbols_are_skipped() {
        let (ctx, resolved) = parse("i386", &["missing"], I386_DUMP);
        assert!(resolved.is_empty());
        assert!(ctx.symbol_table().is_empty());
    }

    #[test]
    fn test_load_address_bias() {
        let target = target_for("i386").unwrap();
        let registry = registry(&["task_exit"]);
        let mut ctx = ExecutableContext::new(ExecutableId(0), "app.exe").with_library("libfoo");
        ctx.set_load_address(0x1000_0000);
        let resolved = ObjdumpParser::new(target.as_ref(), &registry)
            .parse(I386_DUMP.as_bytes(), &mut ctx)
            .unwrap();
        assert_eq!(resolved[0].base_address, 0x1000_0410);
        assert!(ctx.coverage_map_at(0x1000_0411).is_some());
    }

    #[test]
    fn test_adopt_first_executable_wins() {
        let target = target_for("i386").unwrap();
        let mut registry = registry(&["task_exit"]);
        let mut first = ExecutableContext::new(ExecutableId(0), "a.exe");
        let mut second = ExecutableContext::new(ExecutableId(1), "b.exe");
        let parser = ObjdumpParser::new(target.as_ref(), &registry);
        let a = parser.parse(I386_DUMP.as_bytes(), &mut first).unwrap();
        let b = parser.parse(I386_DUMP.as_bytes(), &mut second).unwrap();

        for symbol in a {
            assert!(symbol.adopt_into(&mut registry, first.id()).unwrap());
        }
        for symbol in b {
            assert!(!symbol.adopt_into(&mut registry, second.id()).unwrap());
        }
        let info = registry.find("task_exit").unwrap();
        assert_eq!(info.source, Some(ExecutableId(0)));
        assert_eq!(info.unified.as_ref().unwrap().size(), 2);
    }
}
