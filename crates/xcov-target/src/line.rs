//! Field splitting for objdump instruction lines.
//!
//! GNU objdump prints instructions as
//! `<offset>:\t<encoding bytes>\t<mnemonic> <operands>`, with the encoding
//! column omitted under `--no-show-raw-insn` and wrapped onto a bytes-only
//! continuation line for long x86 encodings.

use std::sync::OnceLock;

use regex::Regex;

/// One instruction line split into its columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjdumpLine<'a> {
    /// Offset printed before the colon (not yet biased by any load address).
    pub offset: u32,
    /// Raw encoding column, empty when not shown.
    pub encoding: &'a str,
    /// Mnemonic, empty for bytes-only continuation lines.
    pub mnemonic: &'a str,
    /// Everything after the mnemonic.
    pub operands: &'a str,
}

impl<'a> ObjdumpLine<'a> {
    /// Split a line of the form `<hex>:<ws>...`. Returns `None` for symbol
    /// headers, source annotations and anything else without an offset.
    pub fn parse(line: &'a str) -> Option<Self> {
        let trimmed = line.trim_start();
        let (offset, rest) = trimmed.split_once(':')?;
        if offset.is_empty() || !offset.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let offset = u32::from_str_radix(offset, 16).ok()?;

        let (encoding, insn) = match rest.strip_prefix('\t') {
            Some(body) => match body.split_once('\t') {
                Some((encoding, insn)) => (encoding.trim(), insn.trim()),
                None if is_encoding(body) => (body.trim(), ""),
                None => ("", body.trim()),
            },
            None => ("", rest.trim()),
        };

        let (mnemonic, operands) = insn
            .split_once(char::is_whitespace)
            .map_or((insn, ""), |(m, o)| (m, o.trim()));

        Some(Self {
            offset,
            encoding,
            mnemonic,
            operands,
        })
    }

    /// Number of bytes shown in the encoding column.
    pub fn encoding_len(&self) -> u32 {
        let digits = self
            .encoding
            .bytes()
            .filter(u8::is_ascii_hexdigit)
            .count();
        u32::try_from(digits / 2).unwrap_or(u32::MAX)
    }

    /// Size of the instruction, or `fallback` when no encoding is shown.
    pub fn size_or(&self, fallback: u32) -> u32 {
        match self.encoding_len() {
            0 => fallback,
            n => n,
        }
    }
}

/// Every whitespace-separated token is an even-length run of hex digits.
fn is_encoding(field: &str) -> bool {
    let mut tokens = field.split_whitespace().peekable();
    tokens.peek().is_some()
        && tokens.all(|t| t.len() % 2 == 0 && t.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Operand display of the form `<label+0x..>`.
pub fn has_displaced_label(operands: &str) -> bool {
    DISPLACED_LABEL
        .get_or_init(|| Regex::new(r"<[^>+]+\+0x[0-9a-fA-F]+>").unwrap())
        .is_match(operands)
}

/// Address shown before a `<label>` annotation, e.g. `beq a0,a1,80000010 <f+0x10>`.
pub fn displayed_target(operands: &str) -> Option<u32> {
    let caps = DISPLAYED_TARGET
        .get_or_init(|| Regex::new(r"(?:^|[\s,])(?:0x)?([0-9a-fA-F]+)\s+<[^>]+>").unwrap())
        .captures(operands)?;
    u32::from_str_radix(caps.get(1)?.as_str(), 16).ok()
}

static DISPLACED_LABEL: OnceLock<Regex> = OnceLock::new();
static DISPLAYED_TARGET: OnceLock<Regex> = OnceLock::new();
