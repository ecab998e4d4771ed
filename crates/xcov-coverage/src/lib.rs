//! Coverage data model and analysis.
//!
//! Each executable owns one [`CoverageMap`] per analyzed symbol. After traces
//! are applied, those maps are OR-merged into the [`SymbolRegistry`], which
//! keeps a single unified map per symbol. The range analyzer then turns the
//! unified execution bits into uncovered ranges and branch classifications,
//! and [`aggregate`] totals them.

mod analyzer;
mod executable;
mod flags;
mod instruction;
mod map;
mod registry;
mod stats;
mod symbol_table;

pub use analyzer::*;
pub use executable::*;
pub use flags::*;
pub use instruction::*;
pub use map::*;
pub use registry::*;
pub use stats::*;
pub use symbol_table::*;

use std::path::PathBuf;

use thiserror::Error;

/// Address in a loaded image. Dynamic libraries are biased before storage.
pub type Address = u32;

/// Coverage model errors.
#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("invalid address range 0x{low:x}..=0x{high:x}")]
    InvalidRange { low: Address, high: Address },
    #[error("symbol '{0}' is not in the analysis set")]
    UnknownSymbol(String),
    #[error("symbol '{0}' already has a coverage map in this executable")]
    DuplicateSymbol(String),
    #[error("symbol '{0}' has no unified coverage map")]
    NoUnifiedMap(String),
    #[error("statistics requested before uncovered ranges were computed")]
    NotAnalyzed,
    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoverageError>;
