//! Parser for GNU objdump disassembly listings.
//!
//! One pass over `objdump -Cda --source` output reconstructs the instruction
//! stream of every desired symbol, registers it in the executable's symbol
//! table and creates its coverage map.

mod lexer;
mod load_map;
mod parser;

pub use lexer::*;
pub use load_map::*;
pub use parser::*;

use thiserror::Error;
use xcov_coverage::CoverageError;

/// Disassembly parsing errors.
#[derive(Error, Debug)]
pub enum ObjdumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("coverage error: {0}")]
    Coverage(#[from] CoverageError),
    #[error("library '{library}' not found in load map")]
    LibraryNotInLoadMap { library: String },
    #[error("context for '{0}' has no library name")]
    NotALibrary(String),
}

pub type Result<T> = std::result::Result<T, ObjdumpError>;
