//! Load addresses of dynamic libraries.
//!
//! The runtime writes `<executable>.dlinfo` with one `<library> <hex>` entry
//! per loaded library.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use xcov_coverage::{Address, CoverageError, ExecutableContext};

use crate::{ObjdumpError, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadMap {
    entries: Vec<(String, Address)>,
}

impl LoadMap {
    pub fn parse(reader: impl BufRead) -> Result<Self> {
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (Some(name), Some(offset)) = (fields.next(), fields.next()) else {
                continue;
            };
            let offset = offset.trim_start_matches("0x").trim_start_matches("0X");
            match Address::from_str_radix(offset, 16) {
                Ok(address) => entries.push((name.to_string(), address)),
                Err(_) => warn!(line = index + 1, text = %line, "malformed load map entry"),
            }
        }
        Ok(Self { entries })
    }

    /// Side-channel file written next to `executable`.
    #[must_use]
    pub fn path_for(executable: &Path) -> PathBuf {
        let mut name = executable.as_os_str().to_os_string();
        name.push(".dlinfo");
        PathBuf::from(name)
    }

    pub fn load_for(executable: &Path) -> Result<Self> {
        let path = Self::path_for(executable);
        let file = File::open(&path).map_err(|source| CoverageError::ReadFile { path, source })?;
        Self::parse(BufReader::new(file))
    }

    /// Load address of `library`, matched by basename so a path given on
    /// the command line finds a bare `libfoo.so` entry. An exact basename
    /// wins; otherwise the first entry whose basename contains it.
    #[must_use]
    pub fn lookup(&self, library: &str) -> Option<Address> {
        let wanted = basename(library)?;
        self.entries
            .iter()
            .find(|(name, _)| basename(name) == Some(wanted))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(name, _)| basename(name).is_some_and(|n| n.contains(wanted)))
            })
            .map(|&(_, address)| address)
    }

    /// Bias `ctx` by its library's load address.
    pub fn resolve(&self, ctx: &mut ExecutableContext) -> Result<Address> {
        let library = ctx
            .library_name()
            .ok_or_else(|| ObjdumpError::NotALibrary(ctx.file_name().display().to_string()))?;
        let address = self
            .lookup(library)
            .ok_or_else(|| ObjdumpError::LibraryNotInLoadMap {
                library: library.to_string(),
            })?;
        debug!(library, address = %format!("0x{address:x}"), "resolved library load address");
        ctx.set_load_address(address);
        Ok(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn basename(name: &str) -> Option<&str> {
    Path::new(name).file_name().and_then(|n| n.to_str())
}
