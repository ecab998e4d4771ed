//! Sources of disassembly text.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;
use xcov_target::TargetInfo;

use crate::temp::TempFiles;
use crate::{Error, Result};

/// Produces the disassembly listing of one executable.
pub trait DisassemblySource: Send + Sync {
    fn disassemble(&self, executable: &Path) -> Result<Box<dyn BufRead>>;
}

/// Runs the target's objdump with output captured in temporary files.
pub struct ObjdumpCommand {
    program: String,
    temps: TempFiles,
}

impl ObjdumpCommand {
    pub const ARGS: [&'static str; 3] = ["-Cda", "--section=.text", "--source"];

    pub fn new(program: impl Into<String>, temps: TempFiles) -> Self {
        Self {
            program: program.into(),
            temps,
        }
    }

    pub fn for_target(target: &dyn TargetInfo, temps: TempFiles) -> Self {
        Self::new(target.disassembler_path(), temps)
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl DisassemblySource for ObjdumpCommand {
    fn disassemble(&self, executable: &Path) -> Result<Box<dyn BufRead>> {
        if !executable.is_file() {
            return Err(Error::OpenInput {
                path: executable.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        let stdout_path = self.temps.create("xcov-objdump-", ".dis")?;
        let stderr_path = self.temps.create("xcov-objdump-", ".err")?;

        debug!(
            program = %self.program,
            executable = %executable.display(),
            output = %stdout_path.display(),
            "running disassembler"
        );
        let status = Command::new(&self.program)
            .args(Self::ARGS)
            .arg(executable)
            .stdout(File::create(&stdout_path)?)
            .stderr(File::create(&stderr_path)?)
            .status()
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(Error::DisassemblerFailed {
                program: self.program.clone(),
                executable: executable.to_path_buf(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let file = File::open(&stdout_path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads a listing produced ahead of time, stored as `<executable>.<ext>`.
pub struct DumpFile {
    extension: String,
}

impl DumpFile {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    #[must_use]
    pub fn path_for(&self, executable: &Path) -> PathBuf {
        let mut name = executable.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.extension);
        PathBuf::from(name)
    }
}

impl DisassemblySource for DumpFile {
    fn disassemble(&self, executable: &Path) -> Result<Box<dyn BufRead>> {
        let path = self.path_for(executable);
        let file = File::open(&path).map_err(|source| Error::OpenInput { path, source })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_file_path() {
        let source = DumpFile::new(".dis");
        assert_eq!(
            source.path_for(Path::new("build/hello.exe")),
            PathBuf::from("build/hello.exe.dis")
        );
    }

    #[test]
    fn test_dump_file_missing_is_open_error() {
        let source = DumpFile::new("dis");
        let err = source.disassemble(Path::new("/nonexistent/hello.exe")).err().unwrap();
        assert!(matches!(err, Error::OpenInput { .. }));
    }

    #[test]
    fn test_objdump_program_for_target() {
        let target = xcov_target::target_for("sparc-rtems6").unwrap();
        let cmd = ObjdumpCommand::for_target(target.as_ref(), TempFiles::new(false));
        assert_eq!(cmd.program(), "sparc-rtems6-objdump");
    }

    #[test]
    fn test_missing_disassembler_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("hello.exe");
        fs::write(&exe, b"\x7fELF").unwrap();

        let temps = TempFiles::new(false);
        let cmd = ObjdumpCommand::new("xcov-no-such-objdump", temps.clone());
        let err = cmd.disassemble(&exe).err().unwrap();
        assert!(matches!(err, Error::Spawn { .. }));
        assert_eq!(temps.cleanup(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_disassembler_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("hello.exe");
        fs::write(&exe, b"\x7fELF").unwrap();

        // `false` ignores its arguments and exits non-zero.
        let cmd = ObjdumpCommand::new("false", TempFiles::new(false));
        let err = cmd.disassemble(&exe).err().unwrap();
        assert!(matches!(err, Error::DisassemblerFailed { .. }));
    }
}
