use std::path::PathBuf;

use thiserror::Error;

/// Analysis session errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("target error: {0}")]
    Target(#[from] xcov_target::TargetError),
    #[error("coverage error: {0}")]
    Coverage(#[from] xcov_coverage::CoverageError),
    #[error("disassembly error: {0}")]
    Objdump(#[from] xcov_objdump::ObjdumpError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot open {}: {source}", path.display())]
    OpenInput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} failed on {} ({status}): {stderr}", executable.display())]
    DisassemblerFailed {
        program: String,
        executable: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("no executables to analyze")]
    NoExecutables,
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
