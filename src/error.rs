//! Recoverable error taxonomy for the option processor (spec.md §7).
//!
//! Contract violations (sealed-environment misuse, orphan artifacts) are
//! deliberately *not* represented here: spec.md §9 calls for loud,
//! unrecoverable failure for those, which we get by panicking with a fully
//! formatted message rather than returning a `Result` a caller could
//! swallow. Everything below is genuinely recoverable by the process
//! boundary in `main`, which matches each variant to an [`ExitCode`].

use std::path::PathBuf;

/// Exit codes from spec.md §6. The numeric values are the ones a Bazel-like
/// tool actually uses on its command line (`BAD_ARGV = 2`,
/// `INTERNAL_ERROR = 37`), kept here rather than invented so a caller
/// shelling out to inspect `$?` gets stable, meaningful numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    BadArgv = 2,
    InternalError = 37,
}

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("expected exactly one argument to --blazerc")]
    BlazercMissingArgument,

    #[error("'{path}' is not readable")]
    UnreadableBlazerc { path: PathBuf },

    #[error("malformed import directive in {file}: exactly one argument required")]
    BadImportArity { file: PathBuf },

    #[error("Import loop detected: {}", .cycle.join(" -> "))]
    ImportLoop { cycle: Vec<String> },

    #[error("could not read rc file {path}: {source}")]
    InternalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OptionsError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            OptionsError::InternalIo { .. } => ExitCode::InternalError,
            OptionsError::BlazercMissingArgument
            | OptionsError::UnreadableBlazerc { .. }
            | OptionsError::BadImportArity { .. }
            | OptionsError::ImportLoop { .. } => ExitCode::BadArgv,
        }
    }
}
