use std::path::PathBuf;

/// Errors surfaced by the download tracker.
///
/// Validation errors (`ESYNTAX`, `ETYPE`) are returned by `add` before any
/// state changes. File and reference errors are what `audit` reports.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("[ESYNTAX] {0}")]
    Syntax(String),
    #[error("[ETYPE] {0}")]
    Type(String),
    #[error("[ENOTDIR] tracker root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("[ENOENT] tarball {0} does not exist")]
    MissingFile(String),
    #[error("[EFNOTREG] tarball {0} is not a regular file")]
    NotRegularFile(String),
    #[error("[EFZEROLEN] tarball {0} is empty")]
    ZeroLength(String),
    #[error("[EFNAME] {0} does not have a recognized tarball extension")]
    BadFilename(String),
    #[error("[ENODATA] {0}")]
    NoData(String),
    #[error("[EORPHANREF] ref '{reference}' of {repo} points at unknown commit {commit}")]
    OrphanRef {
        repo: String,
        reference: String,
        commit: String,
    },
    #[error("[EIO] tarball {path}: {message}")]
    Io { path: String, message: String },
}

impl TrackerError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "ESYNTAX",
            Self::Type(_) => "ETYPE",
            Self::NotADirectory(_) => "ENOTDIR",
            Self::MissingFile(_) => "ENOENT",
            Self::NotRegularFile(_) => "EFNOTREG",
            Self::ZeroLength(_) => "EFZEROLEN",
            Self::BadFilename(_) => "EFNAME",
            Self::NoData(_) => "ENODATA",
            Self::OrphanRef { .. } => "EORPHANREF",
            Self::Io { .. } => "EIO",
        }
    }

    /// Whether the error came from validating caller input rather than disk state.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Syntax(_) | Self::Type(_))
    }
}
