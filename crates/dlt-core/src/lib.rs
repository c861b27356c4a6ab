#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod agent;
mod config;
mod download;
mod fetch;
mod session;
mod speckey;
pub mod tracker;
mod walker;

pub use agent::FetchResult;
pub use config::{Config, TrackerLocation};
pub use download::{download_project, download_specs, DownloadSummary};
pub use fetch::{validate_resolved, FetchError, FetchOptions, FetchSource, TarballInfo, DEFAULT_REGISTRY};
pub use session::Session;
pub use speckey::{derive_git_key, GitKey, TrackerKey};
pub use tracker::{
    AuditIssue, DownloadTracker, RecordType, TrackedEntry, TrackerError, TrackerRecord,
    INDEX_FILENAME,
};
pub use walker::{walk, walk_shrinkwrap, WalkPolicy};
