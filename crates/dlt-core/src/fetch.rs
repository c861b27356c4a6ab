//! The seam to whatever actually talks to registries and git hosts.
//!
//! Transport, retries and integrity checking belong to the [`FetchSource`]
//! implementation; the orchestrator only consumes its manifests and tarballs.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use dlt_domain::{PackageManifest, PackageSpec};
use url::Url;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    pub registry: String,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            user_agent: format!("dlt/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// What a tarball fetch reports about the bytes it wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TarballInfo {
    pub integrity: Option<String>,
}

#[async_trait]
pub trait FetchSource: Send + Sync {
    /// Package metadata for `spec`, including `_resolved` and, for git, `_sha`.
    async fn manifest(&self, spec: &PackageSpec, options: &FetchOptions) -> Result<PackageManifest>;

    /// Write the tarball for `spec` to `dest`.
    async fn fetch_tarball(
        &self,
        spec: &PackageSpec,
        dest: &Path,
        options: &FetchOptions,
    ) -> Result<TarballInfo>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("[EBADRESOLVED] manifest for {spec} has no resolved location")]
    MissingResolved { spec: String },
    #[error("[EBADRESOLVED] manifest for {spec} has an unusable resolved location '{resolved}'")]
    BadResolved { spec: String, resolved: String },
    #[error("[EBADMANIFEST] manifest for {spec} is missing {field}")]
    MissingField { spec: String, field: &'static str },
}

impl FetchError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingResolved { .. } | Self::BadResolved { .. } => "EBADRESOLVED",
            Self::MissingField { .. } => "EBADMANIFEST",
        }
    }
}

/// `_resolved` must be a parseable URL that does not point at the local filesystem.
pub fn validate_resolved(spec: &PackageSpec, manifest: &PackageManifest) -> Result<Url, FetchError> {
    let resolved = manifest
        .resolved
        .as_deref()
        .filter(|resolved| !resolved.trim().is_empty())
        .ok_or_else(|| FetchError::MissingResolved {
            spec: spec.raw.clone(),
        })?;
    let parseable = resolved.strip_prefix("git+").unwrap_or(resolved);
    match Url::parse(parseable) {
        Ok(url) if url.scheme() != "file" => Ok(url),
        _ => Err(FetchError::BadResolved {
            spec: spec.raw.clone(),
            resolved: resolved.to_string(),
        }),
    }
}
