#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use dlt_core::{
    derive_git_key, DownloadTracker, FetchOptions, FetchSource, Session, TarballInfo, WalkPolicy,
};
use dlt_domain::{max_satisfying, PackageManifest, PackageSpec, SpecKind};
use tempfile::TempDir;

/// In-memory registry, git host and url server that counts tarball fetches.
#[derive(Default)]
pub struct ScriptedSource {
    packages: HashMap<String, Vec<PackageManifest>>,
    tags: HashMap<(String, String), String>,
    repos: HashMap<String, PackageManifest>,
    urls: HashMap<String, PackageManifest>,
    failing: Vec<String>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(mut self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let manifest = PackageManifest {
            name: Some(name.to_string()),
            version: Some(version.to_string()),
            dependencies: pairs(dependencies),
            ..PackageManifest::default()
        };
        self.manifest(manifest)
    }

    pub fn manifest(mut self, manifest: PackageManifest) -> Self {
        let name = manifest.name.clone().expect("scripted manifest needs a name");
        self.packages.entry(name).or_default().push(manifest);
        self
    }

    pub fn tag(mut self, name: &str, tag: &str, version: &str) -> Self {
        self.tags
            .insert((name.to_string(), tag.to_string()), version.to_string());
        self
    }

    /// Register a repository under its `domain/path` identity.
    pub fn repo(mut self, repo: &str, manifest: PackageManifest) -> Self {
        self.repos.insert(repo.to_string(), manifest);
        self
    }

    pub fn url(mut self, url: &str, manifest: PackageManifest) -> Self {
        self.urls.insert(url.to_string(), manifest);
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetched.lock().expect("fetch log").clone()
    }

    pub fn fetch_count(&self, needle: &str) -> usize {
        self.fetches()
            .iter()
            .filter(|spec| spec.contains(needle))
            .count()
    }

    fn registry_manifest(&self, spec: &PackageSpec) -> Result<PackageManifest> {
        let name = spec.name.clone().ok_or_else(|| anyhow!("registry spec without name"))?;
        let candidates = self
            .packages
            .get(&name)
            .ok_or_else(|| anyhow!("404 Not Found: {name}"))?;
        let versions = candidates
            .iter()
            .filter_map(|manifest| manifest.version.as_deref());
        let wanted = match spec.kind {
            SpecKind::Tag if spec.fetch_spec != "latest" => self
                .tags
                .get(&(name.clone(), spec.fetch_spec.clone()))
                .cloned()
                .ok_or_else(|| anyhow!("no tag {} for {name}", spec.fetch_spec))?,
            SpecKind::Tag => max_satisfying(versions, "*", false)
                .map(ToOwned::to_owned)
                .ok_or_else(|| anyhow!("no versions for {name}"))?,
            _ => max_satisfying(versions, &spec.fetch_spec, false)
                .map(ToOwned::to_owned)
                .ok_or_else(|| anyhow!("no version of {name} matches {}", spec.fetch_spec))?,
        };
        let mut manifest = candidates
            .iter()
            .find(|manifest| manifest.version.as_deref() == Some(wanted.as_str()))
            .cloned()
            .ok_or_else(|| anyhow!("missing manifest for {name}@{wanted}"))?;
        manifest.resolved = Some(format!(
            "https://registry.example.com/{name}/-/{name}-{wanted}.tgz"
        ));
        Ok(manifest)
    }
}

#[async_trait]
impl FetchSource for ScriptedSource {
    async fn manifest(&self, spec: &PackageSpec, _options: &FetchOptions) -> Result<PackageManifest> {
        tokio::task::yield_now().await;
        if let Some(name) = &spec.name {
            if self.failing.contains(name) {
                bail!("network failure fetching {spec}");
            }
        }
        match spec.kind {
            SpecKind::Version | SpecKind::Range | SpecKind::Tag => self.registry_manifest(spec),
            SpecKind::Git => {
                let key = derive_git_key(spec)?;
                self.repos
                    .get(&key.repo)
                    .cloned()
                    .ok_or_else(|| anyhow!("unknown repository {}", key.repo))
            }
            SpecKind::Remote => self
                .urls
                .get(&spec.fetch_spec)
                .cloned()
                .ok_or_else(|| anyhow!("404 Not Found: {}", spec.fetch_spec)),
        }
    }

    async fn fetch_tarball(
        &self,
        spec: &PackageSpec,
        dest: &Path,
        _options: &FetchOptions,
    ) -> Result<TarballInfo> {
        tokio::task::yield_now().await;
        self.fetched.lock().expect("fetch log").push(spec.raw.clone());
        tokio::fs::write(dest, format!("tarball for {}", spec.raw)).await?;
        Ok(TarballInfo {
            integrity: Some(format!("sha512-{}", spec.raw.len())),
        })
    }
}

pub fn pairs(entries: &[(&str, &str)]) -> indexmap::IndexMap<String, String> {
    entries
        .iter()
        .map(|(name, spec)| ((*name).to_string(), (*spec).to_string()))
        .collect()
}

pub fn session(source: &Arc<ScriptedSource>, policy: WalkPolicy) -> (TempDir, Session) {
    let temp = tempfile::Builder::new()
        .prefix("dlt-session")
        .tempdir()
        .expect("tempdir");
    let tracker = DownloadTracker::open(temp.path()).expect("open tracker");
    let source: Arc<dyn FetchSource> = source.clone();
    let session = Session::new(tracker, source, FetchOptions::default(), policy);
    (temp, session)
}

pub fn specs(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|spec| (*spec).to_string()).collect()
}
