//! Package manifests and the lockfiles that can accompany them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type DependencyMap = IndexMap<String, String>;

/// `bundledDependencies` is either a list of names or `true` for all of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundledDependencies {
    All(bool),
    Names(Vec<String>),
}

impl BundledDependencies {
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::All(all) => *all,
            Self::Names(names) => names.iter().any(|candidate| candidate == name),
        }
    }
}

/// Package metadata as returned by a fetcher, including the underscore-prefixed
/// provenance fields a registry or git fetch adds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: DependencyMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dev_dependencies: DependencyMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub peer_dependencies: DependencyMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub optional_dependencies: DependencyMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_dependencies: Option<BundledDependencies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_dependencies: Option<BundledDependencies>,
    #[serde(rename = "_resolved", default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(rename = "_integrity", default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(rename = "_shrinkwrap", default, skip_serializing_if = "Option::is_none")]
    pub shrinkwrap: Option<Shrinkwrap>,
    /// Commit a git fetch resolved to.
    #[serde(rename = "_sha", default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Tags and branches that point at `sha`.
    #[serde(rename = "_allRefs", default, skip_serializing_if = "Option::is_none")]
    pub all_refs: Option<Vec<String>>,
}

impl PackageManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Whether `name` ships inside this package's tarball.
    #[must_use]
    pub fn is_bundled(&self, name: &str) -> bool {
        self.bundled_dependencies
            .iter()
            .chain(self.bundle_dependencies.iter())
            .any(|bundled| bundled.contains(name))
    }
}

/// An npm-shrinkwrap.json or package-lock.json.
///
/// Version 1 files describe a nested `dependencies` tree; version 2 and 3
/// files describe a flat `packages` map keyed by install path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shrinkwrap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockfile_version: Option<u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, ShrinkwrapEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub packages: IndexMap<String, LockedPackage>,
}

impl Shrinkwrap {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.packages.iter().all(|(path, _)| path.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShrinkwrapEntry {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bundled: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub requires: DependencyMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, ShrinkwrapEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev_optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_bundle: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link: bool,
}

/// Package name for a `packages` key such as `node_modules/a/node_modules/@s/b`.
#[must_use]
pub fn name_from_install_path(path: &str) -> Option<&str> {
    let index = path.rfind("node_modules/")?;
    let tail = &path[index + "node_modules/".len()..];
    (!tail.is_empty()).then_some(tail)
}
