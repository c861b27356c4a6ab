//! Dependency graph walker: decides which children of a manifest get fetched.

use std::collections::HashSet;
use std::future::Future;

use anyhow::Result;
use dlt_domain::{
    name_from_install_path, parse_version, DependencyMap, LockedPackage, PackageManifest,
    PackageSpec, Shrinkwrap, ShrinkwrapEntry,
};
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::agent::{FetchResult, ItemAgent};
use crate::session::Session;

/// Which dependency classes to follow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkPolicy {
    pub include_dev: bool,
    pub no_peer: bool,
    pub no_optional: bool,
    /// The manifest being walked is a root of the session; only roots contribute dev dependencies.
    pub top_level: bool,
    /// The dependency list is already a flattened lockfile, so children are not walked further.
    pub shrinkwrap: bool,
}

impl WalkPolicy {
    #[must_use]
    pub fn root(self) -> Self {
        Self {
            top_level: true,
            shrinkwrap: false,
            ..self
        }
    }

    fn for_children(self) -> Self {
        Self {
            top_level: false,
            ..self
        }
    }

    fn wants_dev(self) -> bool {
        self.include_dev && self.top_level
    }
}

/// A dependency selected for fetching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Child {
    pub(crate) name: String,
    pub(crate) spec: String,
    pub(crate) optional: bool,
}

impl Child {
    fn new(name: &str, spec: &str, optional: bool) -> Self {
        Self {
            name: name.to_string(),
            spec: spec.to_string(),
            optional,
        }
    }

    /// The specifier as written in results: `name@spec`, or just `name`.
    fn raw(&self) -> String {
        if self.spec.is_empty() {
            self.name.clone()
        } else {
            format!("{}@{}", self.name, self.spec)
        }
    }
}

/// Fetch the dependencies of `manifest` allowed by `policy`.
///
/// A manifest carrying its own shrinkwrap is walked through that instead of
/// its dependency maps. Siblings run concurrently and all of them settle
/// before the first required failure is returned.
pub async fn walk(
    session: &Session,
    manifest: &PackageManifest,
    policy: WalkPolicy,
) -> Result<Vec<FetchResult>> {
    if let Some(shrinkwrap) = manifest.shrinkwrap.as_ref().filter(|lock| !lock.is_empty()) {
        return walk_shrinkwrap(session, shrinkwrap, Some(manifest), policy).await;
    }
    let children = manifest_children(manifest, policy);
    debug!(
        package = manifest.name.as_deref().unwrap_or("<root>"),
        children = children.len(),
        "walking dependencies"
    );
    run_children(session, children, policy.for_children()).await
}

/// Fetch every package a lockfile lists, without walking their manifests.
pub async fn walk_shrinkwrap(
    session: &Session,
    shrinkwrap: &Shrinkwrap,
    manifest: Option<&PackageManifest>,
    policy: WalkPolicy,
) -> Result<Vec<FetchResult>> {
    let children = shrinkwrap_children(shrinkwrap, manifest, policy);
    debug!(children = children.len(), "walking shrinkwrap");
    let policy = WalkPolicy {
        shrinkwrap: true,
        ..policy.for_children()
    };
    run_children(session, children, policy).await
}

pub(crate) fn manifest_children(manifest: &PackageManifest, policy: WalkPolicy) -> Vec<Child> {
    let mut children: IndexMap<String, Child> = IndexMap::new();
    let optional = &manifest.optional_dependencies;
    let mut add = |deps: &DependencyMap, is_optional: bool| {
        for (name, spec) in deps {
            if manifest.is_bundled(name) {
                debug!(%name, "skipping bundled dependency");
                continue;
            }
            if is_optional {
                children.insert(name.clone(), Child::new(name, spec, true));
            } else if !optional.contains_key(name) {
                children
                    .entry(name.clone())
                    .or_insert_with(|| Child::new(name, spec, false));
            }
        }
    };

    add(&manifest.dependencies, false);
    if policy.wants_dev() {
        add(&manifest.dev_dependencies, false);
    }
    if !policy.no_peer {
        add(&manifest.peer_dependencies, false);
    }
    if !policy.no_optional {
        add(optional, true);
    }
    children.into_values().collect()
}

pub(crate) fn shrinkwrap_children(
    shrinkwrap: &Shrinkwrap,
    manifest: Option<&PackageManifest>,
    policy: WalkPolicy,
) -> Vec<Child> {
    let bundled = |name: &str| manifest.is_some_and(|manifest| manifest.is_bundled(name));
    let mut children = IndexMap::new();
    if shrinkwrap.lockfile_version.unwrap_or(1) >= 2 && !shrinkwrap.packages.is_empty() {
        for (path, package) in &shrinkwrap.packages {
            locked_child(path, package, &bundled, policy, &mut children);
        }
    } else {
        let mut names = HashSet::new();
        let mut requires = Vec::new();
        nested_children(
            &shrinkwrap.dependencies,
            true,
            &bundled,
            policy,
            &mut children,
            &mut names,
            &mut requires,
        );
        for child in requires {
            if names.insert(child.name.clone()) {
                children.entry(child.raw()).or_insert(child);
            }
        }
    }
    children.into_values().collect()
}

/// Lockfile v1: a tree of `dependencies` with per-entry class flags and `requires` maps.
fn nested_children(
    entries: &IndexMap<String, ShrinkwrapEntry>,
    top: bool,
    bundled: &dyn Fn(&str) -> bool,
    policy: WalkPolicy,
    children: &mut IndexMap<String, Child>,
    names: &mut HashSet<String>,
    requires: &mut Vec<Child>,
) {
    for (name, entry) in entries {
        if entry.bundled || (top && bundled(name)) {
            continue;
        }
        if entry.dev && !policy.wants_dev() {
            continue;
        }
        if entry.optional && policy.no_optional {
            continue;
        }
        if is_trackable(&entry.version) {
            let child = Child::new(name, &entry.version, entry.optional);
            children.entry(child.raw()).or_insert(child);
            names.insert(name.clone());
        }
        requires.extend(
            entry
                .requires
                .iter()
                .map(|(name, range)| Child::new(name, range, entry.optional)),
        );
        nested_children(
            &entry.dependencies,
            false,
            bundled,
            policy,
            children,
            names,
            requires,
        );
    }
}

/// Lockfile v2/v3: a flat `packages` map keyed by install path.
fn locked_child(
    path: &str,
    package: &LockedPackage,
    bundled: &dyn Fn(&str) -> bool,
    policy: WalkPolicy,
    children: &mut IndexMap<String, Child>,
) {
    if path.is_empty() || package.link || package.in_bundle {
        return;
    }
    let Some(name) = name_from_install_path(path).or(package.name.as_deref()) else {
        return;
    };
    if path == format!("node_modules/{name}") && bundled(name) {
        return;
    }
    if (package.dev || package.dev_optional) && !policy.wants_dev() {
        return;
    }
    let optional = package.optional || package.dev_optional;
    if optional && policy.no_optional {
        return;
    }
    let Some(spec) = locked_spec(package) else {
        return;
    };
    let child = Child::new(name, &spec, optional);
    children.entry(child.raw()).or_insert(child);
}

fn locked_spec(package: &LockedPackage) -> Option<String> {
    let resolved = package.resolved.as_deref().filter(|resolved| is_trackable(resolved));
    let version = package.version.as_deref().filter(|version| is_trackable(version));
    match (resolved, version) {
        (Some(resolved), _) if resolved.starts_with("git") => Some(resolved.to_string()),
        (_, Some(version)) if parse_version(version, false).is_some() => Some(version.to_string()),
        (Some(resolved), _) => Some(resolved.to_string()),
        (None, version) => version.map(ToOwned::to_owned),
    }
}

/// Local paths and aliases cannot be fetched into the tracker.
fn is_trackable(spec: &str) -> bool {
    !spec.is_empty() && !spec.starts_with("file:") && !spec.starts_with("npm:")
}

async fn run_children(
    session: &Session,
    children: Vec<Child>,
    policy: WalkPolicy,
) -> Result<Vec<FetchResult>> {
    settle_all(
        children
            .into_iter()
            .map(|child| run_child(session, child, policy)),
    )
    .await
}

/// Run sibling fetches concurrently and flatten their results.
///
/// Every sibling settles before the first failure, in input order, is returned.
pub(crate) async fn settle_all<F>(fetches: impl IntoIterator<Item = F>) -> Result<Vec<FetchResult>>
where
    F: Future<Output = Result<Vec<FetchResult>>>,
{
    let outcomes = join_all(fetches).await;
    let mut results = Vec::new();
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(mut fetched) => results.append(&mut fetched),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

async fn run_child(session: &Session, child: Child, policy: WalkPolicy) -> Result<Vec<FetchResult>> {
    match fetch_child(session, &child, policy).await {
        Err(err) if child.optional => {
            warn!(spec = %child.raw(), error = %format!("{err:#}"), "optional dependency failed; skipping it");
            Ok(vec![FetchResult::failed_optional(child.raw(), &err)])
        }
        outcome => outcome,
    }
}

async fn fetch_child(session: &Session, child: &Child, policy: WalkPolicy) -> Result<Vec<FetchResult>> {
    let spec = PackageSpec::from_name_and_spec(&child.name, &child.spec)?;
    let agent = ItemAgent::for_spec(spec)?;
    agent.run(session, policy).await
}
