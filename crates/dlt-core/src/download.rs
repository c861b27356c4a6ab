//! Session drivers: fetch root specifiers or a whole project, then write the index once.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use dlt_domain::{PackageManifest, PackageSpec, Shrinkwrap};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{FetchResult, ItemAgent};
use crate::session::Session;
use crate::walker::{settle_all, walk, walk_shrinkwrap};

const MANIFEST_FILENAME: &str = "package.json";
const LOCKFILE_NAMES: [&str; 2] = ["npm-shrinkwrap.json", "package-lock.json"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSummary {
    pub fetched: usize,
    pub duplicates: usize,
    pub failed_optional: usize,
    pub results: Vec<FetchResult>,
}

impl DownloadSummary {
    #[must_use]
    pub fn from_results(results: Vec<FetchResult>) -> Self {
        let duplicates = results.iter().filter(|result| result.duplicate).count();
        let failed_optional = results.iter().filter(|result| result.failed_optional).count();
        Self {
            fetched: results.len() - duplicates - failed_optional,
            duplicates,
            failed_optional,
            results,
        }
    }
}

/// Fetch each root specifier with its dependency graph.
///
/// Every specifier is parsed before anything is fetched. The tracker index is
/// written once after all roots settle, including when one of them failed.
pub async fn download_specs(session: &Session, specs: &[String]) -> Result<DownloadSummary> {
    let agents = specs
        .iter()
        .map(|raw| {
            let spec = PackageSpec::parse(raw).with_context(|| format!("invalid specifier '{raw}'"))?;
            ItemAgent::for_spec(spec).with_context(|| format!("cannot track '{raw}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let policy = session.policy().root();
    let outcome = settle_all(agents.into_iter().map(|agent| agent.run(session, policy))).await;
    finish(session, outcome)
}

/// Fetch the dependencies of the project in `dir`.
///
/// An `npm-shrinkwrap.json` or `package-lock.json` next to `package.json`
/// takes precedence over the manifest's dependency maps.
pub async fn download_project(session: &Session, dir: &Path) -> Result<DownloadSummary> {
    let manifest: PackageManifest = read_json(&dir.join(MANIFEST_FILENAME))
        .await?
        .with_context(|| format!("no {MANIFEST_FILENAME} in {}", dir.display()))?;

    let mut lockfile = None;
    for name in LOCKFILE_NAMES {
        if let Some(found) = read_json::<Shrinkwrap>(&dir.join(name)).await? {
            debug!(lockfile = name, "using lockfile");
            lockfile = Some(found);
            break;
        }
    }

    let policy = session.policy().root();
    let outcome = match lockfile.filter(|lock| !lock.is_empty()) {
        Some(lock) => walk_shrinkwrap(session, &lock, Some(&manifest), policy).await,
        None => walk(session, &manifest, policy).await,
    };
    finish(session, outcome)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn finish(session: &Session, outcome: Result<Vec<FetchResult>>) -> Result<DownloadSummary> {
    let written = session.serialize();
    let results = match outcome {
        Ok(results) => results,
        Err(err) => {
            if let Err(write_err) = written {
                warn!(error = %format!("{write_err:#}"), "failed to write tracker index");
            }
            return Err(err);
        }
    };
    if written? {
        debug!("tracker index updated");
    }
    let summary = DownloadSummary::from_results(results);
    info!(
        fetched = summary.fetched,
        duplicates = summary.duplicates,
        failed_optional = summary.failed_optional,
        "download session finished"
    );
    Ok(summary)
}
