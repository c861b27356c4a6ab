//! Index reconstruction by decoding the tarball filenames in the tracker root.
//!
//! Tag aliases and git refs are not recoverable this way; only `semver`, git
//! commits and `url` entries come back.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use dlt_domain::ArtifactName;
use tracing::{debug, warn};

use super::resolve::strip_protocol;
use super::record::TrackerRecord;
use super::tables::{GitEntry, Tables};

pub(crate) fn reconstruct(root: &Path) -> Result<Tables> {
    let mut tables = Tables::default();
    let entries = fs::read_dir(root)
        .with_context(|| format!("failed to scan tracker root {}", root.display()))?;
    let mut restored = 0usize;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "failed to read tracker directory entry during rebuild");
                continue;
            }
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Some(filename) = entry.file_name().to_str().map(ToOwned::to_owned) else {
            continue;
        };
        if metadata.len() == 0 {
            warn!(%filename, "skipping empty tarball during rebuild");
            continue;
        }
        let Some(artifact) = ArtifactName::decode(&filename) else {
            debug!(%filename, "filename does not decode to a package identity");
            continue;
        };
        insert_artifact(&mut tables, filename, artifact);
        restored += 1;
    }
    debug!(root = %root.display(), restored, "tracker index reconstructed from directory");
    Ok(tables)
}

fn insert_artifact(tables: &mut Tables, filename: String, artifact: ArtifactName) {
    match artifact {
        ArtifactName::Semver { name, version } => {
            let record = TrackerRecord {
                filename,
                name: Some(name.clone()),
                version: Some(version.clone()),
                ..TrackerRecord::default()
            };
            tables.semver.entry(name).or_default().insert(version, record);
        }
        ArtifactName::Git {
            domain,
            path,
            commit,
        } => {
            let repo = format!("{domain}/{path}");
            let record = TrackerRecord {
                filename,
                repo: Some(repo.clone()),
                commit: Some(commit.clone()),
                ..TrackerRecord::default()
            };
            tables
                .git
                .entry(repo)
                .or_default()
                .insert(commit, GitEntry::Record(record));
        }
        ArtifactName::Url { url } => {
            let key = strip_protocol(&url).to_string();
            let record = TrackerRecord {
                filename,
                spec: Some(url),
                ..TrackerRecord::default()
            };
            tables.url.insert(key, record);
        }
    }
}
