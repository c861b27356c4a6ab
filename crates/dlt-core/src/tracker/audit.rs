//! Integrity checks over the tables and the tarballs they reference.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use dlt_domain::has_tarball_extension;
use serde::Serialize;
use tracing::warn;

use super::errors::TrackerError;
use super::record::{RecordType, TrackerRecord};
use super::tables::{GitEntry, Tables};

/// A content problem found by an audit. Audits report these; they never delete data.
#[derive(Clone, Debug, Serialize)]
pub struct AuditIssue {
    #[serde(rename = "type")]
    pub kind: RecordType,
    /// `name@version`, `name@tag`, `repo#commit` or the url key.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TrackerRecord>,
    pub code: &'static str,
    pub message: String,
    #[serde(skip)]
    pub error: TrackerError,
}

impl AuditIssue {
    fn new(kind: RecordType, key: String, record: Option<&TrackerRecord>, error: TrackerError) -> Self {
        Self {
            kind,
            key,
            record: record.cloned(),
            code: error.code(),
            message: error.to_string(),
            error,
        }
    }
}

/// Check that `filename` names a non-empty regular tarball directly under `root`.
pub(crate) fn check_tarball(root: &Path, filename: &str) -> Result<(), TrackerError> {
    if !has_tarball_extension(filename) {
        return Err(TrackerError::BadFilename(filename.to_string()));
    }
    let path = root.join(filename);
    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(TrackerError::MissingFile(filename.to_string()));
        }
        Err(err) => {
            return Err(TrackerError::Io {
                path: filename.to_string(),
                message: err.to_string(),
            });
        }
    };
    if !metadata.is_file() {
        return Err(TrackerError::NotRegularFile(filename.to_string()));
    }
    if metadata.len() == 0 {
        return Err(TrackerError::ZeroLength(filename.to_string()));
    }
    Ok(())
}

/// Walk every table, fixing schema drift in place and collecting content issues.
///
/// Returns the issues and the number of in-place repairs.
pub(crate) fn audit_tables(root: &Path, tables: &mut Tables) -> (Vec<AuditIssue>, usize) {
    let mut issues = Vec::new();
    let mut repaired = 0;

    for (name, versions) in &mut tables.semver {
        for (version, record) in versions.iter_mut() {
            repaired += align(&mut record.name, name, "name");
            repaired += align(&mut record.version, version, "version");
            if let Err(error) = check_tarball(root, &record.filename) {
                issues.push(AuditIssue::new(
                    RecordType::Semver,
                    format!("{name}@{version}"),
                    Some(&*record),
                    error,
                ));
            }
        }
    }

    for (name, tags) in &mut tables.tag {
        if tags.remove("latest").is_some() {
            warn!(%name, "removing 'latest' tag entry; latest resolves through semver");
            repaired += 1;
        }
        for (tag, alias) in tags.iter() {
            let target = tables
                .semver
                .get(name)
                .and_then(|versions| versions.get(&alias.version));
            if target.is_none() {
                issues.push(AuditIssue::new(
                    RecordType::Tag,
                    format!("{name}@{tag}"),
                    None,
                    TrackerError::NoData(format!(
                        "tag '{tag}' of {name} points at untracked version {}",
                        alias.version
                    )),
                ));
            }
        }
    }

    for (repo, entries) in &mut tables.git {
        for (key, entry) in entries.iter_mut() {
            if let GitEntry::Record(record) = entry {
                repaired += align(&mut record.repo, repo, "repo");
                repaired += align(&mut record.commit, key, "commit");
            }
        }
        for (key, entry) in entries.iter() {
            match entry {
                GitEntry::Record(record) => {
                    if let Err(error) = check_tarball(root, &record.filename) {
                        issues.push(AuditIssue::new(
                            RecordType::Git,
                            format!("{repo}#{key}"),
                            Some(record),
                            error,
                        ));
                    }
                }
                GitEntry::Ref(reference) => {
                    if entries
                        .get(&reference.commit)
                        .and_then(GitEntry::as_record)
                        .is_none()
                    {
                        issues.push(AuditIssue::new(
                            RecordType::Git,
                            format!("{repo}#{key}"),
                            None,
                            TrackerError::OrphanRef {
                                repo: repo.clone(),
                                reference: key.clone(),
                                commit: reference.commit.clone(),
                            },
                        ));
                    }
                }
            }
        }
    }

    for (key, record) in &tables.url {
        if let Err(error) = check_tarball(root, &record.filename) {
            issues.push(AuditIssue::new(RecordType::Url, key.clone(), Some(record), error));
        }
    }

    repaired += prune_empty(&mut tables.semver, "semver");
    repaired += prune_empty(&mut tables.tag, "tag");
    repaired += prune_empty(&mut tables.git, "git");

    (issues, repaired)
}

/// Make a record field agree with the key it is filed under.
fn align(field: &mut Option<String>, expected: &str, label: &str) -> usize {
    if field.as_deref() == Some(expected) {
        return 0;
    }
    warn!(field = label, found = ?field, %expected, "repairing tracker record field");
    *field = Some(expected.to_string());
    1
}

fn prune_empty<T>(table: &mut BTreeMap<String, BTreeMap<String, T>>, section: &str) -> usize {
    let before = table.len();
    table.retain(|group, entries| {
        if entries.is_empty() {
            warn!(%section, %group, "removing empty tracker group");
            false
        } else {
            true
        }
    });
    before - table.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::tables::{GitRef, TagAlias};
    use tempfile::tempdir;

    #[test]
    fn check_tarball_reports_each_file_problem() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("ok.tar.gz"), b"data").expect("write");
        fs::write(temp.path().join("empty.tgz"), b"").expect("write");
        fs::create_dir(temp.path().join("dir.tar.gz")).expect("mkdir");

        let code = |name: &str| check_tarball(temp.path(), name).map_err(|err| err.code());
        assert_eq!(code("ok.tar.gz"), Ok(()));
        assert_eq!(code("empty.tgz"), Err("EFZEROLEN"));
        assert_eq!(code("dir.tar.gz"), Err("EFNOTREG"));
        assert_eq!(code("missing.tar.gz"), Err("ENOENT"));
        assert_eq!(code("notes.txt"), Err("EFNAME"));
    }

    #[test]
    fn repairs_schema_and_reports_integrity() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("p-1.0.0.tar.gz"), b"data").expect("write");

        let mut tables = Tables::default();
        tables.semver.entry("p".into()).or_default().insert(
            "1.0.0".into(),
            TrackerRecord {
                filename: "p-1.0.0.tar.gz".into(),
                name: Some("wrong".into()),
                version: Some("1.0.0".into()),
                ..TrackerRecord::default()
            },
        );
        tables.semver.insert("empty".into(), BTreeMap::new());
        let tags = tables.tag.entry("p".into()).or_default();
        tags.insert("latest".into(), TagAlias { version: "1.0.0".into() });
        tags.insert("next".into(), TagAlias { version: "9.9.9".into() });
        tables.git.entry("github.com/u/p".into()).or_default().insert(
            "main".into(),
            GitEntry::Ref(GitRef { commit: "abc".into() }),
        );

        let (issues, repaired) = audit_tables(temp.path(), &mut tables);

        assert_eq!(tables.semver["p"]["1.0.0"].name.as_deref(), Some("p"));
        assert!(!tables.semver.contains_key("empty"));
        assert!(!tables.tag["p"].contains_key("latest"));
        // name fix, latest removal, empty group
        assert_eq!(repaired, 3);

        let mut codes = issues.iter().map(|issue| issue.code).collect::<Vec<_>>();
        codes.sort_unstable();
        assert_eq!(codes, vec!["ENODATA", "EORPHANREF"]);
    }
}
