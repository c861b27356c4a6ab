//! Download tracker: a persistent index from package identity to tarball.
//!
//! Four disjoint tables live in `<root>/dltracker.json`:
//! - `semver[name][version]` holds full records
//! - `tag[name][tag]` aliases a version in `semver`
//! - `git[repo][commit]` holds full records and `git[repo][ref]` names a commit
//! - `url[spec-without-scheme]` holds full records
//!
//! A missing index is rebuilt from the tarball filenames; a damaged one is
//! repaired on load. Neither is fatal.

mod audit;
mod errors;
mod rebuild;
mod record;
mod resolve;
mod tables;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub use audit::AuditIssue;
pub use errors::TrackerError;
pub use record::{RecordType, TrackerRecord};
pub use resolve::strip_protocol;

use audit::{audit_tables, check_tarball};
use rebuild::reconstruct;
use tables::{GitEntry, GitRef, TagAlias, Tables};

pub const INDEX_FILENAME: &str = "dltracker.json";
const LATEST_TAG: &str = "latest";

#[derive(Debug)]
pub struct DownloadTracker {
    root: PathBuf,
    tables: Tables,
    created: String,
    /// Whether an index file was on disk when the tracker was opened.
    existed: bool,
    dirty: bool,
}

/// One tracked record together with the table and key it is filed under.
#[derive(Clone, Debug, Serialize)]
pub struct TrackedEntry<'a> {
    #[serde(rename = "type")]
    pub kind: RecordType,
    pub key: String,
    #[serde(flatten)]
    pub record: &'a TrackerRecord,
}

impl DownloadTracker {
    /// Open the tracker rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = prepare_root(root.as_ref())?;
        let index_path = root.join(INDEX_FILENAME);
        match fs::read_to_string(&index_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(value) => {
                    let loaded = Tables::from_index(value);
                    if loaded.repaired > 0 {
                        warn!(
                            path = %index_path.display(),
                            repaired = loaded.repaired,
                            "tracker index had malformed entries; they were discarded"
                        );
                    }
                    Ok(Self {
                        root,
                        tables: loaded.tables,
                        created: loaded.created.unwrap_or_else(now_timestamp),
                        existed: true,
                        dirty: loaded.repaired > 0,
                    })
                }
                Err(err) => {
                    warn!(
                        path = %index_path.display(),
                        %err,
                        "tracker index is not valid JSON; reconstructing from directory"
                    );
                    let tables = reconstruct(&root)?;
                    Ok(Self {
                        root,
                        tables,
                        created: now_timestamp(),
                        existed: true,
                        dirty: true,
                    })
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let tables = reconstruct(&root)?;
                let dirty = !tables.is_empty();
                if dirty {
                    debug!(root = %root.display(), "no tracker index; restored entries from filenames");
                }
                Ok(Self {
                    root,
                    tables,
                    created: now_timestamp(),
                    existed: false,
                    dirty,
                })
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to read tracker index {}", index_path.display())),
        }
    }

    /// Discard any index and rebuild the tables from the tarball filenames alone.
    pub fn rebuild(root: impl AsRef<Path>) -> Result<Self> {
        let root = prepare_root(root.as_ref())?;
        let existed = root.join(INDEX_FILENAME).is_file();
        let tables = reconstruct(&root)?;
        Ok(Self {
            root,
            tables,
            created: now_timestamp(),
            existed,
            dirty: true,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Register a downloaded tarball.
    ///
    /// The record is validated for `kind` and its file checked on disk before
    /// anything is inserted, so a failed `add` leaves the tracker untouched.
    pub fn add(&mut self, kind: RecordType, record: TrackerRecord) -> Result<(), TrackerError> {
        record.validate(kind)?;
        check_tarball(&self.root, &record.filename)?;

        match kind {
            RecordType::Semver => self.insert_semver(record),
            RecordType::Tag => {
                let tag = record.spec.clone().unwrap_or_default();
                let name = record.name.clone().unwrap_or_default();
                let version = record.version.clone().unwrap_or_default();
                self.insert_semver(record);
                if tag != LATEST_TAG {
                    self.tables
                        .tag
                        .entry(name)
                        .or_default()
                        .insert(tag, TagAlias { version });
                }
            }
            RecordType::Git => {
                let repo = record.repo.clone().unwrap_or_default();
                let commit = record.commit.clone().unwrap_or_default();
                let refs = record.refs.clone().unwrap_or_default();
                let entries = self.tables.git.entry(repo).or_default();
                for reference in refs.into_iter().filter(|reference| *reference != commit) {
                    entries.insert(
                        reference,
                        GitEntry::Ref(GitRef {
                            commit: commit.clone(),
                        }),
                    );
                }
                entries.insert(commit, GitEntry::Record(record));
            }
            RecordType::Url => {
                let key = strip_protocol(record.spec.as_deref().unwrap_or_default()).to_string();
                self.tables.url.insert(key, record);
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn insert_semver(&mut self, record: TrackerRecord) {
        let name = record.name.clone().unwrap_or_default();
        let version = record.version.clone().unwrap_or_default();
        self.tables
            .semver
            .entry(name)
            .or_default()
            .insert(version, record);
    }

    /// For `git`, `name` is the repo identity (`domain/path`); for `url` it must be empty.
    #[must_use]
    pub fn contains(&self, kind: RecordType, name: &str, spec: &str) -> bool {
        self.get_data(kind, name, spec).is_some()
    }

    #[must_use]
    pub fn get_data(&self, kind: RecordType, name: &str, spec: &str) -> Option<&TrackerRecord> {
        self.lookup(kind, name, spec, false)
    }

    /// Like [`DownloadTracker::get_data`], but versions and ranges are read
    /// loosely and a cleaned version is tried as an exact key first.
    #[must_use]
    pub fn get_data_loose(
        &self,
        kind: RecordType,
        name: &str,
        spec: &str,
    ) -> Option<&TrackerRecord> {
        self.lookup(kind, name, spec, true)
    }

    fn lookup(&self, kind: RecordType, name: &str, spec: &str, loose: bool) -> Option<&TrackerRecord> {
        match kind {
            RecordType::Semver => self.tables.semver_record(name, spec, loose),
            RecordType::Tag => self.tables.tag_record(name, spec, loose),
            RecordType::Git => self.tables.git_record(name, spec, loose),
            RecordType::Url => self.tables.url_record(name, spec),
        }
    }

    /// Check every record and alias, repairing schema drift in place.
    pub fn audit(&mut self) -> Vec<AuditIssue> {
        let (issues, repaired) = audit_tables(&self.root, &mut self.tables);
        if repaired > 0 {
            self.dirty = true;
        }
        debug!(
            root = %self.root.display(),
            issues = issues.len(),
            repaired,
            "tracker audit finished"
        );
        issues
    }

    /// Write the index if anything changed since it was loaded. Returns whether a write happened.
    pub fn serialize(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let now = now_timestamp();
        let updated = self.existed.then_some(now.as_str());
        let index = self.tables.to_index(&self.created, updated);
        let contents = serde_json::to_vec_pretty(&index).context("failed to render tracker index")?;

        let index_path = self.root.join(INDEX_FILENAME);
        let temp_path = self.root.join(format!("{INDEX_FILENAME}.partial"));
        fs::write(&temp_path, contents)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &index_path).with_context(|| {
            format!(
                "failed to move tracker index into place ({} -> {})",
                temp_path.display(),
                index_path.display()
            )
        })?;
        debug!(path = %index_path.display(), "tracker index written");
        self.existed = true;
        self.dirty = false;
        Ok(true)
    }

    /// Every full record, in table order. Git refs are folded into their commit's record.
    #[must_use]
    pub fn records(&self) -> Vec<TrackedEntry<'_>> {
        let mut entries = Vec::new();
        for (name, versions) in &self.tables.semver {
            for (version, record) in versions {
                entries.push(TrackedEntry {
                    kind: RecordType::Semver,
                    key: format!("{name}@{version}"),
                    record,
                });
            }
        }
        for (name, tags) in &self.tables.tag {
            for (tag, alias) in tags {
                if let Some(record) = self
                    .tables
                    .semver
                    .get(name)
                    .and_then(|versions| versions.get(&alias.version))
                {
                    entries.push(TrackedEntry {
                        kind: RecordType::Tag,
                        key: format!("{name}@{tag}"),
                        record,
                    });
                }
            }
        }
        for (repo, commits) in &self.tables.git {
            for (commit, entry) in commits {
                if let Some(record) = entry.as_record() {
                    entries.push(TrackedEntry {
                        kind: RecordType::Git,
                        key: format!("{repo}#{commit}"),
                        record,
                    });
                }
            }
        }
        for (key, record) in &self.tables.url {
            entries.push(TrackedEntry {
                kind: RecordType::Url,
                key: key.clone(),
                record,
            });
        }
        entries
    }
}

fn prepare_root(root: &Path) -> Result<PathBuf> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(TrackerError::NotADirectory(root.to_path_buf()).into()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(root)
                .with_context(|| format!("failed to create tracker root {}", root.display()))?;
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to inspect tracker root {}", root.display()));
        }
    }
    Ok(root.to_path_buf())
}

fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
