//! Spec-to-record lookups over the tables.

use std::collections::BTreeMap;

use dlt_domain::{clean_version, max_satisfying};

use super::record::TrackerRecord;
use super::tables::{GitEntry, Tables};

const DEFAULT_BRANCHES: [&str; 2] = ["master", "main"];
const SEMVER_PREFIX: &str = "semver:";

/// Drop a leading `scheme://` so `http`/`https`/`git+https` forms share a key.
#[must_use]
pub fn strip_protocol(spec: &str) -> &str {
    match spec.find("://") {
        Some(index) => &spec[index + 3..],
        None => spec,
    }
}

impl Tables {
    pub(crate) fn semver_record(&self, name: &str, spec: &str, loose: bool) -> Option<&TrackerRecord> {
        let versions = self.semver.get(name)?;
        if let Some(record) = versions.get(spec) {
            return Some(record);
        }
        if loose {
            if let Some(record) = clean_version(spec).and_then(|cleaned| versions.get(&cleaned)) {
                return Some(record);
            }
        }
        let best = max_satisfying(versions.keys().map(String::as_str), spec, loose)?;
        versions.get(best)
    }

    pub(crate) fn tag_record(&self, name: &str, tag: &str, loose: bool) -> Option<&TrackerRecord> {
        if tag == "latest" {
            return self.semver_record(name, "*", loose);
        }
        let alias = self.tag.get(name)?.get(tag)?;
        self.semver.get(name)?.get(&alias.version)
    }

    pub(crate) fn git_record(&self, repo: &str, spec: &str, loose: bool) -> Option<&TrackerRecord> {
        let entries = self.git.get(repo)?;

        if !spec.is_empty() {
            if let Some(entry) = entries.get(spec) {
                return follow(entries, entry);
            }
            let range = spec.strip_prefix(SEMVER_PREFIX)?;
            let candidates = entries
                .values()
                .filter_map(GitEntry::as_record)
                .filter_map(|record| record.version.as_deref().map(|version| (version, record)))
                .collect::<Vec<_>>();
            let best = max_satisfying(candidates.iter().map(|(version, _)| *version), range, loose)?;
            return candidates
                .into_iter()
                .find(|(version, _)| *version == best)
                .map(|(_, record)| record);
        }

        for branch in DEFAULT_BRANCHES {
            if let Some(entry) = entries.get(branch) {
                return follow(entries, entry);
            }
        }
        let mut records = entries.values().filter_map(GitEntry::as_record);
        match (records.next(), records.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// URL records are keyed without the scheme and are never looked up by name.
    pub(crate) fn url_record(&self, name: &str, spec: &str) -> Option<&TrackerRecord> {
        if !name.is_empty() {
            return None;
        }
        self.url.get(strip_protocol(spec))
    }
}

fn follow<'a>(
    entries: &'a BTreeMap<String, GitEntry>,
    entry: &'a GitEntry,
) -> Option<&'a TrackerRecord> {
    match entry {
        GitEntry::Record(record) => Some(record),
        GitEntry::Ref(reference) => entries.get(&reference.commit)?.as_record(),
    }
}
