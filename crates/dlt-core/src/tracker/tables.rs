//! In-memory tables and their JSON form.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::record::TrackerRecord;

pub(crate) const INDEX_VERSION: u64 = 2;
const LATEST_TAG: &str = "latest";
const INDEX_DESCRIPTION: &str =
    "Index of downloaded package tarballs. Maintained by dlt; do not edit by hand.";
const KNOWN_KEYS: [&str; 8] = [
    "semver",
    "tag",
    "git",
    "url",
    "created",
    "updated",
    "description",
    "version",
];

/// A dist-tag pointing into the `semver` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagAlias {
    pub version: String,
}

/// A git table entry: a full record keyed by commit, or a ref naming a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GitEntry {
    Ref(GitRef),
    Record(TrackerRecord),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitRef {
    pub commit: String,
}

impl GitEntry {
    pub(crate) fn as_record(&self) -> Option<&TrackerRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Ref(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Tables {
    pub(crate) semver: BTreeMap<String, BTreeMap<String, TrackerRecord>>,
    pub(crate) tag: BTreeMap<String, BTreeMap<String, TagAlias>>,
    pub(crate) git: BTreeMap<String, BTreeMap<String, GitEntry>>,
    pub(crate) url: BTreeMap<String, TrackerRecord>,
}

/// Result of reading a persisted index; `repaired` counts discarded pieces.
pub(crate) struct LoadedIndex {
    pub(crate) tables: Tables,
    pub(crate) created: Option<String>,
    pub(crate) repaired: usize,
}

impl Tables {
    pub(crate) fn is_empty(&self) -> bool {
        self.semver.is_empty() && self.tag.is_empty() && self.git.is_empty() && self.url.is_empty()
    }

    /// Read tables out of a parsed index, keeping every entry that is well formed.
    pub(crate) fn from_index(value: Value) -> LoadedIndex {
        let mut loaded = LoadedIndex {
            tables: Self::default(),
            created: None,
            repaired: 0,
        };
        let Value::Object(mut root) = value else {
            warn!("tracker index is not a JSON object; discarding it");
            loaded.repaired += 1;
            return loaded;
        };

        for key in root.keys().filter(|key| !KNOWN_KEYS.contains(&key.as_str())) {
            warn!(section = %key, "discarding unknown tracker index section");
            loaded.repaired += 1;
        }
        match root.get("version").and_then(Value::as_u64) {
            Some(INDEX_VERSION) => {}
            other => {
                warn!(found = ?other, expected = INDEX_VERSION, "tracker index version mismatch");
                loaded.repaired += 1;
            }
        }
        loaded.created = root
            .remove("created")
            .and_then(|value| value.as_str().map(ToOwned::to_owned));

        if let Some(section) = root.remove("semver") {
            loaded.tables.semver = nested_section("semver", section, &mut loaded.repaired);
        }
        if let Some(section) = root.remove("tag") {
            loaded.tables.tag = nested_section("tag", section, &mut loaded.repaired);
            loaded.tables.tag.retain(|name, tags| {
                if tags.remove(LATEST_TAG).is_some() {
                    warn!(%name, "discarding stored 'latest' tag; latest resolves through semver");
                    loaded.repaired += 1;
                }
                !tags.is_empty()
            });
        }
        if let Some(section) = root.remove("git") {
            loaded.tables.git = nested_section("git", section, &mut loaded.repaired);
        }
        if let Some(section) = root.remove("url") {
            loaded.tables.url = flat_section("url", section, &mut loaded.repaired);
        }
        loaded
    }

    /// Render the persisted index; empty tables are left out.
    pub(crate) fn to_index(&self, created: &str, updated: Option<&str>) -> Value {
        let mut root = Map::new();
        if !self.semver.is_empty() {
            root.insert("semver".into(), to_value(&self.semver));
        }
        if !self.tag.is_empty() {
            root.insert("tag".into(), to_value(&self.tag));
        }
        if !self.git.is_empty() {
            root.insert("git".into(), to_value(&self.git));
        }
        if !self.url.is_empty() {
            root.insert("url".into(), to_value(&self.url));
        }
        root.insert("created".into(), Value::String(created.to_string()));
        if let Some(updated) = updated {
            root.insert("updated".into(), Value::String(updated.to_string()));
        }
        root.insert(
            "description".into(),
            Value::String(INDEX_DESCRIPTION.to_string()),
        );
        root.insert("version".into(), Value::from(INDEX_VERSION));
        Value::Object(root)
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn flat_section<T: DeserializeOwned>(
    section: &str,
    value: Value,
    repaired: &mut usize,
) -> BTreeMap<String, T> {
    let Value::Object(entries) = value else {
        warn!(%section, "tracker index section is not an object; discarding it");
        *repaired += 1;
        return BTreeMap::new();
    };
    let mut table = BTreeMap::new();
    for (key, entry) in entries {
        match serde_json::from_value::<T>(entry) {
            Ok(parsed) => {
                table.insert(key, parsed);
            }
            Err(err) => {
                warn!(%section, %key, %err, "discarding malformed tracker entry");
                *repaired += 1;
            }
        }
    }
    table
}

fn nested_section<T: DeserializeOwned>(
    section: &str,
    value: Value,
    repaired: &mut usize,
) -> BTreeMap<String, BTreeMap<String, T>> {
    let Value::Object(groups) = value else {
        warn!(%section, "tracker index section is not an object; discarding it");
        *repaired += 1;
        return BTreeMap::new();
    };
    let mut table = BTreeMap::new();
    for (group, entries) in groups {
        let parsed: BTreeMap<String, T> = flat_section(section, entries, repaired);
        if parsed.is_empty() {
            continue;
        }
        table.insert(group, parsed);
    }
    table
}
