use std::fmt;

use dlt_domain::{is_valid_package_name, parse_version, SpecKind};
use serde::{Deserialize, Serialize};

use super::errors::TrackerError;

/// The four disjoint tables of the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Semver,
    Tag,
    Git,
    Url,
}

impl RecordType {
    pub const ALL: [Self; 4] = [Self::Semver, Self::Tag, Self::Git, Self::Url];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semver => "semver",
            Self::Tag => "tag",
            Self::Git => "git",
            Self::Url => "url",
        }
    }

    /// Table a parsed specifier of `kind` is tracked in.
    #[must_use]
    pub fn for_spec_kind(kind: SpecKind) -> Self {
        match kind {
            SpecKind::Version | SpecKind::Range => Self::Semver,
            SpecKind::Tag => Self::Tag,
            SpecKind::Git => Self::Git,
            SpecKind::Remote => Self::Url,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RecordType {
    type Error = TrackerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "semver" => Ok(Self::Semver),
            "tag" => Ok(Self::Tag),
            "git" => Ok(Self::Git),
            "url" => Ok(Self::Url),
            other => Err(TrackerError::Type(format!("unknown record type '{other}'"))),
        }
    }
}

/// One downloaded tarball and where it came from.
///
/// Which optional fields are required depends on the table the record is
/// added to; see [`TrackerRecord::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl TrackerRecord {
    /// Check that the fields `kind` needs are present and well formed.
    pub fn validate(&self, kind: RecordType) -> Result<(), TrackerError> {
        if self.filename.is_empty() {
            return Err(TrackerError::Type(format!(
                "{kind} record requires a filename"
            )));
        }
        if self.filename.contains(['/', '\\']) || self.filename == "." || self.filename == ".." {
            return Err(TrackerError::Syntax(format!(
                "filename '{}' must name a file directly inside the tracker root",
                self.filename
            )));
        }
        match kind {
            RecordType::Semver => self.validate_registry(kind),
            RecordType::Tag => {
                self.validate_registry(kind)?;
                let tag = required(self.spec.as_deref(), kind, "spec")?;
                if parse_version(tag, true).is_some() {
                    return Err(TrackerError::Syntax(format!(
                        "tag '{tag}' looks like a version"
                    )));
                }
                if tag.contains(char::is_whitespace) {
                    return Err(TrackerError::Syntax(format!("invalid tag '{tag}'")));
                }
                Ok(())
            }
            RecordType::Git => {
                required(self.repo.as_deref(), kind, "repo")?;
                let commit = required(self.commit.as_deref(), kind, "commit")?;
                if commit.contains(char::is_whitespace) {
                    return Err(TrackerError::Syntax(format!("invalid commit '{commit}'")));
                }
                if let Some(refs) = &self.refs {
                    if refs.iter().any(|reference| reference.trim().is_empty()) {
                        return Err(TrackerError::Syntax(
                            "git refs must be non-empty strings".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            RecordType::Url => {
                let spec = required(self.spec.as_deref(), kind, "spec")?;
                match url::Url::parse(spec) {
                    Ok(url) if url.scheme() != "file" => Ok(()),
                    _ => Err(TrackerError::Syntax(format!("invalid url '{spec}'"))),
                }
            }
        }
    }

    fn validate_registry(&self, kind: RecordType) -> Result<(), TrackerError> {
        let name = required(self.name.as_deref(), kind, "name")?;
        if !is_valid_package_name(name) {
            return Err(TrackerError::Syntax(format!("invalid package name '{name}'")));
        }
        let version = required(self.version.as_deref(), kind, "version")?;
        if parse_version(version, false).is_none() {
            return Err(TrackerError::Syntax(format!("invalid version '{version}'")));
        }
        Ok(())
    }
}

fn required<'a>(
    value: Option<&'a str>,
    kind: RecordType,
    field: &str,
) -> Result<&'a str, TrackerError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(TrackerError::Type(format!(
            "{kind} record requires a non-empty {field}"
        ))),
    }
}
