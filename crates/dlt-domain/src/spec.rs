//! Package specifier parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hosted::{parse_git_url, HostedGit};
use crate::range::{clean, is_valid_range};

const MAX_NAME_LENGTH: usize = 214;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid package name '{0}'")]
    InvalidName(String),
    #[error("unsupported specifier '{raw}': {kind} dependencies cannot be tracked")]
    Unsupported { raw: String, kind: &'static str },
    #[error("invalid specifier '{0}'")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    Version,
    Range,
    Tag,
    Git,
    Remote,
}

impl SpecKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Range => "range",
            Self::Tag => "tag",
            Self::Git => "git",
            Self::Remote => "remote",
        }
    }

    #[must_use]
    pub fn is_registry(self) -> bool {
        matches!(self, Self::Version | Self::Range | Self::Tag)
    }
}

/// A parsed package reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub kind: SpecKind,
    pub name: Option<String>,
    /// What a fetcher should ask for: the cleaned version, the range, the tag
    /// name, or the remote URL without its fragment.
    pub fetch_spec: String,
    /// The specifier part as written, without the name.
    pub raw_spec: String,
    /// The whole input as written.
    pub raw: String,
    pub hosted: Option<HostedGit>,
}

impl PackageSpec {
    /// Parse a `name@spec`, bare `name`, git remote, or tarball URL.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SpecError::Invalid(raw.to_string()));
        }
        if looks_like_location(raw) {
            return Self::resolve(None, raw, raw.to_string());
        }

        let split_at = if let Some(rest) = raw.strip_prefix('@') {
            rest.find('@').map(|index| index + 1)
        } else {
            raw.find('@')
        };
        let (name, spec) = match split_at {
            Some(index) => (&raw[..index], &raw[index + 1..]),
            None => (raw, ""),
        };
        Self::resolve(Some(name), spec, raw.to_string())
    }

    /// Build a specifier from a dependency map entry such as `"a": "^1.0.0"`.
    pub fn from_name_and_spec(name: &str, spec: &str) -> Result<Self, SpecError> {
        let raw = if spec.is_empty() {
            name.to_string()
        } else {
            format!("{name}@{spec}")
        };
        Self::resolve(Some(name), spec, raw)
    }

    fn resolve(name: Option<&str>, spec: &str, raw: String) -> Result<Self, SpecError> {
        if let Some(name) = name {
            if !is_valid_package_name(name) {
                return Err(SpecError::InvalidName(name.to_string()));
            }
        }
        let spec = spec.trim();
        if let Some(kind) = unsupported_kind(spec) {
            return Err(SpecError::Unsupported { raw, kind });
        }
        let build = |kind, fetch_spec: String, hosted| Self {
            kind,
            name: name.map(ToOwned::to_owned),
            fetch_spec,
            raw_spec: spec.to_string(),
            raw: raw.clone(),
            hosted,
        };

        if spec.is_empty() {
            return Ok(build(SpecKind::Range, "*".to_string(), None));
        }
        if let Some(hosted) = HostedGit::parse(spec) {
            return Ok(build(SpecKind::Git, hosted.https_url(), Some(hosted)));
        }
        if is_git_remote(spec) {
            let fetch_spec = spec.split('#').next().unwrap_or(spec).to_string();
            return Ok(build(SpecKind::Git, fetch_spec, None));
        }
        if spec.starts_with("http://") || spec.starts_with("https://") {
            url::Url::parse(spec).map_err(|_| SpecError::Invalid(raw.clone()))?;
            return Ok(build(SpecKind::Remote, spec.to_string(), None));
        }
        if let Some(version) = clean(spec) {
            return Ok(build(SpecKind::Version, version, None));
        }
        if is_valid_range(spec) {
            return Ok(build(SpecKind::Range, spec.to_string(), None));
        }
        if is_valid_tag(spec) {
            return Ok(build(SpecKind::Tag, spec.to_string(), None));
        }
        Err(SpecError::Invalid(raw))
    }

    /// A request that any release will satisfy: no spec, `*`, or the `latest` tag.
    #[must_use]
    pub fn is_implicit_latest(&self) -> bool {
        match self.kind {
            SpecKind::Range => matches!(self.fetch_spec.as_str(), "*" | "" | "x" | "X"),
            SpecKind::Tag => self.fetch_spec == "latest",
            _ => false,
        }
    }

    #[must_use]
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// npm's naming rules. Uppercase letters are accepted so that legacy
/// packages such as `JSONStream` can still be named.
#[must_use]
pub fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || name.trim() != name {
        return false;
    }
    let bare = match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, bare)) if is_name_segment(scope) => bare,
            _ => return false,
        },
        None => name,
    };
    is_name_segment(bare) && !bare.starts_with('.') && !bare.starts_with('_')
}

fn is_name_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '!'))
}

fn is_valid_tag(spec: &str) -> bool {
    spec.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        && !spec.starts_with('.')
}

/// A bare git remote, hosted shortcut or tarball URL with no `name@` in front.
fn looks_like_location(raw: &str) -> bool {
    if let Some(index) = raw.find("://") {
        let head = &raw[..index];
        return !head.strip_prefix('@').unwrap_or(head).contains('@');
    }
    raw.starts_with("git@")
        || raw.starts_with("github:")
        || raw.starts_with("gitlab:")
        || raw.starts_with("bitbucket:")
        || (!raw.starts_with('@') && !raw.contains('@') && HostedGit::parse(raw).is_some())
}

fn is_git_remote(spec: &str) -> bool {
    if spec.starts_with("git+") || spec.starts_with("git://") {
        return true;
    }
    if spec.starts_with("git@") {
        return parse_git_url(spec.split('#').next().unwrap_or(spec)).is_some();
    }
    false
}

fn unsupported_kind(spec: &str) -> Option<&'static str> {
    if spec.starts_with("file:") {
        Some("file")
    } else if spec.starts_with("npm:") {
        Some("alias")
    } else if spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec.starts_with("~/")
    {
        Some("directory")
    } else {
        None
    }
}
