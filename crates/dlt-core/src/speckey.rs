//! Mapping parsed specifiers onto tracker keys.

use dlt_domain::{parse_git_url, PackageSpec, SpecKind};

use crate::tracker::{strip_protocol, RecordType, TrackerError};

/// Repository identity and requested committish for a git specifier.
///
/// Every remote form of the same repository (ssh, https, `git://`, hosted
/// shortcut) yields the same `repo`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitKey {
    /// `<domain>/<path>`, without a trailing `.git`.
    pub repo: String,
    /// The fragment of the specifier, or empty for the default branch.
    pub spec: String,
    pub domain: String,
    pub path: String,
}

pub fn derive_git_key(spec: &PackageSpec) -> Result<GitKey, TrackerError> {
    if spec.kind != SpecKind::Git {
        return Err(TrackerError::Type(format!(
            "'{}' is a {} specifier, not git",
            spec.raw,
            spec.kind.as_str()
        )));
    }
    if let Some(hosted) = &spec.hosted {
        let domain = hosted.domain().to_string();
        let path = hosted.path();
        return Ok(GitKey {
            repo: format!("{domain}/{path}"),
            spec: hosted.committish.clone().unwrap_or_default(),
            domain,
            path,
        });
    }

    let url = parse_git_url(&spec.raw_spec)
        .ok_or_else(|| TrackerError::Type(format!("'{}' is not a git URL", spec.raw_spec)))?;
    let host = url
        .host_str()
        .ok_or_else(|| TrackerError::Type(format!("git URL '{}' has no host", spec.raw_spec)))?;
    let domain = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let trimmed = url.path().trim_matches('/');
    let path = trimmed.strip_suffix(".git").unwrap_or(trimmed).to_string();
    if path.is_empty() {
        return Err(TrackerError::Type(format!(
            "git URL '{}' has no repository path",
            spec.raw_spec
        )));
    }
    Ok(GitKey {
        repo: format!("{domain}/{path}"),
        spec: url.fragment().unwrap_or_default().to_string(),
        domain,
        path,
    })
}

/// Where a specifier would be found in the tracker before anything is fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerKey {
    Semver { name: String, range: String },
    Tag { name: String, tag: String },
    Git(GitKey),
    Url { url: String },
}

impl TrackerKey {
    pub fn for_spec(spec: &PackageSpec) -> Result<Self, TrackerError> {
        match spec.kind {
            SpecKind::Version | SpecKind::Range | SpecKind::Tag => {
                let name = spec.name.clone().ok_or_else(|| {
                    TrackerError::Type(format!("registry specifier '{}' has no name", spec.raw))
                })?;
                if spec.kind == SpecKind::Tag {
                    Ok(Self::Tag {
                        name,
                        tag: spec.fetch_spec.clone(),
                    })
                } else {
                    Ok(Self::Semver {
                        name,
                        range: spec.fetch_spec.clone(),
                    })
                }
            }
            SpecKind::Git => derive_git_key(spec).map(Self::Git),
            SpecKind::Remote => Ok(Self::Url {
                url: spec.fetch_spec.clone(),
            }),
        }
    }

    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Semver { .. } => RecordType::Semver,
            Self::Tag { .. } => RecordType::Tag,
            Self::Git(_) => RecordType::Git,
            Self::Url { .. } => RecordType::Url,
        }
    }

    /// The `name` argument for tracker lookups: package name, repo, or empty for urls.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Semver { name, .. } | Self::Tag { name, .. } => name,
            Self::Git(key) => &key.repo,
            Self::Url { .. } => "",
        }
    }

    #[must_use]
    pub fn spec(&self) -> &str {
        match self {
            Self::Semver { range, .. } => range,
            Self::Tag { tag, .. } => tag,
            Self::Git(key) => &key.spec,
            Self::Url { url } => url,
        }
    }

    /// Session-scoped key that marks this request as being fetched.
    #[must_use]
    pub fn in_flight_key(&self) -> String {
        match self {
            Self::Semver { name, range } => format!("{name}:{range}"),
            Self::Tag { name, tag } => format!("{name}:{tag}"),
            Self::Git(key) => format!("git:{}#{}", key.repo, key.spec),
            Self::Url { url } => format!("url:{}", strip_protocol(url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_key(raw: &str) -> GitKey {
        let spec = PackageSpec::parse(raw).expect("parse");
        derive_git_key(&spec).expect("git key")
    }

    #[test]
    fn remote_forms_collapse_to_one_repo() {
        let forms = [
            "github:npm/cli#v8.0.0",
            "git+ssh://git@github.com/npm/cli.git#v8.0.0",
            "git+https://github.com/npm/cli.git#v8.0.0",
            "cli@git@github.com:npm/cli.git#v8.0.0",
        ];
        for raw in forms {
            let key = git_key(raw);
            assert_eq!(key.repo, "github.com/npm/cli", "{raw}");
            assert_eq!(key.spec, "v8.0.0", "{raw}");
        }
    }

    #[test]
    fn unhosted_git_urls_use_host_and_path() {
        let key = git_key("git+https://git.example.com:8443/team/tool.git");
        assert_eq!(key.repo, "git.example.com:8443/team/tool");
        assert_eq!(key.domain, "git.example.com:8443");
        assert_eq!(key.path, "team/tool");
        assert!(key.spec.is_empty());
    }

    #[test]
    fn non_git_specs_are_type_errors() {
        let spec = PackageSpec::parse("lodash@^4").expect("parse");
        let err = derive_git_key(&spec).expect_err("not git");
        assert_eq!(err.code(), "ETYPE");
    }

    #[test]
    fn tracker_keys_by_kind() {
        let range = TrackerKey::for_spec(&PackageSpec::parse("a@^1.2.0").expect("range"))
            .expect("key");
        assert_eq!(range.record_type(), RecordType::Semver);
        assert_eq!(range.in_flight_key(), "a:^1.2.0");

        let tag = TrackerKey::for_spec(&PackageSpec::parse("a@next").expect("tag")).expect("key");
        assert_eq!(tag.record_type(), RecordType::Tag);
        assert_eq!((tag.name(), tag.spec()), ("a", "next"));

        let url = TrackerKey::for_spec(
            &PackageSpec::parse("https://example.com/a.tgz").expect("url"),
        )
        .expect("key");
        assert_eq!(url.name(), "");
        assert_eq!(url.in_flight_key(), "url:example.com/a.tgz");
    }
}
