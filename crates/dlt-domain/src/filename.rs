//! Filesystem-safe tarball names that can be decoded back into package identity.
//!
//! Layouts (before the `.tar.gz` extension):
//! - registry: `<name>-<version>`
//! - git: `<domain>%2F<path>#<commit>`
//! - url: `<url>`
//!
//! Every component is percent-escaped, so `/`, `#` and `:` only appear where
//! the layout puts them. Package names also escape `-`, which makes the first
//! bare `-` of a registry name the separator before the version.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::range::parse_version;
use crate::spec::is_valid_package_name;

const UNSAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'@')
    .remove(b'+')
    .remove(b'!');
const NAME_UNSAFE: &AsciiSet = &UNSAFE.add(b'-');

pub const TARBALL_EXTENSIONS: [&str; 2] = [".tar.gz", ".tgz"];
const DEFAULT_EXTENSION: &str = ".tar.gz";

/// Identity encoded into a tarball filename.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactName {
    Semver {
        name: String,
        version: String,
    },
    Git {
        domain: String,
        path: String,
        commit: String,
    },
    Url {
        url: String,
    },
}

impl ArtifactName {
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}{DEFAULT_EXTENSION}", self.stem())
    }

    fn stem(&self) -> String {
        match self {
            Self::Semver { name, version } => format!(
                "{}-{}",
                utf8_percent_encode(name, NAME_UNSAFE),
                escape(version)
            ),
            Self::Git {
                domain,
                path,
                commit,
            } => format!("{}#{}", escape(&format!("{domain}/{path}")), escape(commit)),
            Self::Url { url } => escape(url),
        }
    }

    /// Decode a filename produced by [`ArtifactName::encode`].
    ///
    /// Names without a recognized tarball extension, whose stem does not fit
    /// any layout, or that `encode` would not have produced yield `None`.
    #[must_use]
    pub fn decode(filename: &str) -> Option<Self> {
        let stem = strip_tarball_extension(filename)?;
        Self::decode_stem(stem).filter(|decoded| decoded.stem() == stem)
    }

    fn decode_stem(stem: &str) -> Option<Self> {
        if stem.is_empty() {
            return None;
        }

        if let Some((repo, commit)) = stem.split_once('#') {
            let repo = unescape(repo)?;
            let commit = unescape(commit)?;
            let (domain, path) = repo.split_once('/')?;
            if domain.is_empty() || path.is_empty() || commit.is_empty() {
                return None;
            }
            return Some(Self::Git {
                domain: domain.to_string(),
                path: path.to_string(),
                commit,
            });
        }

        if let Some((name, version)) = stem.split_once('-') {
            if let (Some(name), Some(version)) = (unescape(name), unescape(version)) {
                if is_valid_package_name(&name) && parse_version(&version, false).is_some() {
                    return Some(Self::Semver { name, version });
                }
            }
        }

        let url = unescape(stem)?;
        if url.contains("://") {
            Some(Self::Url { url })
        } else {
            None
        }
    }
}

#[must_use]
pub fn has_tarball_extension(filename: &str) -> bool {
    strip_tarball_extension(filename).is_some()
}

fn strip_tarball_extension(filename: &str) -> Option<&str> {
    TARBALL_EXTENSIONS
        .iter()
        .find_map(|extension| filename.strip_suffix(extension))
}

fn escape(value: &str) -> String {
    utf8_percent_encode(value, UNSAFE).to_string()
}

fn unescape(value: &str) -> Option<String> {
    percent_decode_str(value)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_survive_hyphens_and_scopes() {
        for (name, version) in [
            ("left-pad", "1.3.0"),
            ("@types/node", "20.1.0"),
            ("foo-1", "2.0.0-beta.1"),
        ] {
            let artifact = ArtifactName::Semver {
                name: name.to_string(),
                version: version.to_string(),
            };
            let filename = artifact.encode();
            assert!(!filename.contains('/'), "{filename}");
            assert_eq!(ArtifactName::decode(&filename), Some(artifact));
        }
        assert_eq!(
            ArtifactName::Semver {
                name: "left-pad".into(),
                version: "1.3.0".into(),
            }
            .encode(),
            "left%2Dpad-1.3.0.tar.gz"
        );
    }

    #[test]
    fn versioned_looking_names_stay_distinct() {
        let trailing_version = ArtifactName::Semver {
            name: "a-1.0.0".into(),
            version: "2.0.0".into(),
        };
        let prerelease = ArtifactName::Semver {
            name: "a".into(),
            version: "1.0.0-2.0.0".into(),
        };
        assert_ne!(trailing_version.encode(), prerelease.encode());
        assert_eq!(
            ArtifactName::decode(&trailing_version.encode()),
            Some(trailing_version)
        );
        assert_eq!(ArtifactName::decode(&prerelease.encode()), Some(prerelease));
        assert_eq!(
            ArtifactName::decode("a%2D1.0.0-2.0.0.tgz"),
            Some(ArtifactName::Semver {
                name: "a-1.0.0".into(),
                version: "2.0.0".into(),
            })
        );
        // same identity, but not the spelling encode produces
        assert_eq!(ArtifactName::decode("%61-1.0.0.tar.gz"), None);
    }

    #[test]
    fn git_and_url_layouts_are_distinct() {
        let git = ArtifactName::Git {
            domain: "github.com".into(),
            path: "npm/cli".into(),
            commit: "0123456789abcdef0123456789abcdef01234567".into(),
        };
        let encoded = git.encode();
        assert!(encoded.starts_with("github.com%2Fnpm%2Fcli#0123"));
        assert_eq!(ArtifactName::decode(&encoded), Some(git));

        let url = ArtifactName::Url {
            url: "https://example.com/pkg/-/pkg-1.0.0.tgz".into(),
        };
        assert_eq!(ArtifactName::decode(&url.encode()), Some(url));
    }

    #[test]
    fn rejects_unrecognized_names() {
        assert_eq!(ArtifactName::decode("readme.txt"), None);
        assert_eq!(ArtifactName::decode("dltracker.json"), None);
        assert_eq!(ArtifactName::decode(".tar.gz"), None);
        assert_eq!(ArtifactName::decode("noversion.tgz"), None);
        assert!(has_tarball_extension("a-1.0.0.tgz"));
        assert!(!has_tarball_extension("a-1.0.0.zip"));
    }
}
