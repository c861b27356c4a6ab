//! Recognition of git repositories on well-known hosts.
//!
//! Shortcuts (`user/project`, `github:user/project#ref`), scp-style remotes
//! (`git@github.com:user/project.git`) and URLs in any of the usual schemes
//! collapse to the same [`HostedGit`] so callers can compare them.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitHost {
    Github,
    Gitlab,
    Bitbucket,
}

impl GitHost {
    #[must_use]
    pub fn domain(self) -> &'static str {
        match self {
            Self::Github => "github.com",
            Self::Gitlab => "gitlab.com",
            Self::Bitbucket => "bitbucket.org",
        }
    }

    #[must_use]
    pub fn shortcut(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
        }
    }

    fn from_shortcut(value: &str) -> Option<Self> {
        match value {
            "github" => Some(Self::Github),
            "gitlab" => Some(Self::Gitlab),
            "bitbucket" => Some(Self::Bitbucket),
            _ => None,
        }
    }

    fn from_domain(value: &str) -> Option<Self> {
        let value = value.strip_prefix("www.").unwrap_or(value);
        [Self::Github, Self::Gitlab, Self::Bitbucket]
            .into_iter()
            .find(|host| host.domain().eq_ignore_ascii_case(value))
    }
}

/// A git repository on a known host plus the optional committish that was requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedGit {
    pub host: GitHost,
    pub user: String,
    pub project: String,
    pub committish: Option<String>,
}

impl HostedGit {
    /// Recognize `raw` as a hosted repository, returning `None` for anything else.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (body, committish) = split_fragment(raw);

        if let Some((prefix, rest)) = body.split_once(':') {
            if let Some(host) = GitHost::from_shortcut(prefix) {
                let (user, project) = split_user_project(rest)?;
                return Some(Self::new(host, user, project, committish));
            }
        }

        if is_bare_shortcut(body) {
            let (user, project) = split_user_project(body)?;
            return Some(Self::new(GitHost::Github, user, project, committish));
        }

        let url = parse_git_url(body)?;
        let host = GitHost::from_domain(url.host_str()?)?;
        let mut segments = url.path_segments()?.filter(|segment| !segment.is_empty());
        let user = segments.next()?;
        let project = segments.next()?;
        if segments.next().is_some() {
            return None;
        }
        Some(Self::new(host, user, project, committish))
    }

    fn new(host: GitHost, user: &str, project: &str, committish: Option<&str>) -> Self {
        Self {
            host,
            user: user.to_string(),
            project: project.strip_suffix(".git").unwrap_or(project).to_string(),
            committish: committish
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        }
    }

    #[must_use]
    pub fn domain(&self) -> &'static str {
        self.host.domain()
    }

    /// `user/project`, without any `.git` suffix.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.user, self.project)
    }

    /// Clone URL for the repository over https.
    #[must_use]
    pub fn https_url(&self) -> String {
        format!("git+https://{}/{}.git", self.domain(), self.path())
    }
}

impl fmt::Display for HostedGit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.shortcut(), self.path())?;
        if let Some(committish) = &self.committish {
            write!(f, "#{committish}")?;
        }
        Ok(())
    }
}

fn split_fragment(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('#') {
        Some((body, fragment)) => (body, Some(fragment)),
        None => (raw, None),
    }
}

fn split_user_project(value: &str) -> Option<(&str, &str)> {
    let (user, project) = value.split_once('/')?;
    if is_segment(user) && is_segment(project.strip_suffix(".git").unwrap_or(project)) {
        Some((user, project))
    } else {
        None
    }
}

fn is_segment(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_bare_shortcut(value: &str) -> bool {
    !value.starts_with('@')
        && !value.contains(':')
        && value.matches('/').count() == 1
        && split_user_project(value).is_some()
}

/// Parse a git remote into a URL, accepting `git+` prefixes and scp-style remotes.
pub fn parse_git_url(raw: &str) -> Option<Url> {
    let raw = raw.strip_prefix("git+").unwrap_or(raw);
    if let Ok(url) = Url::parse(raw) {
        if url.host_str().is_some() {
            return Some(url);
        }
    }
    scp_to_ssh(raw).and_then(|converted| Url::parse(&converted).ok())
}

/// `git@host:user/project.git` becomes `ssh://git@host/user/project.git`.
pub(crate) fn scp_to_ssh(raw: &str) -> Option<String> {
    if raw.contains("://") {
        return None;
    }
    let (authority, path) = raw.split_once(':')?;
    if authority.is_empty() || path.starts_with("//") {
        return None;
    }
    let path = path.trim_start_matches('/');
    Some(format!("ssh://{authority}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_equivalent_github_forms() {
        let forms = [
            "github:npm/cli#v8.0.0",
            "npm/cli#v8.0.0",
            "git+ssh://git@github.com/npm/cli.git#v8.0.0",
            "git+https://github.com/npm/cli.git#v8.0.0",
            "git@github.com:npm/cli.git#v8.0.0",
            "git://github.com/npm/cli#v8.0.0",
        ];
        for form in forms {
            let hosted = HostedGit::parse(form).unwrap_or_else(|| panic!("{form} not hosted"));
            assert_eq!(hosted.host, GitHost::Github, "{form}");
            assert_eq!(hosted.domain(), "github.com");
            assert_eq!(hosted.path(), "npm/cli", "{form}");
            assert_eq!(hosted.committish.as_deref(), Some("v8.0.0"), "{form}");
        }
    }

    #[test]
    fn ignores_unknown_hosts_and_paths() {
        assert!(HostedGit::parse("git+https://example.com/a/b.git").is_none());
        assert!(HostedGit::parse("./local/dir").is_none());
        assert!(HostedGit::parse("@scope/pkg").is_none());
        assert!(HostedGit::parse("lodash").is_none());
    }

    #[test]
    fn empty_fragment_means_no_committish() {
        let hosted = HostedGit::parse("gitlab:group/proj#").expect("hosted");
        assert_eq!(hosted.domain(), "gitlab.com");
        assert_eq!(hosted.committish, None);
        assert_eq!(hosted.to_string(), "gitlab:group/proj");
    }
}
