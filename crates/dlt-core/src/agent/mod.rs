//! Item agents: fetch one specifier, its dependencies, and register the tarball.
//!
//! The variant is picked from the specifier kind. Every variant goes through
//! the same dispatcher, which owns both duplicate checks and the in-flight
//! bookkeeping; the variants only know how to identify and fetch.

mod git;
mod registry;
mod url;

use anyhow::{Context, Result};
use dlt_domain::PackageSpec;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::debug;

use crate::session::{Claims, Session};
use crate::speckey::TrackerKey;
use crate::tracker::TrackerError;
use crate::walker::WalkPolicy;

pub(crate) use self::git::GitAgent;
pub(crate) use self::registry::RegistryAgent;
pub(crate) use self::url::UrlAgent;

/// Outcome for one specifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub spec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed_optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    pub(crate) fn fetched(spec: &PackageSpec, name: Option<String>) -> Self {
        Self {
            spec: spec.raw.clone(),
            name,
            ..Self::default()
        }
    }

    pub(crate) fn duplicate(spec: &PackageSpec) -> Self {
        Self {
            spec: spec.raw.clone(),
            duplicate: true,
            ..Self::default()
        }
    }

    pub(crate) fn failed_optional(spec: String, error: &anyhow::Error) -> Self {
        Self {
            spec,
            failed_optional: true,
            error: Some(format!("{error:#}")),
            ..Self::default()
        }
    }
}

/// What a variant's fetch produced once it knew the package's real identity.
pub(crate) enum AgentOutcome {
    Fetched(Vec<FetchResult>),
    /// The resolved identity was already tracked or being fetched by another agent.
    Duplicate,
}

pub(crate) enum ItemAgent {
    Registry(RegistryAgent),
    Git(GitAgent),
    Url(UrlAgent),
}

impl ItemAgent {
    pub(crate) fn for_spec(spec: PackageSpec) -> Result<Self, TrackerError> {
        Ok(match TrackerKey::for_spec(&spec)? {
            key @ (TrackerKey::Semver { .. } | TrackerKey::Tag { .. }) => {
                Self::Registry(RegistryAgent::new(spec, key))
            }
            TrackerKey::Git(key) => Self::Git(GitAgent::new(spec, key)),
            TrackerKey::Url { url } => Self::Url(UrlAgent::new(spec, url)),
        })
    }

    fn spec(&self) -> &PackageSpec {
        match self {
            Self::Registry(agent) => &agent.spec,
            Self::Git(agent) => &agent.spec,
            Self::Url(agent) => &agent.spec,
        }
    }

    fn in_flight_key(&self) -> String {
        match self {
            Self::Registry(agent) => agent.key.in_flight_key(),
            Self::Git(agent) => format!("git:{}#{}", agent.key.repo, agent.key.spec),
            Self::Url(agent) => TrackerKey::Url {
                url: agent.url.clone(),
            }
            .in_flight_key(),
        }
    }

    fn is_tracked(&self, session: &Session) -> bool {
        match self {
            Self::Registry(agent) => agent.is_tracked(session),
            Self::Git(agent) => agent.is_tracked(session),
            Self::Url(agent) => agent.is_tracked(session),
        }
    }

    /// Fetch this specifier and, unless `policy.shrinkwrap` is set, its dependencies.
    ///
    /// Boxed because walking a manifest runs more agents.
    pub(crate) fn run(self, session: &Session, policy: WalkPolicy) -> BoxFuture<'_, Result<Vec<FetchResult>>> {
        async move {
            let spec = self.spec().clone();
            if self.is_tracked(session) {
                debug!(spec = %spec, "already tracked");
                return Ok(vec![FetchResult::duplicate(&spec)]);
            }
            let mut claims = Claims::new(session);
            if !claims.claim(self.in_flight_key()) {
                debug!(spec = %spec, "already being fetched");
                return Ok(vec![FetchResult::duplicate(&spec)]);
            }

            let outcome = match &self {
                Self::Registry(agent) => agent.fetch(session, &mut claims, policy).await,
                Self::Git(agent) => agent.fetch(session, &mut claims, policy).await,
                Self::Url(agent) => agent.fetch(session, &mut claims, policy).await,
            }
            .with_context(|| format!("failed to download {spec}"))?;

            match outcome {
                AgentOutcome::Fetched(results) => Ok(results),
                AgentOutcome::Duplicate => {
                    debug!(spec = %spec, "resolved to a package that is already handled");
                    Ok(vec![FetchResult::duplicate(&spec)])
                }
            }
        }
        .boxed()
    }
}
