use anyhow::Result;
use dlt_domain::{ArtifactName, PackageSpec};
use tracing::debug;

use super::{AgentOutcome, FetchResult};
use crate::fetch::{validate_resolved, FetchError};
use crate::session::{Claims, Session};
use crate::speckey::GitKey;
use crate::tracker::{RecordType, TrackerRecord};
use crate::walker::{walk, WalkPolicy};

const SEMVER_PREFIX: &str = "semver:";

/// Git repositories, identified by `domain/path` and the commit a fetch resolves to.
pub(crate) struct GitAgent {
    pub(super) spec: PackageSpec,
    pub(super) key: GitKey,
}

impl GitAgent {
    pub(super) fn new(spec: PackageSpec, key: GitKey) -> Self {
        Self { spec, key }
    }

    pub(super) fn is_tracked(&self, session: &Session) -> bool {
        session.with_tracker(|tracker| tracker.contains(RecordType::Git, &self.key.repo, &self.key.spec))
    }

    pub(super) async fn fetch(
        &self,
        session: &Session,
        claims: &mut Claims<'_>,
        policy: WalkPolicy,
    ) -> Result<AgentOutcome> {
        let manifest = session.source().manifest(&self.spec, session.options()).await?;
        validate_resolved(&self.spec, &manifest)?;
        let commit = manifest
            .sha
            .clone()
            .filter(|sha| !sha.trim().is_empty())
            .ok_or_else(|| FetchError::MissingField {
                spec: self.spec.raw.clone(),
                field: "_sha",
            })?;

        let repo = &self.key.repo;
        let tracked = session.with_tracker(|tracker| {
            tracker
                .get_data(RecordType::Git, repo, &commit)
                .filter(|record| record.commit.as_deref() == Some(commit.as_str()))
                .cloned()
        });
        if let Some(existing) = tracked {
            let refs = self.refs(existing.refs.as_deref(), &commit);
            if refs != existing.refs {
                debug!(%repo, committish = %self.key.spec, "recording new ref for tracked commit");
                let record = TrackerRecord { refs, ..existing };
                session.with_tracker(|tracker| tracker.add(RecordType::Git, record))?;
            }
            return Ok(AgentOutcome::Duplicate);
        }
        if !claims.claim(format!("git:{repo}#{commit}")) {
            return Ok(AgentOutcome::Duplicate);
        }

        let mut results = if policy.shrinkwrap {
            Vec::new()
        } else {
            walk(session, &manifest, policy).await?
        };

        let filename = ArtifactName::Git {
            domain: self.key.domain.clone(),
            path: self.key.path.clone(),
            commit: commit.clone(),
        }
        .encode();
        let dest = session.tarball_path(&filename);
        let info = session
            .source()
            .fetch_tarball(&self.spec, &dest, session.options())
            .await?;

        let record = TrackerRecord {
            filename,
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            spec: Some(self.spec.raw_spec.clone()).filter(|spec| !spec.is_empty()),
            repo: Some(repo.clone()),
            refs: self.refs(manifest.all_refs.as_deref(), &commit),
            commit: Some(commit),
            resolved: manifest.resolved.clone(),
            integrity: info.integrity.or_else(|| manifest.integrity.clone()),
        };
        session.with_tracker(|tracker| tracker.add(RecordType::Git, record))?;
        debug!(%repo, spec = %self.spec, "registered git tarball");

        results.push(FetchResult::fetched(&self.spec, manifest.name.clone()));
        Ok(AgentOutcome::Fetched(results))
    }

    /// Refs that should resolve to `commit`: whatever the fetch reported plus
    /// the committish that was asked for.
    fn refs(&self, reported: Option<&[String]>, commit: &str) -> Option<Vec<String>> {
        let mut refs = reported.map(<[String]>::to_vec).unwrap_or_default();
        let requested = &self.key.spec;
        if !requested.is_empty()
            && requested != commit
            && !requested.starts_with(SEMVER_PREFIX)
            && !refs.contains(requested)
        {
            refs.push(requested.clone());
        }
        refs.retain(|reference| reference != commit && !reference.trim().is_empty());
        (!refs.is_empty()).then_some(refs)
    }
}
