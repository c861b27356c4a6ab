use anyhow::Result;
use dlt_domain::{ArtifactName, PackageSpec, SpecKind};
use tracing::debug;

use super::{AgentOutcome, FetchResult};
use crate::fetch::{validate_resolved, FetchError};
use crate::session::{Claims, Session};
use crate::speckey::TrackerKey;
use crate::tracker::{RecordType, TrackerRecord};
use crate::walker::{walk, WalkPolicy};

const LATEST_TAG: &str = "latest";

/// Versions, ranges and dist-tags from the registry.
pub(crate) struct RegistryAgent {
    pub(super) spec: PackageSpec,
    pub(super) key: TrackerKey,
}

impl RegistryAgent {
    pub(super) fn new(spec: PackageSpec, key: TrackerKey) -> Self {
        Self { spec, key }
    }

    /// A dist-tag other than `latest`; those are recorded in the tag table.
    fn tag(&self) -> Option<&str> {
        (self.spec.kind == SpecKind::Tag && self.spec.fetch_spec != LATEST_TAG)
            .then_some(self.spec.fetch_spec.as_str())
    }

    /// Requests for "any version" are answered by whatever this session already
    /// resolved for the name, never by older tracked versions.
    pub(super) fn is_tracked(&self, session: &Session) -> bool {
        if self.spec.is_implicit_latest() {
            return session.latest_version(self.key.name()).is_some();
        }
        session.with_tracker(|tracker| {
            tracker.contains(self.key.record_type(), self.key.name(), self.key.spec())
        })
    }

    pub(super) async fn fetch(
        &self,
        session: &Session,
        claims: &mut Claims<'_>,
        policy: WalkPolicy,
    ) -> Result<AgentOutcome> {
        let manifest = session.source().manifest(&self.spec, session.options()).await?;
        validate_resolved(&self.spec, &manifest)?;
        let name = manifest
            .name
            .clone()
            .unwrap_or_else(|| self.key.name().to_string());
        let version = manifest.version.clone().ok_or_else(|| FetchError::MissingField {
            spec: self.spec.raw.clone(),
            field: "version",
        })?;
        if self.spec.is_implicit_latest() {
            session.record_latest(&name, &version);
        }

        let tracked = session.with_tracker(|tracker| {
            tracker
                .get_data(RecordType::Semver, &name, &version)
                .filter(|record| record.version.as_deref() == Some(version.as_str()))
                .cloned()
        });
        if let Some(existing) = tracked {
            if let Some(tag) = self.tag() {
                let alias = TrackerRecord {
                    spec: Some(tag.to_string()),
                    ..existing
                };
                session.with_tracker(|tracker| tracker.add(RecordType::Tag, alias))?;
            }
            return Ok(AgentOutcome::Duplicate);
        }
        if !claims.claim(format!("{name}:{version}")) {
            return Ok(AgentOutcome::Duplicate);
        }

        let mut results = if policy.shrinkwrap {
            Vec::new()
        } else {
            walk(session, &manifest, policy).await?
        };

        let filename = ArtifactName::Semver {
            name: name.clone(),
            version: version.clone(),
        }
        .encode();
        let dest = session.tarball_path(&filename);
        let info = session
            .source()
            .fetch_tarball(&self.spec, &dest, session.options())
            .await?;

        let kind = if self.tag().is_some() {
            RecordType::Tag
        } else {
            RecordType::Semver
        };
        let record = TrackerRecord {
            filename,
            name: Some(name.clone()),
            version: Some(version),
            spec: self.tag().map(ToOwned::to_owned),
            resolved: manifest.resolved.clone(),
            integrity: info.integrity.or_else(|| manifest.integrity.clone()),
            ..TrackerRecord::default()
        };
        session.with_tracker(|tracker| tracker.add(kind, record))?;
        debug!(%name, spec = %self.spec, "registered registry tarball");

        results.push(FetchResult::fetched(&self.spec, Some(name)));
        Ok(AgentOutcome::Fetched(results))
    }
}
