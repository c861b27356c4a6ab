use anyhow::Result;
use dlt_domain::{ArtifactName, PackageSpec};
use tracing::debug;

use super::{AgentOutcome, FetchResult};
use crate::fetch::validate_resolved;
use crate::session::{Claims, Session};
use crate::tracker::{RecordType, TrackerRecord};
use crate::walker::{walk, WalkPolicy};

/// Remote tarball URLs; the URL itself is the identity.
pub(crate) struct UrlAgent {
    pub(super) spec: PackageSpec,
    pub(super) url: String,
}

impl UrlAgent {
    pub(super) fn new(spec: PackageSpec, url: String) -> Self {
        Self { spec, url }
    }

    pub(super) fn is_tracked(&self, session: &Session) -> bool {
        session.with_tracker(|tracker| tracker.contains(RecordType::Url, "", &self.url))
    }

    pub(super) async fn fetch(
        &self,
        session: &Session,
        _claims: &mut Claims<'_>,
        policy: WalkPolicy,
    ) -> Result<AgentOutcome> {
        let manifest = session.source().manifest(&self.spec, session.options()).await?;
        validate_resolved(&self.spec, &manifest)?;

        let mut results = if policy.shrinkwrap {
            Vec::new()
        } else {
            walk(session, &manifest, policy).await?
        };

        let filename = ArtifactName::Url {
            url: self.url.clone(),
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
            spec: Some(self.url.clone()),
            resolved: manifest.resolved.clone(),
            integrity: info.integrity.or_else(|| manifest.integrity.clone()),
            ..TrackerRecord::default()
        };
        session.with_tracker(|tracker| tracker.add(RecordType::Url, record))?;
        debug!(url = %self.url, "registered url tarball");

        results.push(FetchResult::fetched(&self.spec, manifest.name.clone()));
        Ok(AgentOutcome::Fetched(results))
    }
}
