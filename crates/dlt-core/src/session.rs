//! State shared by every item agent within one download session.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use crate::fetch::{FetchOptions, FetchSource};
use crate::tracker::DownloadTracker;
use crate::walker::WalkPolicy;

/// One invocation from root specifiers to the final index write.
///
/// The in-flight set and the `latest` map live here rather than in globals,
/// so two sessions in one process never see each other's state. Locks are
/// only taken for single-step updates and never held across an `.await`.
pub struct Session {
    tracker: Mutex<DownloadTracker>,
    source: Arc<dyn FetchSource>,
    options: FetchOptions,
    policy: WalkPolicy,
    in_flight: Mutex<HashSet<String>>,
    latest: Mutex<HashMap<String, String>>,
}

impl Session {
    pub fn new(
        tracker: DownloadTracker,
        source: Arc<dyn FetchSource>,
        options: FetchOptions,
        policy: WalkPolicy,
    ) -> Self {
        Self {
            tracker: Mutex::new(tracker),
            source,
            options,
            policy,
            in_flight: Mutex::new(HashSet::new()),
            latest: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn source(&self) -> &dyn FetchSource {
        self.source.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Policy for the root manifest or root specifiers of this session.
    #[must_use]
    pub fn policy(&self) -> WalkPolicy {
        self.policy
    }

    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut DownloadTracker) -> R) -> R {
        f(&mut *lock(&self.tracker))
    }

    pub(crate) fn tarball_path(&self, filename: &str) -> PathBuf {
        lock(&self.tracker).root().join(filename)
    }

    /// Mark `key` as being fetched. Returns `false` if it already was.
    pub(crate) fn claim(&self, key: &str) -> bool {
        lock(&self.in_flight).insert(key.to_string())
    }

    pub(crate) fn release(&self, key: &str) {
        lock(&self.in_flight).remove(key);
    }

    pub(crate) fn latest_version(&self, name: &str) -> Option<String> {
        lock(&self.latest).get(name).cloned()
    }

    pub(crate) fn record_latest(&self, name: &str, version: &str) {
        lock(&self.latest).insert(name.to_string(), version.to_string());
    }

    /// Write the tracker index if this session changed it.
    pub fn serialize(&self) -> Result<bool> {
        lock(&self.tracker).serialize()
    }

    pub fn into_tracker(self) -> DownloadTracker {
        self.tracker
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-flight keys held by one agent; they are released when the guard drops,
/// whether the agent finished, failed or turned out to be a duplicate.
pub(crate) struct Claims<'a> {
    session: &'a Session,
    keys: Vec<String>,
}

impl<'a> Claims<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        Self {
            session,
            keys: Vec::new(),
        }
    }

    /// Claim `key` for this agent. A key this agent already holds counts as claimed.
    pub(crate) fn claim(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return true;
        }
        if self.session.claim(&key) {
            self.keys.push(key);
            true
        } else {
            false
        }
    }
}

impl Drop for Claims<'_> {
    fn drop(&mut self) {
        for key in &self.keys {
            self.session.release(key);
        }
    }
}
