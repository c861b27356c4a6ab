use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dirs_next::home_dir;

use crate::fetch::{FetchOptions, DEFAULT_REGISTRY};
use crate::walker::WalkPolicy;

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Where the tracker lives and which setting chose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tracker: TrackerLocation,
    pub policy: WalkPolicy,
    pub fetch: FetchOptions,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if no tracker path is configured and the home directory is unknown.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let tracker = match snapshot.var("DLT_TRACKER_PATH") {
            Some(path) => TrackerLocation {
                path: PathBuf::from(path),
                source: "DLT_TRACKER_PATH",
            },
            None => TrackerLocation {
                path: home_dir()
                    .context("unable to determine the home directory for the tracker root")?
                    .join(".dlt")
                    .join("tarballs"),
                source: "default",
            },
        };
        Ok(Self {
            tracker,
            policy: WalkPolicy {
                include_dev: snapshot.flag_is_enabled("DLT_INCLUDE_DEV"),
                no_peer: snapshot.flag_is_enabled("DLT_NO_PEER"),
                no_optional: snapshot.flag_is_enabled("DLT_NO_OPTIONAL"),
                ..WalkPolicy::default()
            },
            fetch: FetchOptions {
                registry: snapshot
                    .var("DLT_REGISTRY")
                    .unwrap_or(DEFAULT_REGISTRY)
                    .to_string(),
                ..FetchOptions::default()
            },
        })
    }

    /// Use `root` as the tracker root regardless of the environment.
    #[must_use]
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.tracker = TrackerLocation {
            path: root,
            source: "--root",
        };
        self
    }
}
