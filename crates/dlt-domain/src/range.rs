//! npm-flavoured version ranges evaluated with the `semver` crate.
//!
//! The `semver` crate speaks Cargo's dialect, so ranges are rewritten before
//! parsing: `||` alternatives are evaluated separately, hyphen ranges become
//! a `>=`/`<=` pair, bare partial versions become x-ranges instead of Cargo's
//! implicit caret, and whitespace-separated comparators are comma-joined.

use semver::{Version, VersionReq};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid version range '{range}': {reason}")]
    Invalid { range: String, reason: String },
}

/// A parsed npm range; an empty alternative list never matches.
#[derive(Clone, Debug)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse `raw`. With `loose`, stray `v`/`=` prefixes and padded operators
    /// are tolerated the way hand-written package manifests need.
    pub fn parse(raw: &str, loose: bool) -> Result<Self, RangeError> {
        let alternatives = raw
            .split("||")
            .map(|alternative| translate(alternative, loose))
            .map(|translated| {
                translated.and_then(|req| {
                    VersionReq::parse(&req).map_err(|err| err.to_string())
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| RangeError::Invalid {
                range: raw.to_string(),
                reason,
            })?;
        Ok(Self { alternatives })
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Whether `raw` parses as a range.
#[must_use]
pub fn is_valid_range(raw: &str) -> bool {
    NpmRange::parse(raw, true).is_ok()
}

/// Parse a single version, optionally after cleaning it.
#[must_use]
pub fn parse_version(raw: &str, loose: bool) -> Option<Version> {
    let candidate = if loose {
        clean(raw)?
    } else {
        raw.strip_prefix('v').unwrap_or(raw).to_string()
    };
    Version::parse(&candidate).ok()
}

/// Strip surrounding whitespace and a leading `=`/`v`, returning the
/// canonical version string when what remains is a valid version.
#[must_use]
pub fn clean(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('=').trim_start();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(trimmed).ok().map(|version| version.to_string())
}

/// Pick the highest of `versions` that satisfies `range`.
///
/// Returns the original string so callers can use it as a map key.
pub fn max_satisfying<'a, I>(versions: I, range: &str, loose: bool) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let range = NpmRange::parse(range, loose).ok()?;
    versions
        .into_iter()
        .filter_map(|raw| parse_version(raw, loose).map(|version| (version, raw)))
        .filter(|(version, _)| range.matches(version))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw)
}

fn translate(alternative: &str, loose: bool) -> Result<String, String> {
    let alternative = alternative.trim();
    if alternative.is_empty() {
        return Ok("*".to_string());
    }

    if let Some((low, high)) = alternative.split_once(" - ") {
        let low = comparator(&format!(">={}", low.trim()), loose)?;
        let high = comparator(&format!("<={}", high.trim()), loose)?;
        return Ok(join(low.into_iter().chain(high)));
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in alternative.split_whitespace() {
        if token.chars().all(is_operator_char) {
            pending_op.push_str(token);
            continue;
        }
        tokens.push(format!("{pending_op}{token}"));
        pending_op.clear();
    }
    if !pending_op.is_empty() {
        return Err(format!("dangling operator '{pending_op}'"));
    }

    let mut parts = Vec::new();
    for token in tokens {
        if let Some(part) = comparator(&token, loose)? {
            parts.push(part);
        }
    }
    Ok(join(parts.into_iter()))
}

fn join(parts: impl Iterator<Item = String>) -> String {
    let joined = parts.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "*".to_string()
    } else {
        joined
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^')
}

/// Rewrite one npm comparator; `None` means it matches everything.
fn comparator(token: &str, loose: bool) -> Result<Option<String>, String> {
    let split = token.find(|c: char| !is_operator_char(c)).unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let mut version = version.trim();
    if let Some(stripped) = version.strip_prefix('v') {
        version = stripped;
    } else if loose {
        version = version.trim_start_matches(['V', '=']);
    }

    let op = match op {
        "" | "=" => "=",
        "~>" => "~",
        ">" | ">=" | "<" | "<=" | "~" | "^" => op,
        other => return Err(format!("unknown operator '{other}'")),
    };

    let (core, suffix) = match version.find(['-', '+']) {
        Some(index) => version.split_at(index),
        None => (version, ""),
    };
    let mut components = Vec::new();
    for component in core.split('.') {
        if matches!(component, "x" | "X" | "*" | "") {
            break;
        }
        if !component.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid version component '{component}'"));
        }
        components.push(component);
    }

    if components.is_empty() {
        return Ok(match op {
            "<" => Some("<0.0.0-0".to_string()),
            _ => None,
        });
    }

    let suffix = if components.len() == 3 {
        suffix.split('+').next().unwrap_or_default()
    } else {
        ""
    };
    Ok(Some(format!("{op}{}{suffix}", components.join("."))))
}
