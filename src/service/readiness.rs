// src/service/readiness.rs

//! Table-driven readiness detection.
//!
//! A [`ReadinessMatcher`] holds the compiled patterns of one service in
//! declaration order. Each output line is tested against every pattern that
//! has not matched yet; a pattern that matches is retired and its endpoints
//! are resolved from the captured values.

use regex::Regex;

use crate::errors::{ProctorError, Result};
use crate::task::{EndpointSpec, ReadinessPattern};

/// One pattern matching for the first (and only) time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMatch {
    pub pattern: String,
    /// Position of the pattern in declaration order.
    pub index: usize,
    /// Capture groups, `captures[0]` being the whole match.
    pub captures: Vec<Option<String>>,
    /// `(endpoint name, resolved URL)` for every endpoint of the pattern.
    pub endpoints: Vec<(String, String)>,
}

#[derive(Debug)]
struct CompiledPattern {
    name: String,
    regex: Regex,
    endpoints: Vec<EndpointSpec>,
    matched: bool,
}

#[derive(Debug)]
pub struct ReadinessMatcher {
    patterns: Vec<CompiledPattern>,
}

impl ReadinessMatcher {
    /// Compile `patterns`. Invalid regexes and capture indexes beyond the
    /// pattern's groups are rejected.
    pub fn new(patterns: &[ReadinessPattern]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let regex = Regex::new(&pattern.regex).map_err(|e| {
                ProctorError::ValidationError(format!(
                    "readiness pattern '{}' has an invalid regex: {e}",
                    pattern.name
                ))
            })?;

            let groups = regex.captures_len();
            for endpoint in &pattern.endpoints {
                if endpoint.capture_group >= groups {
                    return Err(ProctorError::ValidationError(format!(
                        "endpoint '{}' uses capture group {} but pattern '{}' only has {} group(s)",
                        endpoint.endpoint_name,
                        endpoint.capture_group,
                        pattern.name,
                        groups - 1
                    )));
                }
            }

            compiled.push(CompiledPattern {
                name: pattern.name.clone(),
                regex,
                endpoints: pattern.endpoints.clone(),
                matched: false,
            });
        }

        Ok(Self { patterns: compiled })
    }

    /// Test `line` against every pattern still waiting, in declaration order.
    pub fn feed(&mut self, line: &str) -> Vec<ReadinessMatch> {
        let mut matches = Vec::new();

        for (index, pattern) in self.patterns.iter_mut().enumerate() {
            if pattern.matched {
                continue;
            }
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };
            pattern.matched = true;

            let captures: Vec<Option<String>> = caps
                .iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect();

            let endpoints = pattern
                .endpoints
                .iter()
                .map(|ep| {
                    let captured = captures.get(ep.capture_group).and_then(|c| c.as_deref());
                    (
                        ep.endpoint_name.clone(),
                        synthesize_url(&ep.default_host_url, captured),
                    )
                })
                .collect();

            matches.push(ReadinessMatch {
                pattern: pattern.name.clone(),
                index,
                captures,
                endpoints,
            });
        }

        matches
    }

    /// True once every pattern matched. A matcher without patterns is
    /// complete from the start.
    pub fn is_complete(&self) -> bool {
        self.patterns.iter().all(|p| p.matched)
    }

    /// Names of the patterns still waiting, in declaration order.
    pub fn unmatched(&self) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|p| !p.matched)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Build an endpoint URL from its base and the captured value.
///
/// - nothing captured: the base as is
/// - a full URL (contains `://`): the capture as is
/// - a port number: the base with its port set to the capture
/// - anything else: appended to the base
pub fn synthesize_url(base: &str, captured: Option<&str>) -> String {
    let Some(value) = captured.map(str::trim).filter(|v| !v.is_empty()) else {
        return base.to_string();
    };

    if value.contains("://") {
        return value.to_string();
    }

    if value.parse::<u16>().is_ok() {
        let (prefix, authority, rest) = split_authority(base);
        let host = strip_port(authority);
        return format!("{prefix}{host}:{value}{rest}");
    }

    match (base.ends_with('/'), value.starts_with('/')) {
        (true, true) => format!("{}{}", base, &value[1..]),
        _ => format!("{base}{value}"),
    }
}

/// Explicit port of `url`, if any.
pub fn port_of(url: &str) -> Option<u16> {
    let (_, authority, _) = split_authority(url);
    let host = strip_port(authority);
    authority
        .get(host.len()..)
        .and_then(|p| p.strip_prefix(':'))
        .and_then(|p| p.parse().ok())
}

/// Split into `(scheme://, authority, path-and-rest)`.
fn split_authority(url: &str) -> (&str, &str, &str) {
    let start = url.find("://").map(|i| i + 3).unwrap_or(0);
    let after = &url[start..];
    let end = after.find(['/', '?', '#']).unwrap_or(after.len());
    (&url[..start], &after[..end], &after[end..])
}

/// Authority without a trailing `:port`. Bracketed IPv6 hosts keep their
/// inner colons.
fn strip_port(authority: &str) -> &str {
    let search_from = authority.rfind(']').unwrap_or(0);
    match authority[search_from..].rfind(':') {
        Some(i) => &authority[..search_from + i],
        None => authority,
    }
}
