//! Path normalization and route matching.
//!
//! # Responsibilities
//! - Normalize connection targets (leading `/`, no trailing `/`, prefix
//!   stripped)
//! - Match whole path segments against route patterns
//! - Capture `:name` parameter segments
//!
//! # Design Decisions
//! - Segment counts must match exactly; no wildcards, no regex
//! - Literal segments compare byte-equal, case-sensitive
//! - First fully-matching route in registration order wins

use std::collections::HashMap;

use crate::routing::route::Route;

/// Parameters captured from a matched route pattern.
pub type Params = HashMap<String, String>;

/// Normalize a path: ensure a leading `/`, strip a single trailing `/`.
/// The root path normalizes to the empty string.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    };
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }
    if normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Resolve a connection target into the instance identity key:
/// normalize, then strip the configured prefix.
pub fn resolve(path: &str, prefix: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.strip_prefix(prefix) {
        // Only strip at a segment boundary; "/wsx" is not under "/ws".
        Some(stripped) if stripped.is_empty() || stripped.starts_with('/') => {
            stripped.to_string()
        }
        _ => normalized,
    }
}

/// Split a path into its non-empty segments.
fn segments(path: &str) -> Vec<&str> {
    path.trim()
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Find the first route matching `resolved`, capturing its parameters.
pub fn match_route<'r>(routes: &'r [Route], resolved: &str) -> Option<(&'r Route, Params)> {
    let path_segments = segments(resolved);

    for route in routes {
        let pattern_segments = segments(&route.path);
        if pattern_segments.len() != path_segments.len() {
            continue;
        }

        let mut params = Params::new();
        let mut matched = true;

        for (pattern, concrete) in pattern_segments.iter().zip(&path_segments) {
            if let Some(name) = pattern.strip_prefix(':') {
                params.insert(name.to_string(), (*concrete).to_string());
            } else if pattern != concrete {
                matched = false;
                break;
            }
        }

        if matched {
            return Some((route, params));
        }
    }

    None
}
