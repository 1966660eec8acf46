//! Route-level limit metadata.

use crate::policy::Policy;

/// Policies attached to one route pattern.
#[derive(Debug, Clone)]
pub struct RouteLimits {
    /// Route path pattern, e.g. `/api/users/{id}`. Segments wrapped in
    /// braces match any single non-empty segment.
    pub pattern: String,
    pub policies: Vec<Policy>,
}

/// The table of route-attached policies, consulted once per request after
/// the global default policy runs.
#[derive(Debug, Clone, Default)]
pub struct RouteLimitTable {
    routes: Vec<RouteLimits>,
}

impl RouteLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a single policy to a route pattern.
    pub fn limit(self, pattern: impl Into<String>, policy: Policy) -> Self {
        self.limit_all(pattern, vec![policy])
    }

    /// Attach several policies to a route pattern. Repeated calls for the
    /// same pattern append to its policy list.
    pub fn limit_all(mut self, pattern: impl Into<String>, policies: Vec<Policy>) -> Self {
        let pattern = pattern.into();
        if let Some(existing) = self.routes.iter_mut().find(|r| r.pattern == pattern) {
            existing.policies.extend(policies);
        } else {
            self.routes.push(RouteLimits { pattern, policies });
        }
        self
    }

    /// The first route whose pattern matches the request path.
    pub fn matched(&self, request_path: &str) -> Option<&RouteLimits> {
        self.routes
            .iter()
            .find(|route| pattern_matches(&route.pattern, request_path))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Segment-wise match: `{name}` segments match any non-empty segment,
/// everything else must compare equal.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    if pattern_segments.len() != path_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(pat, seg)| {
            if pat.starts_with('{') && pat.ends_with('}') {
                !seg.is_empty()
            } else {
                pat == seg
            }
        })
}
