//! URL canonicalization and page classification.
//!
//! A tab is only tracked while its URL is a task listing or a task-detail
//! view. Everything else, including URLs that fail to parse, is `Other`.

use serde::{Deserialize, Serialize};
use url::Url;

/// Which kind of page a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Listing,
    TaskDetail,
    Other,
}

/// Route patterns that qualify a URL for tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Exact normalized pathnames that show a task listing.
    pub listing_paths: Vec<String>,
    /// A detail view is `<prefix>/<id>` with exactly one id segment.
    pub detail_prefixes: Vec<String>,
    /// Restrict tracking to these hosts. Empty means any host.
    pub hosts: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            listing_paths: vec!["/codex".to_owned(), "/plan".to_owned()],
            detail_prefixes: vec!["/codex/tasks".to_owned()],
            hosts: Vec::new(),
        }
    }
}

/// Result of canonicalizing a tab URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// `origin + normalized pathname`; the grouping key for listing tabs.
    pub canonical: String,
    pub normalized_pathname: String,
    pub kind: PageKind,
}

impl Location {
    fn other(raw: &str) -> Self {
        Self {
            canonical: raw.to_owned(),
            normalized_pathname: String::new(),
            kind: PageKind::Other,
        }
    }

    pub fn is_tasks_listing(&self) -> bool {
        self.kind == PageKind::Listing
    }

    pub fn is_task_details(&self) -> bool {
        self.kind == PageKind::TaskDetail
    }

    /// Listing and detail pages are tracked; everything else is evicted.
    pub fn is_trackable(&self) -> bool {
        self.kind != PageKind::Other
    }
}

/// Strip trailing slashes from a pathname, keeping the root `/`.
pub fn normalize_pathname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Stateless classifier built from a [`RouteConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canonicalizer {
    listing_paths: Vec<String>,
    detail_prefixes: Vec<String>,
    hosts: Vec<String>,
}

impl Canonicalizer {
    pub fn new(routes: &RouteConfig) -> Self {
        Self {
            listing_paths: routes
                .listing_paths
                .iter()
                .map(|p| normalize_pathname(p))
                .collect(),
            detail_prefixes: routes
                .detail_prefixes
                .iter()
                .map(|p| normalize_pathname(p))
                .collect(),
            hosts: routes
                .hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Canonicalize and classify an absolute URL.
    pub fn classify(&self, raw: &str) -> Location {
        let Ok(url) = Url::parse(raw) else {
            return Location::other(raw);
        };
        let origin = url.origin();
        if !origin.is_tuple() {
            return Location::other(raw);
        }
        if !self.hosts.is_empty() {
            let host = url.host_str().unwrap_or_default();
            if !self.hosts.iter().any(|h| h == host) {
                return Location::other(raw);
            }
        }

        let normalized_pathname = normalize_pathname(url.path());
        let kind = if self.listing_paths.contains(&normalized_pathname) {
            PageKind::Listing
        } else if self.is_detail_path(&normalized_pathname) {
            PageKind::TaskDetail
        } else {
            PageKind::Other
        };

        Location {
            canonical: format!("{}{}", origin.ascii_serialization(), normalized_pathname),
            normalized_pathname,
            kind,
        }
    }

    fn is_detail_path(&self, path: &str) -> bool {
        self.detail_prefixes.iter().any(|prefix| {
            let base = prefix.trim_end_matches('/');
            path.strip_prefix(base)
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|id| !id.is_empty() && !id.contains('/'))
        })
    }
}
