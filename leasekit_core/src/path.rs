//! Logical path handling for workspace-addressed storage.
//!
//! Logical paths always use forward slashes, start with exactly one `/`
//! and never end with one (except the root itself). The first component
//! of a logical path is the candidate workspace name.

/// Pure helpers for normalizing and splitting logical paths.
///
/// # Examples
///
/// ```
/// use leasekit_core::path::PathResolver;
///
/// assert_eq!(PathResolver::normalize("Federal Workspace\\NMNM1/"), "/Federal Workspace/NMNM1");
/// assert_eq!(PathResolver::first_segment("/Federal Workspace/NMNM1"), "Federal Workspace");
/// assert_eq!(PathResolver::workspace_relative("/Federal Workspace/NMNM1"), "/NMNM1");
/// ```
pub struct PathResolver;

impl PathResolver {
    /// Root path.
    pub const ROOT: &'static str = "/";

    /// Normalizes a logical path.
    ///
    /// Backslashes become forward slashes, repeated separators collapse,
    /// a single leading slash is ensured and a trailing slash is removed.
    /// Never fails; an empty input yields the root.
    pub fn normalize(path: &str) -> String {
        let unified = path.replace('\\', "/");
        let segments: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Self::ROOT.to_string();
        }
        format!("/{}", segments.join("/"))
    }

    /// Returns the normalized parent directory. The root is its own parent.
    pub fn parent_of(path: &str) -> String {
        let normalized = Self::normalize(path);
        match normalized.rfind('/') {
            Some(0) | None => Self::ROOT.to_string(),
            Some(idx) => normalized[..idx].to_string(),
        }
    }

    /// Returns the first path component, or an empty string for the root.
    pub fn first_segment(path: &str) -> String {
        Self::normalize(path)
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Returns the final path component, or an empty string for the root.
    pub fn file_name(path: &str) -> String {
        let normalized = Self::normalize(path);
        normalized
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Strips the first component, yielding the path relative to its workspace.
    ///
    /// `"/Workspace/a/b"` becomes `"/a/b"`; `"/Workspace"` becomes `"/"`.
    pub fn workspace_relative(path: &str) -> String {
        let normalized = Self::normalize(path);
        let without_leading = normalized.trim_start_matches('/');
        match without_leading.find('/') {
            Some(idx) => without_leading[idx..].to_string(),
            None => Self::ROOT.to_string(),
        }
    }

    /// Joins a child component onto a base path and normalizes the result.
    pub fn join(base: &str, child: &str) -> String {
        Self::normalize(&format!("{}/{}", base, child))
    }

    /// Whether the path is the root.
    pub fn is_root(path: &str) -> bool {
        Self::normalize(path) == Self::ROOT
    }
}
