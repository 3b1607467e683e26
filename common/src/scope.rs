use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// System paths that are always in scope's blocklist, regardless of
/// configuration (`spec.md` §4.8).
const ALWAYS_BLOCKED: &[&str] = &[
    "/etc/shadow",
    "/etc/gshadow",
    "/etc/passwd",
    "/etc/sudoers",
    "/root/.ssh/**",
    "/proc/**",
    "/sys/**",
    "**/System32/**",
    "**/System32",
];

/// `spec.md` §4.8: the set of rules that determine whether a filesystem
/// path may be analyzed.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    pub allowed_roots: Vec<PathBuf>,
    pub blocked_globs: Vec<String>,
    pub max_file_bytes: u64,
    pub follow_symlinks: bool,
    blocked_set: GlobSet,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self::new(vec![], vec![], 64 * 1024 * 1024, false)
    }
}

impl ScopePolicy {
    pub fn new(
        allowed_roots: Vec<PathBuf>,
        blocked_globs: Vec<String>,
        max_file_bytes: u64,
        follow_symlinks: bool,
    ) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in ALWAYS_BLOCKED.iter().chain(blocked_globs.iter().map(String::as_str)) {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        let blocked_set = builder.build().unwrap_or_else(|_| GlobSet::empty());
        Self {
            allowed_roots,
            blocked_globs,
            max_file_bytes,
            follow_symlinks,
            blocked_set,
        }
    }

    /// `true` iff `path` canonicalizes under some `allowed_roots` entry
    /// and is not matched by any `blocked_globs` (or the always-blocked
    /// system path set).
    ///
    /// Canonicalization is what catches `../` traversal and symlink
    /// escapes: a path is only in scope once its *resolved* form is a
    /// descendant of a resolved root.
    pub fn is_in_scope(&self, path: &Path) -> bool {
        if self.blocked_set.is_match(path) {
            return false;
        }

        if self.allowed_roots.is_empty() {
            // No roots configured means nothing is in scope: an empty
            // allowlist must never be read as "allow everything".
            return false;
        }

        let Ok(canonical) = path.canonicalize() else {
            return false;
        };

        self.allowed_roots.iter().any(|root| {
            root.canonicalize()
                .map(|root| canonical.starts_with(&root))
                .unwrap_or(false)
        })
    }
}
