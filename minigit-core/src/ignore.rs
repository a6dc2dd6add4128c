//! Paths the change detector never tracks.
//!
//! Patterns without wildcards name a file or directory anywhere in the tree.
//! Patterns containing `*` or `?` are matched against the final path
//! component only. The repository's own directory is always excluded.

use crate::repo::{REMOTE_DIR, REPO_DIR};

#[derive(Debug, Clone)]
pub struct IgnoreRules {
    names: Vec<String>,
    globs: Vec<String>,
}

impl IgnoreRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut names = vec![REPO_DIR.to_string(), REMOTE_DIR.to_string()];
        let mut globs = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim().trim_end_matches('/');
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            if pattern.contains(['*', '?']) {
                globs.push(pattern.to_string());
            } else {
                names.push(pattern.to_string());
            }
        }

        Self { names, globs }
    }

    /// Whether a single path component (file or directory name) is excluded.
    pub fn is_ignored_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name) || self.globs.iter().any(|g| wildcard_match(g, name))
    }

    /// Whether a `/`-separated relative path is excluded.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        rel_path
            .split('/')
            .any(|component| self.names.iter().any(|n| n == component))
            || rel_path
                .rsplit('/')
                .next()
                .is_some_and(|file| self.globs.iter().any(|g| wildcard_match(g, file)))
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new::<&str>(&[])
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            (Some(b'?'), Some(_)) => go(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => go(&p[1..], &t[1..]),
            _ => false,
        }
    }
    go(pattern.as_bytes(), text.as_bytes())
}
