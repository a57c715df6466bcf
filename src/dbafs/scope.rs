//! Sync scopes
//!
//! Grammar, relative to the mount root:
//!
//! - `""`, `"**"` or no scope at all: the whole mount
//! - `"dir/**"`: `dir` and its whole subtree
//! - `"dir/*"`: `dir` and its direct children
//! - `"path"`: the resource itself, including its subtree if it is a directory

use crate::error::DbafsError;
use crate::path;
use crate::store::RecordScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeDepth {
    Shallow,
    Deep,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope {
    pub path: String,
    pub depth: ScopeDepth,
}

impl Scope {
    pub fn deep(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            depth: ScopeDepth::Deep,
        }
    }

    pub fn shallow(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            depth: ScopeDepth::Shallow,
        }
    }

    /// Parse one scope expression.
    pub fn parse(expression: &str) -> Result<Self, DbafsError> {
        let trimmed = expression.trim_end_matches('/');
        let (base, depth) = if trimmed == "**" {
            ("", ScopeDepth::Deep)
        } else if trimmed == "*" {
            ("", ScopeDepth::Shallow)
        } else if let Some(base) = trimmed.strip_suffix("/**") {
            (base, ScopeDepth::Deep)
        } else if let Some(base) = trimmed.strip_suffix("/*") {
            (base, ScopeDepth::Shallow)
        } else {
            (trimmed, ScopeDepth::Deep)
        };
        if base.contains('*') {
            return Err(DbafsError::invalid_path(
                expression,
                "wildcards are only allowed as a trailing /* or /**",
            ));
        }
        Ok(Self {
            path: path::normalize(base)?,
            depth,
        })
    }

    /// `true` if `candidate` is scanned by this scope.
    pub fn covers(&self, candidate: &str) -> bool {
        match self.depth {
            ScopeDepth::Deep => path::is_base_path(&self.path, candidate),
            ScopeDepth::Shallow => {
                candidate == self.path || path::parent(candidate) == Some(self.path.as_str())
            }
        }
    }

    /// Record scopes selecting what this scope may classify.
    pub fn record_scopes(&self) -> Vec<RecordScope> {
        match self.depth {
            ScopeDepth::Deep => vec![RecordScope::Subtree(self.path.clone())],
            ScopeDepth::Shallow if self.path.is_empty() => {
                vec![RecordScope::Children(String::new())]
            }
            ScopeDepth::Shallow => vec![
                RecordScope::Exact(self.path.clone()),
                RecordScope::Children(self.path.clone()),
            ],
        }
    }

    /// Render back into the expression grammar.
    pub fn expression(&self) -> String {
        let suffix = match self.depth {
            ScopeDepth::Deep => "**",
            ScopeDepth::Shallow => "*",
        };
        path::join(&self.path, suffix)
    }
}

/// A normalized, non-redundant set of scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: Vec<Scope>,
}

impl ScopeSet {
    /// Parse expressions; no expression means the whole mount. Scopes covered
    /// by a deep scope are dropped.
    pub fn parse(expressions: &[&str]) -> Result<Self, DbafsError> {
        let mut parsed = expressions
            .iter()
            .map(|e| Scope::parse(e))
            .collect::<Result<Vec<_>, _>>()?;
        if parsed.is_empty() {
            parsed.push(Scope::deep(""));
        }
        Ok(Self::from_scopes(parsed))
    }

    pub fn from_scopes(mut scopes: Vec<Scope>) -> Self {
        scopes.sort();
        scopes.dedup();
        let deep: Vec<Scope> = scopes
            .iter()
            .filter(|s| s.depth == ScopeDepth::Deep)
            .cloned()
            .collect();
        scopes.retain(|scope| {
            !deep.iter().any(|d| {
                d != scope && path::is_base_path(&d.path, &scope.path)
            })
        });
        Self { scopes }
    }

    pub fn whole() -> Self {
        Self {
            scopes: vec![Scope::deep("")],
        }
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn covers(&self, candidate: &str) -> bool {
        self.scopes.iter().any(|s| s.covers(candidate))
    }

    /// `true` if a deep scope covers `candidate`.
    pub fn deep_covers(&self, candidate: &str) -> bool {
        self.scopes
            .iter()
            .any(|s| s.depth == ScopeDepth::Deep && s.covers(candidate))
    }

    pub fn record_scopes(&self) -> Vec<RecordScope> {
        self.scopes.iter().flat_map(Scope::record_scopes).collect()
    }

    /// `true` if every direct child of `dir` is part of the scan.
    pub fn fully_listed(&self, dir: &str) -> bool {
        self.scopes.iter().any(|s| match s.depth {
            ScopeDepth::Deep => path::is_base_path(&s.path, dir),
            ScopeDepth::Shallow => s.path == dir,
        })
    }

    /// Directories whose hash must be rebuilt from stored children because a
    /// scope below them may change: proper ancestors of scope roots that are
    /// not fully listed, deepest first.
    pub fn cascade_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|s| path::ancestors(&s.path))
            .filter(|a| !self.fully_listed(a))
            .map(str::to_string)
            .collect();
        dirs.sort_by(|a, b| path::depth(b).cmp(&path::depth(a)).then_with(|| a.cmp(b)));
        dirs.dedup();
        dirs
    }
}
