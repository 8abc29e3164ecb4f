//! Model-relative file paths.

use std::fmt;

use thiserror::Error;

/// A path that cannot be staged under a model root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("absolute path not allowed: {0}")]
    Absolute(String),

    #[error("path escapes the model root: {0}")]
    Escapes(String),

    #[error("expected a single path component: {0}")]
    Nested(String),
}

/// Normalized, `/`-separated path that stays inside its model root.
///
/// Backslashes are treated as separators, `.` and empty components are
/// dropped, and `..` anywhere is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let unified = raw.trim().replace('\\', "/");
        if unified.is_empty() {
            return Err(PathError::Empty);
        }
        if unified.starts_with('/') || unified.chars().nth(1) == Some(':') {
            return Err(PathError::Absolute(raw.to_string()));
        }

        let mut components = Vec::new();
        for component in unified.split('/') {
            match component {
                "" | "." => continue,
                ".." => return Err(PathError::Escapes(raw.to_string())),
                other => components.push(other),
            }
        }

        if components.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(components.join("/")))
    }

    /// Parse a name that must stay one directory level, such as a model ID.
    pub fn component(raw: &str) -> Result<Self, PathError> {
        let path = Self::parse(raw)?;
        if path.0.contains('/') {
            return Err(PathError::Nested(raw.to_string()));
        }
        Ok(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Directory part, or `None` for a file directly at the root.
    pub fn parent(&self) -> Option<&str> {
        self.0.rfind('/').map(|idx| &self.0[..idx])
    }

    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
