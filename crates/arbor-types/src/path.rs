//! Hierarchical branch paths.
//!
//! A branch path is a slash-separated list of segments rooted at `MAIN`,
//! for example `MAIN/2024-07/task-12`. Valid paths:
//! - Start with the `MAIN` segment
//! - Have non-empty segments (no `//`, no leading or trailing `/`)
//! - Use only ASCII letters, digits, `_`, `-` and `.` in segments
//! - Have segments of at most 50 characters that do not start with `.`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Maximum length of a single path segment.
pub const MAX_SEGMENT_LEN: usize = 50;

/// A validated branch path.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchPath(String);

impl BranchPath {
    /// Name of the root branch.
    pub const MAIN: &'static str = "MAIN";

    /// The root branch path.
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// Parse and validate a path.
    pub fn parse(path: &str) -> Result<Self, TypeError> {
        let mut segments = path.split(SEPARATOR);
        match segments.next() {
            Some(Self::MAIN) => {}
            _ => {
                return Err(TypeError::InvalidBranchPath {
                    path: path.to_string(),
                    reason: format!("must start with '{}'", Self::MAIN),
                })
            }
        }
        for segment in segments {
            validate_segment(segment).map_err(|reason| TypeError::InvalidBranchPath {
                path: path.to_string(),
                reason,
            })?;
        }
        Ok(Self(path.to_string()))
    }

    /// Path of a direct child with the given name.
    pub fn child(&self, name: &str) -> Result<Self, TypeError> {
        validate_segment(name).map_err(|reason| TypeError::InvalidBranchPath {
            path: format!("{}{SEPARATOR}{name}", self.0),
            reason,
        })?;
        Ok(Self(format!("{}{SEPARATOR}{name}", self.0)))
    }

    /// The parent path, or `None` for `MAIN`.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| Self(self.0[..idx].to_string()))
    }

    /// The last segment.
    pub fn name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Returns `true` for the root branch.
    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    /// Number of segments below `MAIN` (0 for `MAIN` itself).
    pub fn depth(&self) -> usize {
        self.0.matches(SEPARATOR).count()
    }

    /// Iterate over the segments, `MAIN` first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Returns `true` if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &BranchPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0[self.0.len()..].starts_with(SEPARATOR)
    }

    /// Returns `true` if `self` is a strict descendant of `other`.
    pub fn is_descendant_of(&self, other: &BranchPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// All strict ancestors, nearest first, ending with `MAIN`.
    pub fn ancestors(&self) -> Vec<BranchPath> {
        let mut result = Vec::with_capacity(self.depth());
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            result.push(path);
        }
        result
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("path segments must not be empty".into());
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(format!(
            "segment '{segment}' is longer than {MAX_SEGMENT_LEN} characters"
        ));
    }
    if segment.starts_with('.') {
        return Err(format!("segment '{segment}' must not start with '.'"));
    }
    if let Some(ch) = segment
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')))
    {
        return Err(format!("contains forbidden character: {ch:?}"));
    }
    Ok(())
}

impl FromStr for BranchPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BranchPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BranchPath> for String {
    fn from(path: BranchPath) -> Self {
        path.0
    }
}

impl AsRef<str> for BranchPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BranchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchPath({})", self.0)
    }
}

impl fmt::Display for BranchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
