//! Common types shared between the error, problem, and output modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location in a rendered source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    /// File path (workspace-relative).
    pub file: String,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, UTF-8 bytes).
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_end: Option<u64>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Location {
            file: file.into(),
            line,
            col,
            byte_start: None,
            byte_end: None,
        }
    }

    pub fn with_span(
        file: impl Into<String>,
        line: u32,
        col: u32,
        byte_start: u64,
        byte_end: u64,
    ) -> Self {
        Location {
            file: file.into(),
            line,
            col,
            byte_start: Some(byte_start),
            byte_end: Some(byte_end),
        }
    }

    /// Location naming a whole file (line 1, column 1).
    pub fn file_only(file: impl Into<String>) -> Self {
        Location::new(file, 1, 1)
    }

    /// Parse a location from "path:line:col" format.
    ///
    /// Splits from the right so paths containing colons survive.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, ':');
        let col = parts.next()?.parse().ok()?;
        let line = parts.next()?.parse().ok()?;
        let file = parts.next()?;
        if file.is_empty() {
            return None;
        }
        Some(Location::new(file, line, col))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_display() {
        let loc = Location::new("p/A.java", 3, 9);
        assert_eq!(Location::parse(&loc.to_string()), Some(loc));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(Location::parse("A.java:3"), None);
        assert_eq!(Location::parse(":3:4"), None);
        assert_eq!(Location::parse("A.java:x:4"), None);
    }

    #[test]
    fn parse_keeps_colons_in_path() {
        let loc = Location::parse("C:/src/A.java:2:5").unwrap();
        assert_eq!(loc.file, "C:/src/A.java");
        assert_eq!((loc.line, loc.col), (2, 5));
    }
}
