// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Identifier and package-name validation.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reserved words and literals that cannot name a declaration.
pub const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null", "_",
];

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}_$][\p{L}\p{N}_$]*$").expect("identifier pattern"));

pub fn is_java_keyword(name: &str) -> bool {
    JAVA_KEYWORDS.contains(&name)
}

fn invalid(name: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a simple identifier.
///
/// ```
/// use recast_java::validation::validate_identifier;
///
/// assert!(validate_identifier("count").is_ok());
/// assert!(validate_identifier("$tmp").is_ok());
/// assert!(validate_identifier("2nd").is_err());
/// assert!(validate_identifier("class").is_err());
/// ```
pub fn validate_identifier(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name cannot be empty"));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(invalid(
            name,
            "must start with a letter, '_' or '$' and contain only letters, digits, '_' or '$'",
        ));
    }
    if is_java_keyword(name) {
        return Err(invalid(name, "cannot use a reserved word as an identifier"));
    }
    Ok(())
}

/// Validate a dotted package name. The empty string is the default package.
pub fn validate_package_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Ok(());
    }
    for segment in name.split('.') {
        validate_identifier(segment).map_err(|_| invalid(name, format!("bad segment '{segment}'")))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod identifier_tests {
        use super::*;

        #[test]
        fn accepts_ordinary_names() {
            for name in ["x", "count", "_hidden", "$proxy", "Node2", "größe"] {
                assert!(validate_identifier(name).is_ok(), "{name}");
            }
        }

        #[test]
        fn rejects_bad_names() {
            assert!(validate_identifier("").is_err());
            assert!(validate_identifier("9lives").is_err());
            assert!(validate_identifier("a-b").is_err());
            assert!(validate_identifier("a.b").is_err());
            assert!(validate_identifier("new").is_err());
            assert!(validate_identifier("null").is_err());
        }
    }

    mod package_tests {
        use super::*;

        #[test]
        fn dotted_names() {
            assert!(validate_package_name("com.example.util").is_ok());
            assert!(validate_package_name("").is_ok());
            assert!(validate_package_name("com..example").is_err());
            assert!(validate_package_name("com.int").is_err());
        }
    }
}
