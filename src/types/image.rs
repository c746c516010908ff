// ABOUTME: Target image (repository + tag) for a deploy request.
// ABOUTME: Parses "registry/name:tag" strings, keeping registry ports out of the tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// The image a deploy request wants running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetImage {
    pub repository: String,
    pub tag: String,
}

impl TargetImage {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Parse `repository[:tag]`, defaulting the tag to `latest`.
    pub fn parse(input: &str) -> Result<Self, ParseImageError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageError::Empty);
        }

        for c in input.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_') {
                return Err(ParseImageError::InvalidChar(c));
            }
        }

        // A colon followed by a slash belongs to a registry port, not a tag
        let (repository, tag) = match input.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, after),
            _ => (input, "latest"),
        };

        if repository.is_empty() || tag.is_empty() {
            return Err(ParseImageError::InvalidFormat(input.to_string()));
        }

        Ok(Self::new(repository, tag))
    }
}

impl fmt::Display for TargetImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repository_and_tag() {
        let image = TargetImage::parse("quay.io/foo/bar:beta").unwrap();
        assert_eq!(image.repository, "quay.io/foo/bar");
        assert_eq!(image.tag, "beta");
    }

    #[test]
    fn defaults_tag_to_latest() {
        let image = TargetImage::parse("nginx").unwrap();
        assert_eq!(image.repository, "nginx");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let image = TargetImage::parse("localhost:5000/app").unwrap();
        assert_eq!(image.repository, "localhost:5000/app");
        assert_eq!(image.tag, "latest");

        let image = TargetImage::parse("localhost:5000/app:v2").unwrap();
        assert_eq!(image.repository, "localhost:5000/app");
        assert_eq!(image.tag, "v2");
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(TargetImage::parse("  "), Err(ParseImageError::Empty));
        assert_eq!(
            TargetImage::parse("app:"),
            Err(ParseImageError::InvalidFormat("app:".to_string()))
        );
        assert_eq!(
            TargetImage::parse("app tag"),
            Err(ParseImageError::InvalidChar(' '))
        );
    }

    #[test]
    fn displays_as_repository_colon_tag() {
        assert_eq!(TargetImage::new("quay.io/x", "1.0").to_string(), "quay.io/x:1.0");
    }
}
