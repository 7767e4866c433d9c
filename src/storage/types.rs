use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{ExecutorError, Result};

/// Where artifacts live, parsed once from the configured location string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactLocation {
    /// Directory visible to both the submitter and the worker container
    SharedPath(PathBuf),
    /// Object-storage bucket with an optional key prefix (no trailing `/`)
    Bucket { bucket: String, prefix: String },
}

impl ArtifactLocation {
    /// Parse `s3://bucket[/prefix]` or an absolute filesystem path.
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();

        if location.is_empty() {
            return Err(ExecutorError::ConfigurationError(
                "artifact store location is empty".to_string(),
            ));
        }

        if let Some(stripped) = location.strip_prefix("s3://") {
            let mut parts = stripped.splitn(2, '/');
            let bucket = parts.next().unwrap_or_default();
            if bucket.is_empty() {
                return Err(ExecutorError::ConfigurationError(format!(
                    "artifact store location '{}' has no bucket name",
                    location
                )));
            }
            let prefix = parts.next().unwrap_or_default().trim_matches('/');
            return Ok(ArtifactLocation::Bucket {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }

        if location.contains("://") {
            return Err(ExecutorError::ConfigurationError(format!(
                "unsupported artifact store scheme in '{}'",
                location
            )));
        }

        let path = PathBuf::from(location);
        if !path.is_absolute() {
            return Err(ExecutorError::ConfigurationError(format!(
                "artifact store path '{}' must be absolute",
                location
            )));
        }

        Ok(ArtifactLocation::SharedPath(path))
    }

    pub fn is_shared_path(&self) -> bool {
        matches!(self, ArtifactLocation::SharedPath(_))
    }

    /// Object key for an artifact, including the prefix
    pub fn object_key(&self, key: &str) -> String {
        match self {
            ArtifactLocation::Bucket { prefix, .. } if !prefix.is_empty() => {
                format!("{}/{}", prefix, key)
            }
            _ => key.to_string(),
        }
    }

    /// URI of an artifact at this location
    pub fn uri_for(&self, key: &str) -> String {
        match self {
            ArtifactLocation::SharedPath(dir) => {
                format!("file://{}", dir.join(key).display())
            }
            ArtifactLocation::Bucket { bucket, .. } => {
                format!("s3://{}/{}", bucket, self.object_key(key))
            }
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::SharedPath(dir) => write!(f, "{}", dir.display()),
            ArtifactLocation::Bucket { bucket, prefix } if prefix.is_empty() => {
                write!(f, "s3://{}", bucket)
            }
            ArtifactLocation::Bucket { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket() {
        assert_eq!(
            ArtifactLocation::parse("s3://my-bucket").unwrap(),
            ArtifactLocation::Bucket {
                bucket: "my-bucket".to_string(),
                prefix: String::new()
            }
        );
        assert_eq!(
            ArtifactLocation::parse("s3://my-bucket/tasks/").unwrap(),
            ArtifactLocation::Bucket {
                bucket: "my-bucket".to_string(),
                prefix: "tasks".to_string()
            }
        );
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(
            ArtifactLocation::parse("/tmp").unwrap(),
            ArtifactLocation::SharedPath(PathBuf::from("/tmp"))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_locations() {
        for bad in ["", "   ", "s3://", "s3:///prefix", "gs://bucket", "relative/dir"] {
            assert!(
                matches!(
                    ArtifactLocation::parse(bad),
                    Err(ExecutorError::ConfigurationError(_))
                ),
                "expected configuration error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_object_keys_and_uris() {
        let bucket = ArtifactLocation::parse("s3://b/p").unwrap();
        assert_eq!(bucket.object_key("func-1.pkl"), "p/func-1.pkl");
        assert_eq!(bucket.uri_for("func-1.pkl"), "s3://b/p/func-1.pkl");

        let bare = ArtifactLocation::parse("s3://b").unwrap();
        assert_eq!(bare.object_key("func-1.pkl"), "func-1.pkl");

        let path = ArtifactLocation::parse("/data").unwrap();
        assert_eq!(path.uri_for("func-1.pkl"), "file:///data/func-1.pkl");
    }
}
