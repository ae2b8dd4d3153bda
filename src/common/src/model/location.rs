use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised while parsing an object location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Unsupported location scheme in '{0}', expected s3://bucket/key")]
    UnsupportedScheme(String),
    #[error("Location '{0}' is missing a bucket")]
    MissingBucket(String),
    #[error("Location '{0}' is missing a key")]
    MissingKey(String),
}

/// Bucket and key of one artifact in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse an `s3://bucket/key` URI.
    ///
    /// ```
    /// use common::model::ObjectLocation;
    ///
    /// let location = ObjectLocation::parse_s3_uri("s3://b/dir/k1").unwrap();
    /// assert_eq!(location.bucket, "b");
    /// assert_eq!(location.key, "dir/k1");
    /// ```
    pub fn parse_s3_uri(uri: &str) -> Result<Self, LocationError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| LocationError::UnsupportedScheme(uri.to_string()))?;

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(LocationError::MissingBucket(uri.to_string()));
        }
        if key.is_empty() {
            return Err(LocationError::MissingKey(uri.to_string()));
        }

        Ok(Self::new(bucket, key))
    }

    /// Render as an `s3://bucket/key` URI.
    pub fn to_s3_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectLocation {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_s3_uri(s)
    }
}
