/// Remote media references
use serde::{Deserialize, Serialize};

/// Location of an object in the media store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MediaObject {
    pub key: String,
    pub bucket: String,
    pub region: String,
}

impl MediaObject {
    pub fn new(
        key: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    /// Final path segment of the object key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        let media = MediaObject::new("id/telephony/media/abc.png", "bucket", "us-east-1");
        assert_eq!(media.file_name(), "abc.png");

        let flat = MediaObject::new("abc", "bucket", "us-east-1");
        assert_eq!(flat.file_name(), "abc");
    }
}
