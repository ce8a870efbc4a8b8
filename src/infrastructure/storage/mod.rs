//! Object storage for message media

pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use std::path::Path;

use crate::domain::shared::Result;

pub use s3::S3ObjectStore;

/// Blob storage addressed by bucket and key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes>;
}

/// Content type of an upload, derived from the file extension
pub fn content_type_for(path: &Path) -> Mime {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let known = match ext.as_deref() {
        Some("png") => return mime::IMAGE_PNG,
        Some("jpg") | Some("jpeg") => return mime::IMAGE_JPEG,
        Some("gif") => return mime::IMAGE_GIF,
        Some("bmp") => return mime::IMAGE_BMP,
        Some("svg") => return mime::IMAGE_SVG,
        Some("txt") => return mime::TEXT_PLAIN,
        Some("vcf") => "text/vcard",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("mp4") => "video/mp4",
        Some("3gp") => "video/3gpp",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("amr") => "audio/amr",
        Some("wav") => "audio/wav",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    known
        .parse()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("/tmp/cat.PNG")), mime::IMAGE_PNG);
        assert_eq!(content_type_for(Path::new("clip.mp4")).essence_str(), "video/mp4");
        assert_eq!(
            content_type_for(Path::new("no_extension")),
            mime::APPLICATION_OCTET_STREAM
        );
    }
}
