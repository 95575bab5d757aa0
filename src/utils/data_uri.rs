//! Decoding of `data:{mime};base64,{payload}` image references.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;

/// Errors that can occur when turning an image reference into a file
#[derive(Debug)]
pub enum DataUriError {
    /// The reference is not a base64 `data:` URI (e.g. a remote URL)
    NotDataUri,
    /// The payload is not valid base64
    InvalidPayload(String),
    /// Writing the decoded bytes failed
    Io(std::io::Error),
}

impl fmt::Display for DataUriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataUriError::NotDataUri => write!(f, "Image is not an inline data URI"),
            DataUriError::InvalidPayload(msg) => write!(f, "Base64 decode failed: {}", msg),
            DataUriError::Io(err) => write!(f, "Failed to write image: {}", err),
        }
    }
}

impl std::error::Error for DataUriError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// File extension matching the MIME subtype, `bin` when unknown.
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

pub fn decode_data_uri(uri: &str) -> Result<DecodedImage, DataUriError> {
    let rest = uri.strip_prefix("data:").ok_or(DataUriError::NotDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUriError::NotDataUri)?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or(DataUriError::NotDataUri)?;

    let bytes = base64::prelude::BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| DataUriError::InvalidPayload(e.to_string()))?;

    Ok(DecodedImage {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    })
}

/// Decode `uri` and write the bytes to `path`, creating parent directories.
/// A path without an extension gets one from the MIME type. Returns the
/// image and the path actually written.
pub fn save_data_uri(uri: &str, path: &Path) -> Result<(DecodedImage, PathBuf), DataUriError> {
    let image = decode_data_uri(uri)?;
    let path = match path.extension() {
        Some(_) => path.to_path_buf(),
        None => path.with_extension(image.extension()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(DataUriError::Io)?;
    }
    fs::write(&path, &image.bytes).map_err(DataUriError::Io)?;
    Ok((image, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn decodes_inline_png() {
        let image = decode_data_uri("data:image/png;base64,QUJD").expect("decode");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes, b"ABC");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn rejects_remote_urls_and_bad_payloads() {
        assert!(matches!(
            decode_data_uri("https://example.test/cat.png"),
            Err(DataUriError::NotDataUri)
        ));
        assert!(matches!(
            decode_data_uri("data:image/png,plain"),
            Err(DataUriError::NotDataUri)
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(DataUriError::InvalidPayload(_))
        ));
    }

    #[test]
    fn saves_into_nested_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("images").join("cat.jpg");

        let (image, written) = save_data_uri("data:image/jpeg;base64,QUJD", &path).expect("save");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(written, path);
        assert_eq!(std::fs::read(&path).expect("read back"), b"ABC");
    }

    #[test]
    fn missing_extension_follows_mime_type() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (_, written) = save_data_uri(
            "data:image/webp;base64,QUJD",
            &temp_dir.path().join("sunset"),
        )
        .expect("save");
        assert_eq!(written, temp_dir.path().join("sunset.webp"));
        assert!(written.exists());
    }
}
