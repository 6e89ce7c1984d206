//! Image blobs handed to the classifier.
//!
//! A blob comes from a local file chosen by the user or from a camera frame
//! captured by a front end; either way it reaches the classifier as raw
//! bytes with a file name and MIME type.

use anyhow::{bail, Context, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime: mime.into(),
        }
    }

    /// Read an image from disk, inferring its MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        if bytes.is_empty() {
            bail!("image file is empty: {}", path.display());
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_for_path(path);

        Ok(Self {
            bytes,
            file_name,
            mime,
        })
    }
}

/// MIME type guessed from the file extension, `application/octet-stream`
/// when unknown.
pub fn mime_for_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
