//! Uploaded images and their inline `data:` URL encoding

use base64::{engine::general_purpose, Engine as _};
use std::fmt::Debug;

/// Content type used when an upload does not declare one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// An in-memory image received from a client
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Image {{ bytes: <{} bytes>, mime_type: {:?} }}",
            self.bytes.len(),
            self.mime_type
        )
    }
}

impl Image {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Image {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Encode as `data:<mime type>;base64,<payload>`. The mime type is passed
    /// through as declared and an empty image still encodes
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}
