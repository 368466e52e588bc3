//! Reading the uploaded image out of a `multipart/form-data` body

use crate::image::{Image, DEFAULT_MIME_TYPE};
use actix_multipart::{Multipart, MultipartError};
use tokio_stream::StreamExt;

/// Name of the form field carrying the image file
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no `image` file in the upload")]
    Missing,

    #[error("malformed multipart body: {0}")]
    Malformed(#[from] MultipartError),
}

/// Take the first file sent in the `image` field. Other fields are read and
/// discarded; the declared content type is kept as-is. A form with no parts
/// at all is a missing image, not a malformed one
pub async fn read_image(mut payload: Multipart) -> Result<Image, UploadError> {
    let mut image = None;
    let mut fields = 0;

    while let Some(field) = payload.next().await {
        let mut field = match field {
            Ok(field) => field,
            Err(MultipartError::Incomplete) if fields == 0 => return Err(UploadError::Missing),
            Err(e) => return Err(e.into()),
        };
        fields += 1;

        let disposition = field.content_disposition();
        let wanted = image.is_none()
            && disposition.get_name() == Some(IMAGE_FIELD)
            && disposition.get_filename().is_some();
        let mime_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.into());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if wanted {
                bytes.extend_from_slice(&chunk);
            }
        }

        if wanted {
            image = Some(Image::new(bytes, mime_type));
        }
    }

    image.ok_or(UploadError::Missing)
}
