use axum::extract::Multipart;

use crate::api::errors::ApiError;
use crate::api::validation::{normalized_mime, sanitized_filename, validate_image_upload};
use crate::core::config::StorageSettings;
use crate::models::submission::SourceImage;

/// Image part plus the optional `name` text part of an upload form.
pub(crate) struct ImageUpload {
    pub(crate) image: SourceImage,
    pub(crate) name: Option<String>,
}

pub(crate) async fn read_image_upload(
    mut multipart: Multipart,
    storage: &StorageSettings,
) -> Result<ImageUpload, ApiError> {
    let max_bytes = storage.max_upload_bytes();
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut name: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name == "file" {
            let filename = sanitized_filename(field.file_name().unwrap_or("upload"));
            let content_type =
                field.content_type().unwrap_or("application/octet-stream").to_string();
            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() + chunk.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "File size exceeds {}MB limit",
                        storage.max_upload_size_mb
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }
            file = Some((filename, content_type, bytes));
        } else if field_name == "name" {
            let text = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid name field".to_string()))?;
            name = Some(text);
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
    validate_image_upload(&filename, &content_type, &storage.allowed_image_extensions)?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("File is empty".to_string()));
    }

    Ok(ImageUpload {
        image: SourceImage::new(filename, normalized_mime(&content_type), bytes),
        name,
    })
}
