use std::collections::HashMap;

use axum::extract::Multipart;

use crate::core::errors::ApiError;

/// Form field carrying the uploaded file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A `multipart/form-data` body: the `file` part plus any text fields.
#[derive(Debug, Default)]
pub struct Upload {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl Upload {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Upload::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable upload: {}", e)))?;
                upload.file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable field {}: {}", name, e)))?;
                upload.fields.insert(name, value);
            }
        }
        Ok(upload)
    }

    pub fn require_file(self) -> Result<(UploadedFile, HashMap<String, String>), ApiError> {
        match self.file {
            Some(file) => Ok((file, self.fields)),
            None => Err(ApiError::BadRequest(format!(
                "multipart field '{}' is required",
                FILE_FIELD
            ))),
        }
    }
}
