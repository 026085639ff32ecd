//! Multipart form collection shared by the upload endpoints.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use tracing::warn;

use crate::blob_store::{BlobStore, StoredBlob};
use crate::error::ServerError;

/// Most files accepted in one request.
pub const MAX_FILES_PER_REQUEST: usize = 10;

#[derive(Debug)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// A fully buffered multipart form.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl Form {
    /// Drain `multipart`, rejecting any single file above `max_file_size`.
    ///
    /// File parts submitted without a file name are ignored, the way
    /// browsers send an empty file input.
    pub async fn read(multipart: &mut Multipart, max_file_size: usize) -> Result<Self, ServerError> {
        let mut form = Form::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();

            let Some(filename) = field.file_name().map(str::to_string) else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                form.fields.insert(name, value);
                continue;
            };
            if filename.is_empty() {
                continue;
            }
            if form.files.len() == MAX_FILES_PER_REQUEST {
                return Err(ServerError::BadRequest(format!(
                    "At most {MAX_FILES_PER_REQUEST} files per request"
                )));
            }

            let content_type = field.content_type().map(str::to_string);
            let mut data = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read file: {}", e)))?
            {
                if data.len() + chunk.len() > max_file_size {
                    return Err(ServerError::UploadTooLarge {
                        size: data.len() + chunk.len(),
                        max: max_file_size,
                    });
                }
                data.extend_from_slice(&chunk);
            }

            form.files.push(UploadedFile {
                field: name,
                filename,
                content_type,
                data,
            });
        }

        Ok(form)
    }

    /// Trimmed, non-empty text value of a field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, name: &str) -> Result<&str, ServerError> {
        self.text(name)
            .ok_or_else(|| ServerError::BadRequest(format!("Field '{name}' is required")))
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ServerError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| ServerError::BadRequest(format!("Field '{name}' is invalid")))
            })
            .transpose()
    }

    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> {
        self.files.iter().filter(move |f| f.field == name)
    }
}

/// Write every file to the upload directory, returning one blob per file
/// in the same order.
///
/// If one write fails, the files already written by this call are removed
/// again before the error is returned.
pub async fn store_files(
    blob_store: &BlobStore,
    files: &[&UploadedFile],
) -> Result<Vec<StoredBlob>, ServerError> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        match blob_store.store_upload(&file.filename, &file.data).await {
            Ok(blob) => stored.push(blob),
            Err(e) => {
                discard(blob_store, &stored).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

/// Best-effort removal of uploads whose database write did not happen.
pub async fn discard(blob_store: &BlobStore, blobs: &[StoredBlob]) {
    for blob in blobs {
        if let Err(e) = blob_store.delete_upload(&blob.filename).await {
            warn!(filename = %blob.filename, error = %e, "Failed to discard upload");
        }
    }
}
