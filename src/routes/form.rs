//! Buffered multipart forms: text fields plus file parts, capped in size.

use std::collections::HashMap;

use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::storage::{upload_key, MediaStore};

pub(crate) struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct MultipartForm {
    fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut payload: Multipart, max_bytes: usize) -> Result<Self, ApiError> {
        let mut form = Self::default();
        let mut total = 0usize;
        while let Some(mut field) = payload
            .try_next()
            .await
            .map_err(|e| ApiError::bad_request(format!("multipart error: {e}")))?
        {
            let (name, filename) = {
                let cd = field.content_disposition();
                (cd.get_name().unwrap_or_default().to_string(), cd.get_filename().map(str::to_string))
            };
            let mut buf = Vec::new();
            while let Some(chunk) = field
                .try_next()
                .await
                .map_err(|e| ApiError::bad_request(format!("multipart error: {e}")))?
            {
                total += chunk.len();
                if total > max_bytes {
                    return Err(ApiError::PayloadTooLarge);
                }
                buf.extend_from_slice(&chunk);
            }
            match filename {
                // browsers send an empty part for an untouched file input
                Some(filename) if filename.is_empty() && buf.is_empty() => {}
                Some(filename) => form.files.push(UploadedFile { field: name, filename, bytes: buf }),
                None => {
                    let text = String::from_utf8(buf)
                        .map_err(|_| ApiError::bad_request(format!("field {name} is not valid utf-8")))?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Trimmed text, `None` when absent or blank.
    pub fn non_blank(&self, name: &str) -> Option<String> {
        self.text(name).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// A JSON array carried in a text field; absent, empty or `null` is an empty list.
    pub fn json_list<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, ApiError> {
        match self.text(name).map(str::trim) {
            None | Some("") | Some("null") => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| ApiError::bad_request(format!("invalid {name}: {e}"))),
        }
    }

    /// File parts sent as `name` or `name[]`.
    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files
            .iter()
            .filter(move |f| f.field == name || f.field.strip_suffix("[]") == Some(name))
    }
}

/// Store each file under `folder`, returning the keys. On failure the files
/// already written are removed and the error is returned.
pub(crate) async fn store_files<'a>(
    media: &dyn MediaStore,
    folder: &str,
    files: impl Iterator<Item = &'a UploadedFile>,
) -> Result<Vec<String>, ApiError> {
    let mut stored = Vec::new();
    for file in files {
        let key = upload_key(folder, &file.filename);
        if let Err(e) = media.save(&key, &file.bytes).await {
            tracing::error!(%key, "upload store write failed: {e}");
            discard(media, &stored).await;
            return Err(ApiError::Internal);
        }
        stored.push(key);
    }
    Ok(stored)
}

/// Best-effort removal of uploads no row points at.
pub(crate) async fn discard(media: &dyn MediaStore, keys: &[String]) {
    for key in keys {
        if let Err(e) = media.delete(key).await {
            tracing::warn!(%key, "could not remove orphaned upload: {e}");
        }
    }
}
