//utils.rs
use actix_multipart::{Field, Multipart};
use actix_web::web;
use futures::TryStreamExt;
use image::imageops::FilterType;
use sanitize_filename::sanitize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{AppError, AppResult};
use crate::models::image::thumbnail_path;

/// Public URL prefix that `actix_files` serves the upload directory under.
pub const UPLOADS_ROUTE: &str = "uploads";

const THUMBNAIL_WIDTH: u32 = 400;
const MAX_TEXT_FIELD: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
}

impl StoredFile {
    /// Relative path recorded on the image row, e.g. `uploads/image-<uuid>.jpg`.
    pub fn public_path(&self) -> String {
        format!("{UPLOADS_ROUTE}/{}", self.filename)
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{base_url}/{}", self.public_path())
    }
}

/// Files written for one multipart request plus its plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<StoredFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

pub fn ensure_upload_dir(upload: &UploadConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&upload.dir)
}

/// Streams up to `max_files` parts named `file_field` (or `file_field[]`) to
/// the upload directory and collects the remaining text parts. Files already
/// written are removed again when the request turns out to be invalid.
pub async fn read_upload_form(
    mut payload: Multipart,
    file_field: &str,
    max_files: usize,
    upload: &UploadConfig,
) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    let result = async {
        while let Some(field) = payload.try_next().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == file_field || name == format!("{file_field}[]") {
                if form.files.len() >= max_files {
                    return Err(AppError::bad_request(format!(
                        "Too many files. Maximum is {max_files} files."
                    )));
                }
                let stored = save_field(field, file_field, upload).await?;
                form.files.push(stored);
            } else {
                let value = field_to_string(field).await?;
                form.fields.insert(name, value);
            }
        }
        Ok::<(), AppError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(form),
        Err(e) => {
            discard(upload, &form.files).await;
            Err(e)
        }
    }
}

async fn save_field(mut field: Field, prefix: &str, upload: &UploadConfig) -> AppResult<StoredFile> {
    let content_type = field
        .content_type()
        .cloned()
        .ok_or_else(|| AppError::bad_request("Only image files are allowed!"))?;
    if content_type.type_() != mime::IMAGE {
        return Err(AppError::bad_request("Only image files are allowed!"));
    }

    let original_name = field
        .content_disposition()
        .and_then(|cd| cd.get_filename().map(|s| s.to_string()))
        .unwrap_or_else(|| "image".to_string());

    let filename = stored_filename(prefix, &original_name, content_type.essence_str());
    let filepath = upload.dir.join(&filename);
    let mut file = tokio::fs::File::create(&filepath).await?;

    let mut size = 0usize;
    let written = async {
        while let Some(chunk) = field.try_next().await? {
            size += chunk.len();
            if size > upload.max_file_size {
                return Err(AppError::bad_request(format!(
                    "File too large. Maximum size is {}.",
                    human_size(upload.max_file_size)
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<(), AppError>(())
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(&filepath).await;
        return Err(e);
    }

    log::debug!("stored upload {original_name} as {filename} ({size} bytes)");
    Ok(StoredFile {
        filename,
        original_name,
        size: size as i64,
        mime_type: content_type.essence_str().to_string(),
    })
}

/// `<field>-<uuid>.<ext>`, extension taken from the client's name or the mime type.
pub fn stored_filename(prefix: &str, original_name: &str, mime_type: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime_type)
                .and_then(|exts| exts.first())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());

    sanitize(format!("{prefix}-{}.{ext}", Uuid::new_v4()))
}

async fn field_to_string(mut field: Field) -> AppResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD {
            return Err(AppError::bad_request("Form field too large"));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::bad_request("Form field is not valid UTF-8"))
}

/// Writes a `_thumb` copy at most 400px wide and reports whether it exists.
/// Files the `image` crate cannot decode keep no thumbnail.
pub async fn generate_thumbnail(upload: &UploadConfig, filename: &str) -> bool {
    let source = upload.dir.join(filename);
    let target = upload.dir.join(thumbnail_path(filename));

    let result = web::block(move || -> Result<(), image::ImageError> {
        let img = image::open(&source)?;
        let thumb = if img.width() > THUMBNAIL_WIDTH {
            img.resize(THUMBNAIL_WIDTH, u32::MAX, FilterType::Lanczos3)
        } else {
            img
        };
        thumb.save(&target)
    })
    .await;

    match result {
        Ok(Ok(())) => {
            log::debug!("thumbnail written for {filename}");
            true
        }
        Ok(Err(e)) => {
            log::warn!("no thumbnail for {filename}: {e}");
            false
        }
        Err(e) => {
            log::error!("thumbnail task for {filename} failed: {e}");
            false
        }
    }
}

/// Removes an upload and its thumbnail. Returns whether the original existed.
pub async fn remove_upload(upload: &UploadConfig, filename: &str) -> bool {
    let path: PathBuf = upload.dir.join(sanitize(filename));
    let removed = match tokio::fs::remove_file(&path).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("could not remove {}: {e}", path.display());
            false
        }
    };
    let _ = tokio::fs::remove_file(upload.dir.join(thumbnail_path(&sanitize(filename)))).await;
    removed
}

pub async fn discard(upload: &UploadConfig, files: &[StoredFile]) {
    for f in files {
        remove_upload(upload, &f.filename).await;
    }
}

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else {
        format!("{bytes} bytes")
    }
}
