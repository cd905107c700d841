use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::ApiError;

pub const FILE_FIELD: &str = "file";

const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// An uploaded image as received, before it touches the disk.
#[derive(Debug)]
pub struct UploadedImage {
    /// Already passed through `secure_filename`, may be empty.
    pub filename: String,
    pub bytes: Bytes,
}

/// Pulls the `file` field out of a multipart form.
pub async fn read_upload(multipart: &mut Multipart) -> Result<UploadedImage, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // a part without a filename parameter is a plain form value, not a file
        let filename = match field.file_name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        if filename.is_empty() {
            return Err(ApiError::EmptyFilename);
        }

        let bytes = field.bytes().await.map_err(malformed)?;
        return Ok(UploadedImage {
            filename: secure_filename(&filename),
            bytes,
        });
    }

    Err(ApiError::MissingFilePart)
}

fn malformed(err: axum::extract::multipart::MultipartError) -> ApiError {
    warn!("failed to read multipart body: {}", err);
    ApiError::MalformedUpload
}

/// Reduces a client supplied filename to a safe, flat ASCII name.
///
/// Accented characters are decomposed and lose their marks. Path separators
/// turn into word breaks, whitespace runs become `_`, and only
/// `[A-Za-z0-9._-]` survives. Leading and trailing dots and underscores are
/// stripped, so `../../etc/passwd` becomes `etc_passwd`. Windows device
/// names get a leading `_`. The result can be empty.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    let safe = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string();

    let stem = safe.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        format!("_{}", safe)
    } else {
        safe
    }
}

/// An upload written to disk for the duration of one request.
///
/// The file is deleted when this value is dropped, which covers early
/// returns and unwinding as well as the normal path.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    pub async fn persist(dir: &Path, image: &UploadedImage) -> std::io::Result<Self> {
        let id = Uuid::new_v4().simple();
        let name = if image.filename.is_empty() {
            format!("temp_{}", id)
        } else {
            format!("temp_{}_{}", id, image.filename)
        };

        // created before writing so a partial file is cleaned up too
        let upload = TempUpload {
            path: dir.join(name),
        };
        tokio::fs::write(&upload.path, &image.bytes).await?;
        debug!(path = %upload.path.display(), size = image.bytes.len(), "upload stored");

        Ok(upload)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "upload removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("failed to remove {}: {}", self.path.display(), err),
        }
    }
}
