//! Product image uploads.
//!
//! Images are written under the configured upload directory with generated
//! names and served from `/images`. Only PNG and JPEG are accepted.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from storing or removing uploaded images.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload is not an accepted image type.
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    /// The form had no file or the file was empty.
    #[error("no image uploaded")]
    Missing,

    /// The stored name is not a plain file name.
    #[error("invalid image name: {0}")]
    InvalidName(String),

    /// Filesystem error.
    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

/// An image received from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// File extension for the upload's content type.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Missing` for an empty file and
    /// `UploadError::UnsupportedType` for anything but PNG or JPEG.
    pub fn extension(&self) -> Result<&'static str, UploadError> {
        if self.bytes.is_empty() {
            return Err(UploadError::Missing);
        }
        match self.content_type.as_str() {
            "image/png" => Ok("png"),
            "image/jpg" | "image/jpeg" => Ok("jpg"),
            other => Err(UploadError::UnsupportedType(other.to_string())),
        }
    }
}

/// Save an image under `dir` and return its generated file name.
///
/// # Errors
///
/// Returns `UploadError` if the type is rejected or the write fails.
pub async fn store_image(dir: &Path, upload: &ImageUpload) -> Result<String, UploadError> {
    let extension = upload.extension()?;
    let suffix: [u8; 8] = rand::random();
    let name = format!(
        "{}-{}.{extension}",
        chrono::Utc::now().timestamp_millis(),
        hex::encode(suffix)
    );

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(&name), &upload.bytes).await?;
    tracing::debug!(image = %name, bytes = upload.bytes.len(), "Image stored");
    Ok(name)
}

/// Delete a stored image. A file that is already gone is not an error.
///
/// # Errors
///
/// Returns `UploadError::InvalidName` for names that are not plain file
/// names, or `UploadError::Io` if removal fails.
pub async fn delete_image(dir: &Path, name: &str) -> Result<(), UploadError> {
    let path = image_path(dir, name)?;
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn image_path(dir: &Path, name: &str) -> Result<PathBuf, UploadError> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != "..";
    if !plain {
        return Err(UploadError::InvalidName(name.to_string()));
    }
    Ok(dir.join(name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn upload(content_type: &str, bytes: &[u8]) -> ImageUpload {
        ImageUpload {
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_accepted_types() {
        assert_eq!(upload("image/png", b"x").extension().unwrap(), "png");
        assert_eq!(upload("image/jpeg", b"x").extension().unwrap(), "jpg");
        assert_eq!(upload("image/jpg", b"x").extension().unwrap(), "jpg");
        assert!(matches!(
            upload("image/gif", b"x").extension(),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            upload("image/png", b"").extension(),
            Err(UploadError::Missing)
        ));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = Path::new("/tmp/images");
        assert!(image_path(dir, "../etc/passwd").is_err());
        assert!(image_path(dir, "..").is_err());
        assert!(image_path(dir, "").is_err());
        assert_eq!(
            image_path(dir, "1-ab.png").unwrap(),
            PathBuf::from("/tmp/images/1-ab.png")
        );
    }

    #[tokio::test]
    async fn test_store_then_delete() {
        let dir = std::env::temp_dir().join(format!("emporium-uploads-{}", uuid::Uuid::new_v4()));
        let name = store_image(&dir, &upload("image/png", b"\x89PNG"))
            .await
            .unwrap();
        assert!(name.ends_with(".png"));
        assert!(dir.join(&name).exists());

        delete_image(&dir, &name).await.unwrap();
        assert!(!dir.join(&name).exists());
        // Deleting again is fine
        delete_image(&dir, &name).await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
