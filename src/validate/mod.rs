use crate::constants::VIDEO_EXTENSIONS;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncReadExt;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("source file not found: {path}")]
    SourceNotFound { path: String },
    #[error("source is not a usable video: {reason}")]
    NotAVideo { reason: String },
    #[error("destination directory does not exist: {path}")]
    DestinationDirMissing { path: String },
    #[error("destination directory is not writable: {path}")]
    DestinationNotWritable { path: String },
    #[error("source and destination are the same file")]
    SamePath,
}

pub async fn validate_request(source: &Path, destination: &Path) -> Result<(), ValidationError> {
    validate_source(source).await?;
    validate_destination(destination).await?;

    if let (Ok(source), Ok(destination)) = (source.canonicalize(), destination.canonicalize()) {
        if source == destination {
            return Err(ValidationError::SamePath);
        }
    }

    Ok(())
}

pub async fn validate_source(path: &Path) -> Result<(), ValidationError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ValidationError::SourceNotFound {
            path: path.to_string_lossy().to_string(),
        })?;

    if !metadata.is_file() {
        return Err(ValidationError::NotAVideo {
            reason: format!("{} is not a file", path.display()),
        });
    }
    if metadata.len() == 0 {
        return Err(ValidationError::NotAVideo {
            reason: format!("{} is empty", path.display()),
        });
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) => {}
        Some(ext) => {
            return Err(ValidationError::NotAVideo {
                reason: format!("unsupported extension: {}", ext),
            });
        }
        None => {
            return Err(ValidationError::NotAVideo {
                reason: "no file extension".to_string(),
            });
        }
    }

    // Sniff the leading bytes; an inconclusive result trusts the extension.
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ValidationError::NotAVideo {
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;
    let mut head = vec![0u8; 8192];
    let read = file
        .read(&mut head)
        .await
        .map_err(|e| ValidationError::NotAVideo {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
    head.truncate(read);

    if let Some(kind) = infer::get(&head) {
        if !kind.mime_type().starts_with("video/") {
            return Err(ValidationError::NotAVideo {
                reason: format!("detected {}", kind.mime_type()),
            });
        }
    }

    Ok(())
}

pub async fn validate_destination(path: &Path) -> Result<(), ValidationError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    if !parent.exists() {
        return Err(ValidationError::DestinationDirMissing {
            path: parent.to_string_lossy().to_string(),
        });
    }

    // Probe write permissions with a throwaway file.
    let test_file = parent.join(".lightpress_write_test");
    match tokio::fs::write(&test_file, b"test").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&test_file).await;
            Ok(())
        }
        Err(_) => Err(ValidationError::DestinationNotWritable {
            path: parent.to_string_lossy().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_fake_video(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"\x00\x01\x02\x03 not a real stream").unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let err = validate_source(Path::new("/nonexistent/in.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();
        let err = validate_source(&path).await.unwrap_err();
        assert!(matches!(err, ValidationError::NotAVideo { .. }));
    }

    #[tokio::test]
    async fn test_unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fake_video(dir.path(), "notes.txt");
        let err = validate_source(&path).await.unwrap_err();
        assert!(matches!(err, ValidationError::NotAVideo { .. }));
    }

    #[tokio::test]
    async fn test_video_extension_with_inconclusive_sniff_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fake_video(dir.path(), "clip.mp4");
        assert!(validate_source(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_destination_dir_must_exist() {
        let err = validate_destination(Path::new("/nonexistent/dir/out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::DestinationDirMissing { .. }));
    }

    #[tokio::test]
    async fn test_same_source_and_destination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fake_video(dir.path(), "clip.mp4");
        let err = validate_request(&path, &path).await.unwrap_err();
        assert_eq!(err, ValidationError::SamePath);
    }

    #[tokio::test]
    async fn test_valid_pair_passes() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_fake_video(dir.path(), "clip.mp4");
        let destination = dir.path().join("out.mp4");
        assert!(validate_request(&source, &destination).await.is_ok());
    }
}
