use std::path::Path;

use crate::models::job::{InputKind, MediaClass};

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".mkv", ".webm"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];
const AUDIO_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".m4a", ".aac"];

pub fn allowed_extensions(class: MediaClass) -> &'static [&'static str] {
    match class {
        MediaClass::Video => VIDEO_EXTENSIONS,
        MediaClass::Image => IMAGE_EXTENSIONS,
        MediaClass::Audio => AUDIO_EXTENSIONS,
    }
}

/// Check the file name's extension against the input slot's media class.
///
/// Returns the lowercased extension including the leading dot.
pub fn validate_extension(file_name: &str, kind: InputKind) -> Result<String, ValidationError> {
    let class = kind.media_class();
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    if allowed_extensions(class).contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ValidationError::UnsupportedExtension { class, ext })
    }
}

pub fn validate_size(len: usize, max_upload_mb: u64) -> Result<(), ValidationError> {
    if len == 0 {
        return Err(ValidationError::Empty);
    }
    let max_bytes = max_upload_mb.saturating_mul(1024 * 1024);
    if len as u64 > max_bytes {
        return Err(ValidationError::TooLarge { max_upload_mb });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported {class} extension: {ext:?}")]
    UnsupportedExtension { class: MediaClass, ext: String },

    #[error("file exceeds max size: {max_upload_mb}MB")]
    TooLarge { max_upload_mb: u64 },

    #[error("file is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_matches_kind() {
        assert_eq!(
            validate_extension("clip.MOV", InputKind::ReferenceVideo).unwrap(),
            ".mov"
        );
        assert_eq!(
            validate_extension("face.jpeg", InputKind::SourceImage).unwrap(),
            ".jpeg"
        );
        assert_eq!(
            validate_extension("voice.m4a", InputKind::DrivingAudio).unwrap(),
            ".m4a"
        );
    }

    #[test]
    fn test_extension_mismatch_rejected() {
        let err = validate_extension("face.png", InputKind::ReferenceVideo).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedExtension {
                class: MediaClass::Video,
                ext: ".png".to_string()
            }
        );
        assert!(validate_extension("noext", InputKind::SourceImage).is_err());
        assert!(validate_extension("archive.tar.gz", InputKind::DrivingAudio).is_err());
    }

    #[test]
    fn test_size_ceiling() {
        assert!(validate_size(1024, 1).is_ok());
        assert!(validate_size(1024 * 1024, 1).is_ok());
        assert_eq!(
            validate_size(1024 * 1024 + 1, 1),
            Err(ValidationError::TooLarge { max_upload_mb: 1 })
        );
        assert_eq!(validate_size(0, 1), Err(ValidationError::Empty));
    }
}
